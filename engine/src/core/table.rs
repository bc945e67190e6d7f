//! In-memory tabular data shared by the validator, classifiers, and runtime.
//!
//! Cells are kept as the exact strings read from disk so that a table written
//! back out is byte-identical to what a downstream reader would observe.

use std::collections::BTreeMap;

/// Declared column type, named the way the generated code sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Text => "object",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Iterate over the cells of one column. Short rows yield `""`.
    pub fn column<'a>(&'a self, index: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// Returns the index of `name`, appending an empty column if it is missing.
    /// Short rows are padded so the returned index is valid for every row.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        let index = match self.column_index(name) {
            Some(index) => index,
            None => {
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        };
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
        index
    }

    /// Count rows per distinct value of a column. Blank cells are not counted.
    pub fn value_counts(&self, index: usize) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for value in self.column(index) {
            if is_blank(value) {
                continue;
            }
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Copy of this table keeping only rows for which `keep` returns true.
    pub fn filter_rows<F: Fn(&[String]) -> bool>(&self, keep: F) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row.as_slice()))
                .cloned()
                .collect(),
        }
    }

    /// Infer the type of a column from its non-blank cells.
    pub fn infer_type(&self, index: usize) -> ColumnType {
        let mut values = self.column(index).filter(|v| !is_blank(v)).peekable();
        if values.peek().is_none() {
            return ColumnType::Text;
        }
        let mut all_int = true;
        let mut all_float = true;
        let mut all_bool = true;
        for value in values {
            let value = value.trim();
            all_int &= value.parse::<i64>().is_ok();
            all_float &= value.parse::<f64>().is_ok();
            all_bool &= matches!(value, "True" | "False" | "true" | "false");
        }
        if all_int {
            ColumnType::Int
        } else if all_float {
            ColumnType::Float
        } else if all_bool {
            ColumnType::Bool
        } else {
            ColumnType::Text
        }
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        (0..self.headers.len())
            .filter(|&index| self.infer_type(index).is_numeric())
            .map(|index| self.headers[index].clone())
            .collect()
    }
}

/// A cell counts as unassigned when it is empty after trimming.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table {
            headers: vec!["Item".into(), "Price".into(), "Days".into(), "Flag".into()],
            rows: vec![
                vec!["a".into(), "1.5".into(), "10".into(), "True".into()],
                vec!["b".into(), "2".into(), "20".into(), "False".into()],
            ],
        }
    }

    #[test]
    fn infers_pandas_style_types() {
        let table = sample();
        assert_eq!(table.infer_type(0), ColumnType::Text);
        assert_eq!(table.infer_type(1), ColumnType::Float);
        assert_eq!(table.infer_type(2), ColumnType::Int);
        assert_eq!(table.infer_type(3), ColumnType::Bool);
        assert_eq!(table.numeric_columns(), vec!["Price", "Days"]);
    }

    #[test]
    fn ensure_column_appends_blank_cells() {
        let mut table = sample();
        let index = table.ensure_column("Status");
        assert_eq!(index, 4);
        assert!(table.rows.iter().all(|row| row[4].is_empty()));
        assert_eq!(table.ensure_column("Status"), 4);
    }

    #[test]
    fn value_counts_skip_blank_cells() {
        let table = Table {
            headers: vec!["Status".into()],
            rows: vec![vec!["Normal".into()], vec![" ".into()], vec!["Normal".into()]],
        };
        let counts = table.value_counts(0);
        assert_eq!(counts.get("Normal"), Some(&2));
        assert_eq!(counts.len(), 1);
    }
}
