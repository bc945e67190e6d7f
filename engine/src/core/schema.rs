//! Schema context: the read-only description of a dataset given to the generator.

use crate::core::table::Table;

const SAMPLE_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContext {
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub sample: Vec<Vec<String>>,
}

impl SchemaContext {
    pub fn from_table(table: &Table) -> Self {
        let columns = table
            .headers
            .iter()
            .enumerate()
            .map(|(index, name)| ColumnInfo {
                name: name.clone(),
                dtype: table.infer_type(index).as_str(),
            })
            .collect();
        Self {
            columns,
            row_count: table.len(),
            sample: table.rows.iter().take(SAMPLE_ROWS).cloned().collect(),
        }
    }

    /// Render the `DATA SCHEMA:` block with a markdown sample table.
    pub fn render(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let dtypes: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}: {}", c.name, c.dtype))
            .collect();

        let mut out = String::new();
        out.push_str("DATA SCHEMA:\n");
        out.push_str(&format!("- Columns: [{}]\n", names.join(", ")));
        out.push_str(&format!("- Data Types: [{}]\n", dtypes.join(", ")));
        out.push_str(&format!("- Total Rows: {}\n", self.row_count));
        out.push('\n');
        out.push_str(&format!(
            "Sample Data (First {} Rows):\n",
            self.sample.len()
        ));
        out.push_str(&format!("| {} |\n", names.join(" | ")));
        out.push_str(&format!("| {} |\n", vec!["---"; names.len()].join(" | ")));
        for row in &self.sample {
            out.push_str(&format!("| {} |\n", row.join(" | ")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_schema_block_with_sample() {
        let mut table = Table::new(vec![
            "Item_Name".into(),
            "Price".into(),
            "Days_in_Warehouse".into(),
        ]);
        for i in 0..5 {
            table
                .rows
                .push(vec![format!("Widget_{i:03}"), "19.99".into(), i.to_string()]);
        }

        let context = SchemaContext::from_table(&table);
        assert_eq!(context.row_count, 5);
        assert_eq!(context.sample.len(), 3);

        let text = context.render();
        assert!(text.starts_with("DATA SCHEMA:\n"));
        assert!(text.contains("- Columns: [Item_Name, Price, Days_in_Warehouse]"));
        assert!(text.contains("Price: float64"));
        assert!(text.contains("Days_in_Warehouse: int64"));
        assert!(text.contains("Item_Name: object"));
        assert!(text.contains("- Total Rows: 5"));
        assert!(text.contains("| --- | --- | --- |"));
        assert!(text.contains("| Widget_002 | 19.99 | 2 |"));
        assert!(!text.contains("Widget_003"));
    }
}
