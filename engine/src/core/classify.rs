//! Classification strategies.
//!
//! [`Classifier`] is the seam the production runtime resolves at startup. The
//! verified artifact is one implementation (`io::script::ScriptClassifier`);
//! [`RuleClassifier`] evaluates structured predicates in-process.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::table::Table;

/// Assigns exactly one category per row in a category column.
pub trait Classifier {
    fn apply(&self, table: &Table) -> Result<Table>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub column: String,
    pub op: Op,
    pub value: Operand,
}

/// Category assignment guarded by a conjunction of comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub category: String,
    pub when: Vec<Comparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub when: Vec<Comparison>,
    /// Overrides `category` on rows where both conditions hold.
    #[serde(default)]
    pub exception: Option<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleClassifier {
    pub column: String,
    pub default_category: String,
    pub rules: Vec<CategoryRule>,
}

impl Classifier for RuleClassifier {
    fn apply(&self, table: &Table) -> Result<Table> {
        let mut out = table.clone();
        let target = out.ensure_column(&self.column);

        // Every row gets the default before any rule runs, so no row can end up
        // unassigned.
        for row in &mut out.rows {
            row[target] = self.default_category.clone();
        }

        for rule in &self.rules {
            let base = resolve(table, &rule.when)?;
            let exception = match &rule.exception {
                Some(exception) => Some((exception, resolve(table, &exception.when)?)),
                None => None,
            };
            for (source, row) in table.rows.iter().zip(out.rows.iter_mut()) {
                if !matches_all(source, &base) {
                    continue;
                }
                row[target] = rule.category.clone();
                if let Some((exception, checks)) = &exception
                    && matches_all(source, checks)
                {
                    row[target] = exception.category.clone();
                }
            }
        }
        Ok(out)
    }
}

type Resolved<'a> = Vec<(usize, &'a Comparison)>;

fn resolve<'a>(table: &Table, when: &'a [Comparison]) -> Result<Resolved<'a>> {
    when.iter()
        .map(|cmp| {
            table
                .column_index(&cmp.column)
                .map(|index| (index, cmp))
                .ok_or_else(|| anyhow!("rule references unknown column '{}'", cmp.column))
        })
        .collect()
}

fn matches_all(row: &[String], checks: &Resolved<'_>) -> bool {
    checks.iter().all(|(index, cmp)| {
        let cell = row.get(*index).map(String::as_str).unwrap_or("");
        cmp.matches(cell)
    })
}

impl Comparison {
    pub fn matches(&self, cell: &str) -> bool {
        let cell = cell.trim();
        match &self.value {
            Operand::Number(want) => match cell.parse::<f64>() {
                Ok(got) => compare(got.partial_cmp(want), self.op),
                Err(_) => false,
            },
            Operand::Bool(want) => {
                let got = match cell {
                    "True" | "true" => true,
                    "False" | "false" => false,
                    _ => return false,
                };
                match self.op {
                    Op::Eq => got == *want,
                    Op::Ne => got != *want,
                    _ => false,
                }
            }
            Operand::Text(want) => compare(Some(cell.cmp(want.as_str())), self.op),
        }
    }
}

fn compare(ordering: Option<std::cmp::Ordering>, op: Op) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match (ordering, op) {
        (None, _) => false,
        (Some(ord), Op::Gt) => ord == Greater,
        (Some(ord), Op::Ge) => ord != Less,
        (Some(ord), Op::Lt) => ord == Less,
        (Some(ord), Op::Le) => ord != Greater,
        (Some(ord), Op::Eq) => ord == Equal,
        (Some(ord), Op::Ne) => ord != Equal,
    }
}
