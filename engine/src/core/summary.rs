//! Aggregate statistics over a classified table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: usize,
    /// Sum of each value column over the category's rows, 2 decimals.
    pub totals: BTreeMap<String, f64>,
    /// Mean of each value column over the category's rows, 2 decimals.
    pub averages: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_items: usize,
    pub default_items: usize,
    pub categories: BTreeMap<String, CategorySummary>,
    /// Rows not in the default category.
    pub total_violations: usize,
    /// `total_violations / total_items` as a percentage, 1 decimal.
    pub violation_rate: f64,
}

/// Summarize `table` by its category column.
///
/// Cells in a value column that do not parse as numbers are skipped.
pub fn summarize(
    table: &Table,
    category_index: usize,
    default_category: &str,
    value_columns: &[String],
) -> RunSummary {
    let value_indexes: Vec<(&String, usize)> = value_columns
        .iter()
        .filter_map(|name| table.column_index(name).map(|index| (name, index)))
        .collect();

    let mut groups: BTreeMap<String, Vec<&Vec<String>>> = BTreeMap::new();
    for row in &table.rows {
        let category = row.get(category_index).cloned().unwrap_or_default();
        groups.entry(category).or_default().push(row);
    }

    let mut categories = BTreeMap::new();
    for (category, rows) in &groups {
        let mut totals = BTreeMap::new();
        let mut averages = BTreeMap::new();
        for (name, index) in &value_indexes {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.get(*index))
                .filter_map(|cell| cell.trim().parse::<f64>().ok())
                .collect();
            let sum: f64 = values.iter().sum();
            let mean = if values.is_empty() {
                0.0
            } else {
                sum / values.len() as f64
            };
            totals.insert((*name).clone(), round_to(sum, 2));
            averages.insert((*name).clone(), round_to(mean, 2));
        }
        categories.insert(
            category.clone(),
            CategorySummary {
                count: rows.len(),
                totals,
                averages,
            },
        );
    }

    let default_items = groups.get(default_category).map_or(0, Vec::len);
    let total_items = table.len();
    let total_violations = total_items - default_items;
    let violation_rate = if total_items == 0 {
        0.0
    } else {
        round_to(total_violations as f64 / total_items as f64 * 100.0, 1)
    };

    RunSummary {
        total_items,
        default_items,
        categories,
        total_violations,
        violation_rate,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
