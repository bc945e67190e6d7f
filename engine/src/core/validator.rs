//! Structural validation of a classified table.
//!
//! Checks run in order and stop at the first failure: required column,
//! completeness, then the optional distribution match. Artifact existence and
//! parsing are handled by [`crate::io::artifact`] before this runs.

use std::collections::BTreeMap;

use crate::core::table::{Table, is_blank};
use crate::core::types::{ExpectedCounts, FailureKind, ValidationResult};

/// Validate `table` against the category column contract.
pub fn validate_table(
    table: &Table,
    category_column: &str,
    expected: Option<&ExpectedCounts>,
) -> ValidationResult {
    let Some(index) = table.column_index(category_column) else {
        return failed(
            FailureKind::SchemaViolation,
            format!("VALIDATION FAIL: '{category_column}' column missing from output"),
            BTreeMap::new(),
        );
    };

    let unassigned = table.column(index).filter(|value| is_blank(value)).count();
    let counts = table.value_counts(index);
    if unassigned > 0 {
        return failed(
            FailureKind::IncompleteClassification,
            format!(
                "VALIDATION FAIL: {unassigned} of {} rows have no '{category_column}' value",
                table.len()
            ),
            counts,
        );
    }

    let mut lines = vec![
        "Validation Report:".to_string(),
        format!("   Total rows: {}", table.len()),
        format!("   {category_column} distribution:"),
    ];
    for (category, count) in &counts {
        lines.push(format!("     {category}: {count}"));
    }

    let mut mismatched = false;
    if let Some(expected) = expected {
        for (category, &want) in expected {
            let got = counts.get(category).copied().unwrap_or(0);
            let mark = if got == want { "ok" } else { "MISMATCH" };
            mismatched |= got != want;
            lines.push(format!(
                "   [{mark}] {category}: expected={want}, actual={got}"
            ));
        }
    }

    let report = lines.join("\n");
    if mismatched {
        return failed(
            FailureKind::DistributionMismatch,
            format!("VALIDATION FAIL: Mismatched counts\n{report}"),
            counts,
        );
    }

    ValidationResult {
        passed: true,
        failure: None,
        report,
        category_counts: counts,
    }
}

pub(crate) fn failed(
    kind: FailureKind,
    report: String,
    category_counts: BTreeMap<String, usize>,
) -> ValidationResult {
    ValidationResult {
        passed: false,
        failure: Some(kind),
        report,
        category_counts,
    }
}
