//! Output validator entry point over an artifact on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use crate::core::types::{ExpectedCounts, FailureKind, ValidationResult};
use crate::core::validator::{failed, validate_table};
use crate::io::table_io::parse_table;

/// Validate the artifact at `path`. Read-only; never mutates the file.
///
/// A missing file is `MissingArtifact`; a file that is not parseable CSV is
/// treated as a `SchemaViolation` since the required column cannot be found.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn validate_artifact(
    path: &Path,
    category_column: &str,
    expected: Option<&ExpectedCounts>,
) -> ValidationResult {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return failed(
                FailureKind::MissingArtifact,
                format!(
                    "VALIDATION FAIL: output file {} was not produced",
                    path.display()
                ),
                BTreeMap::new(),
            );
        }
        Err(err) => {
            return failed(
                FailureKind::MissingArtifact,
                format!("VALIDATION FAIL: cannot read {}: {err}", path.display()),
                BTreeMap::new(),
            );
        }
    };

    let table = match parse_table(&bytes) {
        Ok(table) => table,
        Err(err) => {
            return failed(
                FailureKind::SchemaViolation,
                format!(
                    "VALIDATION FAIL: output file {} is not a readable table: {err:#}",
                    path.display()
                ),
                BTreeMap::new(),
            );
        }
    };

    let result = validate_table(&table, category_column, expected);
    debug!(passed = result.passed, failure = ?result.failure, rows = table.len(), "artifact validated");
    result
}
