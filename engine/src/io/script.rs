//! The verified artifact as a [`Classifier`].

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::classify::Classifier;
use crate::core::feedback::execution_diagnostic;
use crate::core::table::Table;
use crate::io::executor::{CodeExecutor, ExecRequest};
use crate::io::fs_util::write_text;
use crate::io::table_io::{read_table, write_table};

/// Runs verified code through an executor in a scratch directory.
///
/// The code sees the same `script input output` contract it was verified
/// under, and never the caller's files.
pub struct ScriptClassifier<E> {
    pub code: String,
    pub executor: E,
    pub timeout: Duration,
    pub sentinel: String,
}

impl<E: CodeExecutor> Classifier for ScriptClassifier<E> {
    #[instrument(skip_all, fields(rows = table.len()))]
    fn apply(&self, table: &Table) -> Result<Table> {
        let scratch = tempfile::tempdir().context("create scratch dir")?;
        let script_path = scratch.path().join("verified_filter.py");
        let input_path = scratch.path().join("input.csv");
        let output_path = scratch.path().join("output.csv");

        write_text(&script_path, &self.code)?;
        write_table(&input_path, table)?;

        let result = self.executor.execute(&ExecRequest {
            script_path,
            args: vec![input_path, output_path.clone()],
            workdir: scratch.path().to_path_buf(),
            timeout: self.timeout,
        });
        if !result.passed() {
            return Err(anyhow!(
                "verified artifact failed: {}",
                execution_diagnostic(&result, self.timeout, &self.sentinel)
            ));
        }
        debug!("verified artifact completed");
        read_table(&output_path).context("read classified output")
    }
}
