//! Isolated executor for candidate code.
//!
//! The [`CodeExecutor`] trait decouples the retry loop from how candidates are
//! run. [`ProcessExecutor`] launches each candidate as its own process with
//! stdin closed, under a wall-clock timeout; tests use scripted executors that
//! return predetermined results without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::types::ExecutionResult;
use crate::io::process::run_command_with_timeout;

/// Parameters for one candidate execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Candidate code on disk.
    pub script_path: PathBuf,
    /// Positional arguments after the script: input path, then output path.
    pub args: Vec<PathBuf>,
    /// Working directory for the child process.
    pub workdir: PathBuf,
    pub timeout: Duration,
}

/// Abstraction over candidate execution backends.
pub trait CodeExecutor {
    /// Run the candidate. Failures to launch are reported in the result, not
    /// as an error, so they count against the attempt like any other crash.
    fn execute(&self, request: &ExecRequest) -> ExecutionResult;
}

/// Executor that spawns `interpreter… script args…`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    pub interpreter: Vec<String>,
    pub sentinel: String,
    pub output_limit_bytes: usize,
}

impl CodeExecutor for ProcessExecutor {
    #[instrument(skip_all, fields(script = %request.script_path.display(), timeout_secs = request.timeout.as_secs()))]
    fn execute(&self, request: &ExecRequest) -> ExecutionResult {
        let Some((program, leading)) = self.interpreter.split_first() else {
            return launch_failure("no interpreter configured".to_string());
        };
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg(&request.script_path)
            .args(&request.args)
            .current_dir(&request.workdir);

        info!(interpreter = %program, "executing candidate");
        let output = match run_command_with_timeout(cmd, None, request.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "candidate could not be launched");
                return launch_failure(format!("failed to launch '{program}': {err:#}"));
            }
        };

        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        let sentinel_seen = !output.timed_out && stdout.contains(&self.sentinel);
        let result = ExecutionResult {
            exit_status: output.status.code(),
            stdout,
            stderr,
            timed_out: output.timed_out,
            sentinel_seen,
        };
        if result.passed() {
            debug!("candidate completed");
        } else {
            warn!(
                exit_code = ?result.exit_status,
                timed_out = result.timed_out,
                sentinel_seen = result.sentinel_seen,
                "candidate execution failed"
            );
        }
        result
    }
}

fn launch_failure(message: String) -> ExecutionResult {
    ExecutionResult {
        exit_status: None,
        stdout: String::new(),
        stderr: message,
        timed_out: false,
        sentinel_seen: false,
    }
}

/// Render captured streams for the per-attempt execution log.
pub fn render_execution_log(result: &ExecutionResult) -> String {
    let mut buf = String::new();
    buf.push_str(&format!("exit_status: {:?}\n", result.exit_status));
    buf.push_str(&format!("timed_out: {}\n", result.timed_out));
    buf.push_str(&format!("sentinel_seen: {}\n", result.sentinel_seen));
    buf.push_str("=== stdout ===\n");
    buf.push_str(&result.stdout);
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&result.stderr);
    buf.push('\n');
    buf
}
