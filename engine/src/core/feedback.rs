//! Conversion of attempt failures into generator feedback.
//!
//! A crash and a wrong answer need different corrections, so every feedback
//! text opens with a label naming which one happened, followed by the literal
//! diagnostic.

use std::time::Duration;

use crate::core::types::{ExecutionResult, Feedback, FailureKind, ValidationResult};

pub const CRASH_LABEL: &str = "CODE CRASHED";
pub const WRONG_OUTPUT_LABEL: &str = "CODE RAN BUT PRODUCED WRONG OUTPUT";

/// Diagnostic text for a failed execution.
///
/// Uses stderr when present; otherwise synthesizes a message from the exit
/// behavior and stdout.
pub fn execution_diagnostic(result: &ExecutionResult, timeout: Duration, sentinel: &str) -> String {
    if result.timed_out {
        return format!(
            "TimeoutError: script execution exceeded {} seconds and was terminated. \
             Use vectorized operations and avoid per-row loops so it finishes within the time budget.",
            timeout.as_secs()
        );
    }
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = result.stdout.trim();
    if result.exit_status == Some(0) && !result.sentinel_seen {
        return format!(
            "Process exited with status 0 but never printed the completion marker '{sentinel}'. \
             stdout: {stdout}"
        );
    }
    match result.exit_status {
        Some(code) => format!("Process exited with status {code}. No stderr. stdout: {stdout}"),
        None => format!("Process terminated by a signal. No stderr. stdout: {stdout}"),
    }
}

pub fn execution_feedback(diagnostic: &str) -> Feedback {
    Feedback {
        kind: FailureKind::ExecutionFailed,
        text: format!("{CRASH_LABEL}: the script did not complete.\n{diagnostic}"),
    }
}

/// Feedback for a script that ran but whose artifact failed validation.
///
/// Returns `None` when the validation passed.
pub fn validation_feedback(result: &ValidationResult) -> Option<Feedback> {
    let kind = result.failure?;
    Some(Feedback {
        kind,
        text: format!(
            "{WRONG_OUTPUT_LABEL}: the script completed but output validation failed ({}).\n{}",
            kind.as_str(),
            result.report
        ),
    })
}
