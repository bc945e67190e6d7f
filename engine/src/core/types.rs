//! Shared deterministic types for the engine core.
//!
//! These types define stable contracts between the executor, validator, and
//! retry controller. They carry no I/O handles and serialize deterministically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Expected category counts, keyed by category name.
pub type ExpectedCounts = BTreeMap<String, usize>;

/// Failure taxonomy for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-zero exit, timeout, missing sentinel, or launch failure.
    ExecutionFailed,
    MissingArtifact,
    SchemaViolation,
    IncompleteClassification,
    DistributionMismatch,
    /// The generator could not be reached or returned unusable output.
    GeneratorUnavailable,
}

impl FailureKind {
    /// True when the candidate never reached its completion path.
    pub fn is_crash(self) -> bool {
        self == FailureKind::ExecutionFailed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ExecutionFailed => "ExecutionFailed",
            FailureKind::MissingArtifact => "MissingArtifact",
            FailureKind::SchemaViolation => "SchemaViolation",
            FailureKind::IncompleteClassification => "IncompleteClassification",
            FailureKind::DistributionMismatch => "DistributionMismatch",
            FailureKind::GeneratorUnavailable => "GeneratorUnavailable",
        }
    }
}

/// Captured behavior of one candidate process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code, `None` when killed by a signal or never started.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Whether stdout contained the completion sentinel.
    pub sentinel_seen: bool,
}

impl ExecutionResult {
    /// Zero exit and sentinel seen, and not timed out.
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_status == Some(0) && self.sentinel_seen
    }
}

/// Result of inspecting the artifact a candidate wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Set when `passed` is false.
    pub failure: Option<FailureKind>,
    pub report: String,
    pub category_counts: BTreeMap<String, usize>,
}

/// Classified failure text handed to the next generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub kind: FailureKind,
    pub text: String,
}

/// One attempt as reported in the final outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// `None` when the attempt passed.
    pub failure: Option<FailureKind>,
    /// Executor or validator report, verbatim.
    pub report: String,
}

/// Why an engine run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stop", rename_all = "snake_case")]
pub enum EngineStop {
    /// Execution and validation both passed on `attempt`.
    Succeeded { attempt: u32 },
    /// Every attempt in the budget failed.
    Exhausted { attempts: u32, max_attempts: u32 },
    /// The generator failed on `attempt`; no further attempts were made.
    GeneratorUnavailable { attempt: u32, reason: String },
}

/// Terminal result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub scenario_label: String,
    pub succeeded: bool,
    pub attempts_used: u32,
    pub stop: EngineStop,
    pub last_validation_report: String,
    pub final_code: Option<String>,
    /// Every attempt's classification and report, in order.
    pub attempts: Vec<AttemptRecord>,
    /// The rule set came from a fallback parser rather than full extraction.
    pub degraded_rules: bool,
}
