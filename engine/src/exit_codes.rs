//! Stable exit codes for engine CLI commands.

/// Command succeeded: the run verified an artifact, the rules or artifact
/// are valid, or the pipeline completed.
pub const OK: i32 = 0;
/// Invalid input, config, or any other error.
pub const INVALID: i32 = 1;
/// `engine compile` exhausted its attempts, or `engine validate` failed.
pub const FAILED: i32 = 2;
/// `engine compile` stopped because the code generator was unavailable.
pub const GENERATOR_UNAVAILABLE: i32 = 3;
