//! Engine configuration merging.
//!
//! Applies case-specific overrides and per-run paths to the base engine config.

use std::path::Path;

use anyhow::Result;
use engine::io::config::EngineConfig;

use crate::case::CaseConfig;

/// Apply case configuration overrides to the base engine config.
pub fn apply_case_config(mut base: EngineConfig, overrides: &CaseConfig) -> Result<EngineConfig> {
    if let Some(max_attempts) = overrides.max_attempts {
        base.max_attempts = max_attempts;
    }
    if let Some(timeout) = overrides.execution_timeout_secs {
        base.execution_timeout_secs = timeout;
    }
    base.validate()?;
    Ok(base)
}

/// Point the engine's scratch directory into the run workspace.
///
/// The verified store stays shared; runs are kept apart by slot.
pub fn scope_to_workspace(mut base: EngineConfig, workspace: &Path) -> EngineConfig {
    base.paths.work_dir = workspace.join("work");
    base
}
