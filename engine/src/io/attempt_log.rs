//! Per-attempt archive under `<work_dir>/attempts/<n>/`.
//!
//! Written for every attempt regardless of log level.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::FailureKind;
use crate::io::fs_util::{write_json, write_text};

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub attempt: u32,
    /// `None` when the attempt passed.
    pub failure: Option<FailureKind>,
    pub generation_ms: u64,
    /// Absent when the attempt never reached execution.
    pub execution_ms: Option<u64>,
    pub validation_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub candidate_path: PathBuf,
    pub execution_log_path: PathBuf,
    pub report_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(work_dir: &Path, attempt: u32) -> Self {
        let dir = attempts_root(work_dir).join(attempt.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            candidate_path: dir.join("candidate.py"),
            execution_log_path: dir.join("execution.log"),
            report_path: dir.join("report.txt"),
        }
    }
}

pub fn attempts_root(work_dir: &Path) -> PathBuf {
    work_dir.join("attempts")
}

/// Drop archives left by a previous run in the same work dir.
pub fn clear_attempts(work_dir: &Path) -> Result<()> {
    let root = attempts_root(work_dir);
    if root.exists() {
        fs::remove_dir_all(&root).with_context(|| format!("remove {}", root.display()))?;
    }
    Ok(())
}

pub struct AttemptWriteRequest<'a> {
    pub work_dir: &'a Path,
    pub meta: &'a AttemptMeta,
    pub code: Option<&'a str>,
    pub execution_log: Option<&'a str>,
    pub report: &'a str,
}

pub fn write_attempt(request: &AttemptWriteRequest<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(request.work_dir, request.meta.attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    if let Some(code) = request.code {
        write_text(&paths.candidate_path, code)?;
    }
    if let Some(log) = request.execution_log {
        write_text(&paths.execution_log_path, log)?;
    }
    write_text(&paths.report_path, request.report)?;
    Ok(paths)
}
