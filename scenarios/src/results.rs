//! Result capture and persistence.
//!
//! Copies the engine's attempt archive and writes `outcome.json` plus
//! `meta.json` to the results directory for later aggregation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use engine::core::types::EngineOutcome;
use engine::io::attempt_log::attempts_root;
use engine::io::fs_util::write_json;

use crate::outcome::{Outcome, classify_outcome};

/// Input for capturing results from a completed run.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub case_id: &'a str,
    pub case_path: &'a Path,
    pub run_id: &'a str,
    pub label: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workspace_root: &'a Path,
    pub work_dir: &'a Path,
    /// `None` when the engine returned an error.
    pub engine_outcome: Option<&'a EngineOutcome>,
    pub engine_error: Option<String>,
}

/// Metadata for a scenario run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunMeta {
    pub case_id: String,
    pub run_id: String,
    pub label: String,
    /// SHA-256 hash of the case file for reproducibility tracking.
    pub case_hash: String,
    pub outcome: Outcome,
    pub attempts_used: Option<u32>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub workspace: String,
    /// Why the engine refused to run, when it did.
    pub engine_error: Option<String>,
    /// Non-fatal errors encountered during capture.
    pub errors: Vec<String>,
}

/// Capture results from a completed run to the results directory.
#[instrument(skip_all, fields(case_id = %input.case_id, run_id = %input.run_id))]
pub fn capture_results(base_dir: &Path, input: &CaptureInput<'_>) -> Result<PathBuf> {
    let results_dir = results_dir(base_dir, input.case_id, input.run_id);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors = Vec::new();

    let case_hash = match file_sha256(input.case_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("case hash: {err}"));
            String::new()
        }
    };

    let attempts = attempts_root(input.work_dir);
    if attempts.exists() {
        if let Err(err) = copy_dir_recursive(&attempts, &results_dir.join("attempts")) {
            errors.push(format!("attempts: {err}"));
        }
    } else if input.engine_outcome.is_some() {
        errors.push(format!("attempts: missing {}", attempts.display()));
    }

    if let Some(outcome) = input.engine_outcome {
        write_json(&results_dir.join("outcome.json"), outcome)?;
    }

    if !errors.is_empty() {
        warn!(errors = ?errors, "artifact capture had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = RunMeta {
        case_id: input.case_id.to_string(),
        run_id: input.run_id.to_string(),
        label: input.label.to_string(),
        case_hash,
        outcome: classify_outcome(input.engine_outcome.map(|outcome| &outcome.stop)),
        attempts_used: input.engine_outcome.map(|outcome| outcome.attempts_used),
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        workspace: input.workspace_root.display().to_string(),
        engine_error: input.engine_error.clone(),
        errors,
    };

    write_json(&results_dir.join("meta.json"), &meta)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(results_dir)
}

pub fn results_dir(base_dir: &Path, case_id: &str, run_id: &str) -> PathBuf {
    base_dir.join(case_id).join(run_id)
}

pub fn read_meta(path: &Path) -> Result<RunMeta> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse meta")
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !src.exists() {
        return Err(anyhow!("missing {}", src.display()));
    }
    fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &target)?;
        } else {
            fs::copy(&path, &target).with_context(|| format!("copy {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::core::types::{AttemptRecord, EngineStop};
    use tempfile::tempdir;

    fn outcome() -> EngineOutcome {
        EngineOutcome {
            scenario_label: "Orders".to_string(),
            succeeded: true,
            attempts_used: 2,
            stop: EngineStop::Succeeded { attempt: 2 },
            last_validation_report: "VALIDATION PASS".to_string(),
            final_code: Some("print('PROCESS_COMPLETE')".to_string()),
            attempts: vec![
                AttemptRecord {
                    attempt: 1,
                    failure: None,
                    report: String::new(),
                },
                AttemptRecord {
                    attempt: 2,
                    failure: None,
                    report: "VALIDATION PASS".to_string(),
                },
            ],
            degraded_rules: false,
        }
    }

    #[test]
    fn results_dir_is_stable() {
        let base = Path::new("/tmp/results");
        let dir = results_dir(base, "case", "run-1");
        assert_eq!(dir, PathBuf::from("/tmp/results/case/run-1"));
    }

    #[test]
    fn copies_attempts_and_writes_meta() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path().join("workspace");
        let work_dir = workspace.join("work");
        fs::create_dir_all(work_dir.join("attempts/1")).expect("attempt dir");
        fs::write(work_dir.join("attempts/1/report.txt"), "report").expect("report");
        let case_path = temp.path().join("case.toml");
        fs::write(&case_path, "[case]\nid='orders'\n").expect("case");

        let engine_outcome = outcome();
        let input = CaptureInput {
            case_id: "orders",
            case_path: &case_path,
            run_id: "run-1",
            label: "Orders",
            started_at: Utc::now(),
            finished_at: Utc::now(),
            workspace_root: &workspace,
            work_dir: &work_dir,
            engine_outcome: Some(&engine_outcome),
            engine_error: None,
        };
        let output_dir = capture_results(&temp.path().join("results"), &input).expect("capture");

        assert!(output_dir.join("attempts/1/report.txt").exists());
        let meta = read_meta(&output_dir.join("meta.json")).expect("meta");
        assert_eq!(meta.outcome, Outcome::Succeeded);
        assert_eq!(meta.attempts_used, Some(2));
        assert_eq!(meta.case_hash.len(), 64);
        assert!(meta.errors.is_empty());

        let written: EngineOutcome = serde_json::from_str(
            &fs::read_to_string(output_dir.join("outcome.json")).expect("outcome"),
        )
        .expect("parse outcome");
        assert_eq!(written, engine_outcome);
    }

    #[test]
    fn engine_error_is_recorded_without_outcome() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("case.toml");
        fs::write(&case_path, "x").expect("case");
        let input = CaptureInput {
            case_id: "broken",
            case_path: &case_path,
            run_id: "run-1",
            label: "Broken",
            started_at: Utc::now(),
            finished_at: Utc::now(),
            workspace_root: temp.path(),
            work_dir: &temp.path().join("work"),
            engine_outcome: None,
            engine_error: Some("read rules rules.json".to_string()),
        };
        let output_dir = capture_results(&temp.path().join("results"), &input).expect("capture");
        let meta = read_meta(&output_dir.join("meta.json")).expect("meta");
        assert_eq!(meta.outcome, Outcome::Error);
        assert_eq!(meta.attempts_used, None);
        assert!(!output_dir.join("outcome.json").exists());
    }
}
