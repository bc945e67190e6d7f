use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::outcome::Outcome;
use crate::results::read_meta;

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub runs: usize,
    pub succeeded: usize,
    pub exhausted: usize,
    pub unavailable: usize,
    pub error: usize,
    /// Mean attempts over runs that reached the engine loop.
    pub avg_attempts: Option<f64>,
    pub avg_duration_secs: Option<f64>,
}

impl ReportSummary {
    /// Succeeded runs as a percentage of all runs.
    pub fn success_rate(&self) -> Option<f64> {
        if self.runs == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.runs as f64 * 100.0)
        }
    }
}

pub fn load_run_dirs(case_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !case_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(case_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut attempts_total = 0u64;
    let mut attempts_runs = 0u64;
    let mut duration_total = 0.0;

    for run_dir in load_run_dirs(case_results_dir)? {
        let meta = match read_meta(&run_dir.join("meta.json")) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        match meta.outcome {
            Outcome::Succeeded => summary.succeeded += 1,
            Outcome::Exhausted => summary.exhausted += 1,
            Outcome::Unavailable => summary.unavailable += 1,
            Outcome::Error => summary.error += 1,
        }
        if let Some(attempts) = meta.attempts_used {
            attempts_total += u64::from(attempts);
            attempts_runs += 1;
        }
        duration_total += meta.duration_secs;
    }

    if attempts_runs > 0 {
        summary.avg_attempts = Some(attempts_total as f64 / attempts_runs as f64);
    }
    if summary.runs > 0 {
        summary.avg_duration_secs = Some(duration_total / summary.runs as f64);
    }
    Ok((summary, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::RunMeta;
    use tempfile::tempdir;

    fn write_meta(dir: &Path, outcome: Outcome, attempts: Option<u32>, duration: f64) {
        fs::create_dir_all(dir).expect("run dir");
        let meta = RunMeta {
            case_id: "case".to_string(),
            run_id: "run".to_string(),
            label: "Case".to_string(),
            case_hash: "hash".to_string(),
            outcome,
            attempts_used: attempts,
            start_time: "now".to_string(),
            end_time: "later".to_string(),
            duration_secs: duration,
            workspace: "/tmp".to_string(),
            engine_error: None,
            errors: Vec::new(),
        };
        let contents = serde_json::to_string_pretty(&meta).expect("meta json");
        fs::write(dir.join("meta.json"), format!("{contents}\n")).expect("write meta");
    }

    #[test]
    fn aggregates_runs() {
        let temp = tempdir().expect("tempdir");
        write_meta(&temp.path().join("run1"), Outcome::Succeeded, Some(1), 4.0);
        write_meta(&temp.path().join("run2"), Outcome::Exhausted, Some(3), 8.0);
        write_meta(&temp.path().join("run3"), Outcome::Error, None, 0.0);
        write_meta(&temp.path().join("run4"), Outcome::Succeeded, Some(2), 4.0);

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert!(warnings.is_empty());
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.avg_attempts, Some(2.0));
        assert_eq!(summary.avg_duration_secs, Some(4.0));
        assert_eq!(summary.success_rate(), Some(50.0));
    }

    #[test]
    fn skips_unreadable_runs_with_warning() {
        let temp = tempdir().expect("tempdir");
        write_meta(&temp.path().join("run1"), Outcome::Unavailable, Some(1), 1.0);
        fs::create_dir_all(temp.path().join("run2")).expect("run2");
        fs::write(temp.path().join("run2/meta.json"), "{").expect("bad meta");

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.unavailable, 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn missing_results_dir_is_empty_report() {
        let temp = tempdir().expect("tempdir");
        let (summary, _) = aggregate(&temp.path().join("none")).expect("aggregate");
        assert_eq!(summary, ReportSummary::default());
        assert_eq!(summary.success_rate(), None);
    }
}
