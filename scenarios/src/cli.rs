//! CLI command implementations.

use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::case::{CaseFile, case_path, discover_cases};
use crate::outcome::Outcome;
use crate::report::aggregate;
use crate::run::{HarnessPaths, run_case, seed_case};

/// List all available cases.
pub fn list_cases(paths: &HarnessPaths) -> Result<()> {
    for case in discover_cases(&paths.cases_dir())? {
        println!("{}\t{}", case.case.id, case.case.label);
    }
    Ok(())
}

/// Write a fixture case's data, rules, and schema context for inspection.
pub fn seed_case_by_id(paths: &HarnessPaths, case_id: &str) -> Result<()> {
    let path = case_path(&paths.cases_dir(), case_id)?;
    let case = CaseFile::load(&path).context("load case")?;
    let dir = paths.workspaces_dir().join(case_id).join("seed");
    let files = seed_case(&case, &dir)?;
    println!("seed: case={} data={}", case_id, files.data.display());
    println!("seed: rules={}", files.rules.display());
    println!("seed: schema={}", files.schema.display());
    println!("seed: native_rules={}", files.native_rules.display());
    Ok(())
}

/// Run a case by id (optionally multiple times). Returns true when every run succeeded.
pub fn run_case_by_id(paths: &HarnessPaths, case_id: &str, runs: u32) -> Result<bool> {
    let path = case_path(&paths.cases_dir(), case_id)?;
    let case = CaseFile::load(&path).context("load case")?;
    debug!(case_id, runs, "case loaded");
    run_loaded_case(paths, &path, &case, runs)
}

/// Run every discovered case. Returns true when every run succeeded.
pub fn run_all(paths: &HarnessPaths, runs: u32) -> Result<bool> {
    let cases = discover_cases(&paths.cases_dir())?;
    let mut all_passed = true;
    let mut passed_cases = 0;
    for case in &cases {
        let path = case_path(&paths.cases_dir(), &case.case.id)?;
        let passed = run_loaded_case(paths, &path, case, runs)?;
        if passed {
            passed_cases += 1;
        }
        all_passed &= passed;
    }
    println!("overall: {}/{} cases passed", passed_cases, cases.len());
    Ok(all_passed)
}

fn run_loaded_case(
    paths: &HarnessPaths,
    path: &std::path::Path,
    case: &CaseFile,
    runs: u32,
) -> Result<bool> {
    let case_id = case.case.id.as_str();
    info!(case_id, runs, "starting runs");
    let mut all_passed = true;
    for run_num in 1..=runs {
        debug!(case_id, run_num, runs, "starting run");
        let outcome = run_case(paths, path, case).context("run case")?;
        all_passed &= outcome.outcome == Outcome::Succeeded;
        println!(
            "run: case={} run_id={} outcome={:?} attempts={} results={}",
            case_id,
            outcome.run_id,
            outcome.outcome,
            outcome
                .attempts_used
                .map_or_else(|| "-".to_string(), |attempts| attempts.to_string()),
            outcome.results_dir.display()
        );
    }
    Ok(all_passed)
}

/// Show aggregated results for a case.
pub fn report_case(paths: &HarnessPaths, case_id: &str) -> Result<()> {
    let (summary, warnings) = aggregate(&paths.results_dir().join(case_id))?;
    println!("report: case={} runs={}", case_id, summary.runs);
    println!(
        "report: succeeded={} exhausted={} unavailable={} error={}",
        summary.succeeded, summary.exhausted, summary.unavailable, summary.error
    );
    if let Some(avg) = summary.avg_attempts {
        println!("report: avg_attempts={:.2}", avg);
    }
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={:.2}", avg);
    }
    if let Some(rate) = summary.success_rate() {
        println!("report: success_rate={:.0}%", rate);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Remove workspaces and results for a case.
pub fn clean_case(paths: &HarnessPaths, case_id: &str) -> Result<()> {
    let workspaces = paths.workspaces_dir().join(case_id);
    let results = paths.results_dir().join(case_id);
    for dir in [&workspaces, &results] {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
        }
    }
    println!(
        "clean: case={} workspaces={} results={}",
        case_id,
        workspaces.display(),
        results.display()
    );
    Ok(())
}
