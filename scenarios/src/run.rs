//! Case execution orchestration.
//!
//! Coordinates workspace creation, fixture seeding, the engine run, and
//! result capture.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use engine::compile::{CompileRequest, EngineSettings, run_engine};
use engine::core::types::{EngineOutcome, ExpectedCounts};
use engine::io::config::{EngineConfig, load_config};
use engine::io::executor::ProcessExecutor;
use engine::io::generator::build_generator;
use engine::io::verified_store::FsVerifiedStore;

use crate::case::CaseFile;
use crate::config::{apply_case_config, scope_to_workspace};
use crate::fixtures::{SeededFiles, build_fixture, write_fixture};
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, capture_results};

/// Candidate output file inside the run workspace.
const OUTPUT_FILE: &str = "classified.csv";

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub results_dir: PathBuf,
    pub outcome: Outcome,
    pub attempts_used: Option<u32>,
}

/// Data, rules, and schema paths an engine run consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInputs {
    pub data: PathBuf,
    pub rules: PathBuf,
    pub schema: Option<PathBuf>,
    /// Case expectations, or the fixture's when the case lists none.
    pub expected: Option<ExpectedCounts>,
}

/// Layout of the `scenarios/` directory under the repository root.
#[derive(Debug, Clone)]
pub struct HarnessPaths {
    pub repo_root: PathBuf,
}

impl HarnessPaths {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.repo_root.join("scenarios").join("cases")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.repo_root.join("scenarios").join("workspaces")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.repo_root.join("scenarios").join("results")
    }

    pub fn engine_config(&self) -> PathBuf {
        self.repo_root.join("engine.toml")
    }
}

/// Generate the case's fixture into `dir`. Fails for cases with explicit inputs.
pub fn seed_case(case: &CaseFile, dir: &Path) -> Result<SeededFiles> {
    let Some(spec) = case.fixture else {
        bail!("case {} uses explicit inputs; nothing to seed", case.case.id);
    };
    let seed = spec.seed.unwrap_or_else(|| spec.kind.default_seed());
    let fixture = build_fixture(spec.kind, seed);
    write_fixture(dir, &fixture).with_context(|| format!("seed {}", dir.display()))
}

pub fn prepare_inputs(
    repo_root: &Path,
    workspace: &Path,
    case: &CaseFile,
) -> Result<PreparedInputs> {
    let case_expected = (!case.expected.is_empty()).then(|| case.expected.clone());
    if let Some(inputs) = &case.inputs {
        return Ok(PreparedInputs {
            data: repo_root.join(&inputs.data),
            rules: repo_root.join(&inputs.rules),
            schema: inputs.schema.as_ref().map(|schema| repo_root.join(schema)),
            expected: case_expected,
        });
    }
    let Some(spec) = case.fixture else {
        bail!("case {} has no inputs", case.case.id);
    };
    let seed = spec.seed.unwrap_or_else(|| spec.kind.default_seed());
    let fixture = build_fixture(spec.kind, seed);
    let files = write_fixture(workspace, &fixture)?;
    Ok(PreparedInputs {
        data: files.data,
        rules: files.rules,
        schema: Some(files.schema),
        expected: case_expected.or(Some(fixture.expected)),
    })
}

/// Run a case end-to-end: workspace creation, engine run, result capture.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case(paths: &HarnessPaths, case_path: &Path, case: &CaseFile) -> Result<RunOutcome> {
    info!("case run started");

    let run_id = format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"));
    let workspace = paths.workspaces_dir().join(&case.case.id).join(&run_id);
    fs::create_dir_all(&workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;

    debug!(workspace = %workspace.display(), "preparing inputs");
    let inputs = prepare_inputs(&paths.repo_root, &workspace, case).context("prepare inputs")?;

    let base = load_config(&paths.engine_config())?;
    let config = scope_to_workspace(apply_case_config(base, &case.config)?, &workspace);

    let request = CompileRequest {
        scenario_label: case.case.label.clone(),
        data_path: inputs.data,
        schema_path: inputs.schema,
        rules_path: inputs.rules,
        output_path: workspace.join(OUTPUT_FILE),
        expected: inputs.expected,
        slot: case.case.id.clone(),
    };

    let started_at = Utc::now();
    let result = compile(&config, &request);
    let finished_at = Utc::now();

    let (engine_outcome, engine_error) = match result {
        Ok(outcome) => (Some(outcome), None),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "engine run failed");
            (None, Some(format!("{err:#}")))
        }
    };

    let capture_input = CaptureInput {
        case_id: &case.case.id,
        case_path,
        run_id: &run_id,
        label: &case.case.label,
        started_at,
        finished_at,
        workspace_root: &workspace,
        work_dir: &config.paths.work_dir,
        engine_outcome: engine_outcome.as_ref(),
        engine_error,
    };
    let results_dir =
        capture_results(&paths.results_dir(), &capture_input).context("capture results")?;

    let outcome = classify_outcome(engine_outcome.as_ref().map(|outcome| &outcome.stop));
    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");

    Ok(RunOutcome {
        run_id,
        results_dir,
        outcome,
        attempts_used: engine_outcome.map(|outcome| outcome.attempts_used),
    })
}

fn compile(config: &EngineConfig, request: &CompileRequest) -> Result<EngineOutcome> {
    let generator = build_generator(config)?;
    let executor = ProcessExecutor {
        interpreter: config.interpreter.clone(),
        sentinel: config.sentinel.clone(),
        output_limit_bytes: config.output_limit_bytes,
    };
    let store = FsVerifiedStore::new(&config.paths.verified_dir);
    let settings = EngineSettings::from_config(config);
    run_engine(generator.as_ref(), &executor, &store, &settings, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_case(expected: &str) -> CaseFile {
        let input = format!(
            "[case]\nid = \"orders\"\nlabel = \"Orders\"\n\n[fixture]\nkind = \"orders\"\n\n[expected]\n{expected}\n"
        );
        CaseFile::parse_str(&input).expect("case parses")
    }

    #[test]
    fn fixture_inputs_land_in_workspace_with_fixture_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let case = fixture_case("");
        let inputs = prepare_inputs(temp.path(), temp.path(), &case).expect("prepare");
        assert_eq!(inputs.data, temp.path().join("data.csv"));
        assert!(inputs.data.exists());
        assert!(inputs.schema.as_ref().expect("schema").exists());
        let expected = inputs.expected.expect("expected");
        assert_eq!(expected.get("VIP_Rush"), Some(&15));
    }

    #[test]
    fn case_expectations_override_fixture_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let case = fixture_case("Normal = 100");
        let inputs = prepare_inputs(temp.path(), temp.path(), &case).expect("prepare");
        let expected = inputs.expected.expect("expected");
        assert_eq!(expected.len(), 1);
        assert_eq!(expected.get("Normal"), Some(&100));
    }

    #[test]
    fn explicit_inputs_resolve_against_repo_root() {
        let case = CaseFile::parse_str(
            "[case]\nid = \"custom\"\nlabel = \"Custom\"\n\n[inputs]\ndata = \"d/data.csv\"\nrules = \"d/rules.json\"\n",
        )
        .expect("case parses");
        let inputs =
            prepare_inputs(Path::new("/repo"), Path::new("/ws"), &case).expect("prepare");
        assert_eq!(inputs.data, PathBuf::from("/repo/d/data.csv"));
        assert_eq!(inputs.schema, None);
        assert_eq!(inputs.expected, None);
        assert!(seed_case(&case, Path::new("/ws")).is_err());
    }

    #[test]
    fn harness_layout_is_under_scenarios() {
        let paths = HarnessPaths::new(Path::new("/repo"));
        assert_eq!(paths.cases_dir(), PathBuf::from("/repo/scenarios/cases"));
        assert_eq!(paths.results_dir(), PathBuf::from("/repo/scenarios/results"));
        assert_eq!(paths.engine_config(), PathBuf::from("/repo/engine.toml"));
    }
}
