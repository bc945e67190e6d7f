//! Scripted collaborators and fixtures for engine tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::compile::{CompileRequest, EngineSettings};
use crate::core::types::{ExecutionResult, ExpectedCounts, Feedback};
use crate::io::executor::{CodeExecutor, ExecRequest};
use crate::io::generator::{CodeGenerator, GenerationRequest, GeneratorUnavailable};
use crate::io::verified_store::{Provenance, VerifiedArtifact, VerifiedMeta, VerifiedStore, sha256_hex};

pub const SENTINEL: &str = "PROCESS_COMPLETE";

/// One call the engine made to a [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorCall {
    Generate,
    Repair { prior_code: String, feedback: Feedback },
}

/// Generator returning queued responses in order, then `fallback` forever.
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, GeneratorUnavailable>>>,
    fallback: Result<String, GeneratorUnavailable>,
    calls: RefCell<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, GeneratorUnavailable>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            fallback: Err(GeneratorUnavailable::new("scripted responses exhausted")),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Always returns `code`.
    pub fn always(code: &str) -> Self {
        Self {
            fallback: Ok(code.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Returns each of `codes` once, in order.
    pub fn sequence(codes: &[&str]) -> Self {
        Self::new(codes.iter().map(|code| Ok(code.to_string())).collect())
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn next(&self, call: GeneratorCall) -> Result<String, GeneratorUnavailable> {
        self.calls.borrow_mut().push(call);
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, _request: &GenerationRequest) -> Result<String, GeneratorUnavailable> {
        self.next(GeneratorCall::Generate)
    }

    fn repair(
        &self,
        _request: &GenerationRequest,
        prior_code: &str,
        feedback: &Feedback,
    ) -> Result<String, GeneratorUnavailable> {
        self.next(GeneratorCall::Repair {
            prior_code: prior_code.to_string(),
            feedback: feedback.clone(),
        })
    }
}

/// What a scripted candidate does when executed.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Write the CSV to the output argument and print the sentinel.
    Writes(String),
    /// Print the sentinel without writing any output.
    WritesNothing,
    /// Exit 1 with this stderr.
    Crashes(String),
    /// Exit 0 without printing the sentinel.
    SkipsSentinel,
    TimesOut,
}

/// Executor that looks up the candidate's code in a behavior table instead
/// of running it. Unknown code crashes.
pub struct ScriptedExecutor {
    behaviors: BTreeMap<String, Behavior>,
    runs: Cell<usize>,
}

impl ScriptedExecutor {
    pub fn new(behaviors: Vec<(&str, Behavior)>) -> Self {
        Self {
            behaviors: behaviors
                .into_iter()
                .map(|(code, behavior)| (code.to_string(), behavior))
                .collect(),
            runs: Cell::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl CodeExecutor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> ExecutionResult {
        self.runs.set(self.runs.get() + 1);
        let code = fs::read_to_string(&request.script_path).unwrap_or_default();
        let behavior = self
            .behaviors
            .get(code.trim())
            .cloned()
            .unwrap_or_else(|| Behavior::Crashes(format!("unknown script: {}", code.trim())));

        let completed = |stdout: &str| ExecutionResult {
            exit_status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            timed_out: false,
            sentinel_seen: stdout.contains(SENTINEL),
        };
        match behavior {
            Behavior::Writes(csv) => match request.args.get(1) {
                Some(output) => match fs::write(output, csv) {
                    Ok(()) => completed(SENTINEL),
                    Err(err) => crashed(&format!("write {}: {err}", output.display())),
                },
                None => crashed("no output argument"),
            },
            Behavior::WritesNothing => completed(SENTINEL),
            Behavior::Crashes(stderr) => crashed(&stderr),
            Behavior::SkipsSentinel => completed("done"),
            Behavior::TimesOut => ExecutionResult {
                exit_status: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
                sentinel_seen: false,
            },
        }
    }
}

fn crashed(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        exit_status: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
        timed_out: false,
        sentinel_seen: false,
    }
}

/// In-memory verified store that records every promotion.
#[derive(Default)]
pub struct RecordingStore {
    slots: RefCell<BTreeMap<String, VerifiedArtifact>>,
    promotions: RefCell<Vec<VerifiedMeta>>,
}

impl RecordingStore {
    pub fn promotions(&self) -> Vec<VerifiedMeta> {
        self.promotions.borrow().clone()
    }
}

impl VerifiedStore for RecordingStore {
    fn load(&self, slot: &str) -> Result<Option<VerifiedArtifact>> {
        Ok(self.slots.borrow().get(slot).cloned())
    }

    fn promote(&self, slot: &str, code: &str, provenance: Provenance<'_>) -> Result<VerifiedMeta> {
        let revision = self
            .slots
            .borrow()
            .get(slot)
            .map_or(1, |artifact| artifact.meta.revision + 1);
        let meta = VerifiedMeta {
            slot: slot.to_string(),
            scenario_label: provenance.scenario_label.to_string(),
            attempt: provenance.attempt,
            revision,
            sha256: sha256_hex(code),
        };
        self.slots.borrow_mut().insert(
            slot.to_string(),
            VerifiedArtifact {
                code: code.to_string(),
                meta: meta.clone(),
                path: PathBuf::from(format!("{slot}.py")),
            },
        );
        self.promotions.borrow_mut().push(meta.clone());
        Ok(meta)
    }
}

/// CSV with an `Item` column and `counts[i].1` rows of category `counts[i].0`.
pub fn classified_csv(counts: &[(&str, usize)]) -> String {
    let mut csv = String::from("Item,Status\n");
    let mut item = 0;
    for (category, count) in counts {
        for _ in 0..*count {
            item += 1;
            csv.push_str(&format!("item_{item:03},{category}\n"));
        }
    }
    csv
}

pub fn expected(counts: &[(&str, usize)]) -> ExpectedCounts {
    counts
        .iter()
        .map(|(category, count)| (category.to_string(), *count))
        .collect()
}

/// Writes a small data file and a two-rule document into `dir`.
pub fn write_inputs(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let data = dir.join("data.csv");
    fs::write(
        &data,
        "Item,Days_in_Warehouse,Profit_Margin\nitem_001,10,30\nitem_002,200,4\nitem_003,250,25\n",
    )?;
    let rules = dir.join("rules.json");
    fs::write(
        &rules,
        r#"{"rules": [
  {"id": 1, "name": "Review", "condition": "Profit_Margin < 5", "exception": null},
  {"id": 2, "name": "Liquidation", "condition": "Days_in_Warehouse > 180", "exception": "Profit_Margin > 20 -> VIP_Keep"}
], "total": 2}
"#,
    )?;
    Ok((data, rules))
}

pub fn settings(work_dir: &Path, max_attempts: u32) -> EngineSettings {
    EngineSettings {
        max_attempts,
        execution_timeout: std::time::Duration::from_secs(30),
        sentinel: SENTINEL.to_string(),
        category_column: "Status".to_string(),
        default_category: "Normal".to_string(),
        work_dir: work_dir.to_path_buf(),
    }
}

pub fn compile_request(
    data: &Path,
    rules: &Path,
    output: &Path,
    expected: Option<ExpectedCounts>,
) -> CompileRequest {
    CompileRequest {
        scenario_label: "Test Scenario".to_string(),
        data_path: data.to_path_buf(),
        schema_path: None,
        rules_path: rules.to_path_buf(),
        output_path: output.to_path_buf(),
        expected,
        slot: "current".to_string(),
    }
}
