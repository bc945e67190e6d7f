//! Orchestration for one engine run: generate, execute, validate, retry.
//!
//! The loop is driven entirely by [`advance`]; this module only performs the
//! side effects each state asks for and records what happened. Attempt
//! failures never surface as `Err`: they become feedback for the next attempt
//! or end the run as a reported outcome. `Err` is reserved for problems with
//! the run's own inputs and storage.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::feedback::{execution_diagnostic, execution_feedback, validation_feedback};
use crate::core::state::{EngineEvent, EngineState, Terminal, advance};
use crate::core::types::{
    AttemptRecord, EngineOutcome, EngineStop, ExpectedCounts, FailureKind, Feedback,
};
use crate::io::artifact::validate_artifact;
use crate::io::attempt_log::{AttemptMeta, AttemptWriteRequest, clear_attempts, write_attempt};
use crate::io::config::EngineConfig;
use crate::io::context::load_schema_text;
use crate::io::executor::{CodeExecutor, ExecRequest, render_execution_log};
use crate::io::fs_util::{write_json, write_text};
use crate::io::generator::{CodeGenerator, GenerationRequest};
use crate::io::rules_store::load_rules;
use crate::io::verified_store::{Provenance, VerifiedStore};

/// File the candidate under execution is written to, inside the work dir.
pub const CANDIDATE_FILE: &str = "generated_filter.py";
pub const OUTCOME_FILE: &str = "outcome.json";

/// Loop parameters that do not change between runs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_attempts: u32,
    pub execution_timeout: Duration,
    pub sentinel: String,
    pub category_column: String,
    pub default_category: String,
    pub work_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            execution_timeout: config.execution_timeout(),
            sentinel: config.sentinel.clone(),
            category_column: config.table.category_column.clone(),
            default_category: config.table.default_category.clone(),
            work_dir: config.paths.work_dir.clone(),
        }
    }
}

/// One scenario: where its inputs live and what its output must look like.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub scenario_label: String,
    pub data_path: PathBuf,
    /// Derived from the data file when absent or missing on disk.
    pub schema_path: Option<PathBuf>,
    pub rules_path: PathBuf,
    /// Where the candidate must write its classified table.
    pub output_path: PathBuf,
    pub expected: Option<ExpectedCounts>,
    /// Verified store slot promoted on success.
    pub slot: String,
}

/// What the current attempt has produced so far.
#[derive(Debug, Default)]
struct AttemptTrace {
    code: Option<String>,
    generation_ms: u64,
    execution_ms: Option<u64>,
    validation_ms: Option<u64>,
    execution_log: Option<String>,
}

struct EngineRun<'a, G: ?Sized, E: ?Sized, S: ?Sized> {
    generator: &'a G,
    executor: &'a E,
    store: &'a S,
    settings: &'a EngineSettings,
    request: &'a CompileRequest,
    generation: GenerationRequest,
    candidate_path: PathBuf,
    output_path: PathBuf,
    data_path: PathBuf,
    current_code: Option<String>,
    trace: AttemptTrace,
    attempts: Vec<AttemptRecord>,
    last_report: String,
}

/// Run the engine loop for one scenario.
///
/// The generator is called at most `settings.max_attempts` times, and the
/// verified store is written only when an attempt passes both execution and
/// validation.
#[instrument(skip_all, fields(scenario = %request.scenario_label, slot = %request.slot))]
pub fn run_engine<G, E, S>(
    generator: &G,
    executor: &E,
    store: &S,
    settings: &EngineSettings,
    request: &CompileRequest,
) -> Result<EngineOutcome>
where
    G: CodeGenerator + ?Sized,
    E: CodeExecutor + ?Sized,
    S: VerifiedStore + ?Sized,
{
    let mut inputs = vec![request.data_path.as_path(), request.rules_path.as_path()];
    inputs.extend(request.schema_path.as_deref());
    ensure_output_is_not_an_input(&request.output_path, &inputs)?;

    let schema_text = load_schema_text(request.schema_path.as_deref(), &request.data_path)?;
    let rules = load_rules(&request.rules_path)?;
    let degraded_rules = rules.is_degraded();
    let rules_json = rules.to_prompt_json().context("render rules json")?;

    fs::create_dir_all(&settings.work_dir)
        .with_context(|| format!("create work dir {}", settings.work_dir.display()))?;
    clear_attempts(&settings.work_dir)?;

    let data_path = absolute(&request.data_path)?;
    let output_path = absolute(&request.output_path)?;
    let candidate_path = absolute(&settings.work_dir.join(CANDIDATE_FILE))?;
    let generation = GenerationRequest {
        schema_text,
        rules_json,
        input_path: data_path.clone(),
        output_path: output_path.clone(),
        category_column: settings.category_column.clone(),
        default_category: settings.default_category.clone(),
        sentinel: settings.sentinel.clone(),
    };

    let mut run = EngineRun {
        generator,
        executor,
        store,
        settings,
        request,
        generation,
        candidate_path,
        output_path,
        data_path,
        current_code: None,
        trace: AttemptTrace::default(),
        attempts: Vec::new(),
        last_report: String::new(),
    };

    info!(
        max_attempts = settings.max_attempts,
        rules = rules.rules.len(),
        degraded_rules,
        "engine run starting"
    );
    let terminal = run.drive()?;
    let outcome = run.finish(terminal, degraded_rules)?;
    write_json(&settings.work_dir.join(OUTCOME_FILE), &outcome)?;
    Ok(outcome)
}

impl<G, E, S> EngineRun<'_, G, E, S>
where
    G: CodeGenerator + ?Sized,
    E: CodeExecutor + ?Sized,
    S: VerifiedStore + ?Sized,
{
    fn drive(&mut self) -> Result<Terminal> {
        let mut state = EngineState::initial();
        loop {
            let event = match &state {
                EngineState::Generating { attempt, feedback } => {
                    self.generate(*attempt, feedback.as_ref())
                }
                EngineState::Executing { attempt } => self.execute(*attempt)?,
                EngineState::Validating { attempt } => self.validate(*attempt),
                EngineState::Retrying { .. } => EngineEvent::Resume,
                EngineState::Done(terminal) => {
                    if let Terminal::Succeeded { attempt } = terminal {
                        self.promote(*attempt)?;
                    }
                    return Ok(terminal.clone());
                }
            };
            let from = state.name();
            let attempt = state.attempt();
            state = advance(state, event, self.settings.max_attempts)?;
            debug!(attempt, from, to = state.name(), "engine transition");
        }
    }

    fn generate(&mut self, attempt: u32, feedback: Option<&Feedback>) -> EngineEvent {
        self.trace = AttemptTrace::default();
        let started = Instant::now();
        let generated = match (feedback, self.current_code.as_deref()) {
            (Some(feedback), Some(prior)) => {
                info!(attempt, failure = feedback.kind.as_str(), "requesting repaired candidate");
                self.generator.repair(&self.generation, prior, feedback)
            }
            _ => {
                info!(attempt, "requesting initial candidate");
                self.generator.generate(&self.generation)
            }
        };
        self.trace.generation_ms = elapsed_ms(started);

        match generated {
            Ok(code) => {
                self.trace.code = Some(code.clone());
                self.current_code = Some(code);
                EngineEvent::CodeGenerated
            }
            Err(err) => {
                warn!(attempt, reason = %err.reason, "generator unavailable, ending run");
                self.record(attempt, Some(FailureKind::GeneratorUnavailable), err.reason.clone());
                EngineEvent::GeneratorUnavailable(err.reason)
            }
        }
    }

    fn execute(&mut self, attempt: u32) -> Result<EngineEvent> {
        let code = self.current_code.as_deref().unwrap_or_default();
        write_text(&self.candidate_path, code)?;
        remove_stale_output(&self.output_path)?;

        let started = Instant::now();
        let result = self.executor.execute(&ExecRequest {
            script_path: self.candidate_path.clone(),
            args: vec![self.data_path.clone(), self.output_path.clone()],
            workdir: self.settings.work_dir.clone(),
            timeout: self.settings.execution_timeout,
        });
        self.trace.execution_ms = Some(elapsed_ms(started));
        self.trace.execution_log = Some(render_execution_log(&result));

        if result.passed() {
            return Ok(EngineEvent::ExecutionPassed);
        }
        let diagnostic = execution_diagnostic(
            &result,
            self.settings.execution_timeout,
            &self.settings.sentinel,
        );
        warn!(attempt, timed_out = result.timed_out, "attempt crashed");
        self.record(attempt, Some(FailureKind::ExecutionFailed), diagnostic.clone());
        Ok(EngineEvent::ExecutionFailed(execution_feedback(&diagnostic)))
    }

    fn validate(&mut self, attempt: u32) -> EngineEvent {
        let started = Instant::now();
        let result = validate_artifact(
            &self.output_path,
            &self.settings.category_column,
            self.request.expected.as_ref(),
        );
        self.trace.validation_ms = Some(elapsed_ms(started));
        self.record(attempt, result.failure, result.report.clone());

        match validation_feedback(&result) {
            Some(feedback) => {
                warn!(attempt, failure = feedback.kind.as_str(), "attempt produced wrong output");
                EngineEvent::ValidationFailed(feedback)
            }
            None => {
                info!(attempt, "attempt verified");
                EngineEvent::ValidationPassed
            }
        }
    }

    fn promote(&self, attempt: u32) -> Result<()> {
        let code = self.current_code.as_deref().unwrap_or_default();
        self.store.promote(
            &self.request.slot,
            code,
            Provenance {
                scenario_label: &self.request.scenario_label,
                attempt,
            },
        )?;
        Ok(())
    }

    /// Close out the current attempt: keep its report and archive it.
    fn record(&mut self, attempt: u32, failure: Option<FailureKind>, report: String) {
        let meta = AttemptMeta {
            attempt,
            failure,
            generation_ms: self.trace.generation_ms,
            execution_ms: self.trace.execution_ms,
            validation_ms: self.trace.validation_ms,
        };
        if let Err(err) = write_attempt(&AttemptWriteRequest {
            work_dir: &self.settings.work_dir,
            meta: &meta,
            code: self.trace.code.as_deref(),
            execution_log: self.trace.execution_log.as_deref(),
            report: &report,
        }) {
            warn!(attempt, err = %format!("{err:#}"), "failed to archive attempt");
        }
        self.last_report.clone_from(&report);
        self.attempts.push(AttemptRecord {
            attempt,
            failure,
            report,
        });
    }

    fn finish(self, terminal: Terminal, degraded_rules: bool) -> Result<EngineOutcome> {
        let (stop, attempts_used, final_code) = match terminal {
            Terminal::Succeeded { attempt } => (
                EngineStop::Succeeded { attempt },
                attempt,
                self.current_code,
            ),
            Terminal::Exhausted { attempts } => (
                EngineStop::Exhausted {
                    attempts,
                    max_attempts: self.settings.max_attempts,
                },
                attempts,
                None,
            ),
            Terminal::GeneratorUnavailable { attempt, reason } => (
                EngineStop::GeneratorUnavailable { attempt, reason },
                attempt,
                None,
            ),
        };
        let succeeded = matches!(stop, EngineStop::Succeeded { .. });
        info!(succeeded, attempts_used, "engine run finished");
        Ok(EngineOutcome {
            scenario_label: self.request.scenario_label.clone(),
            succeeded,
            attempts_used,
            stop,
            last_validation_report: self.last_report,
            final_code,
            attempts: self.attempts,
            degraded_rules,
        })
    }
}

/// `output` is deleted before every execution; reject it when it names an input.
fn ensure_output_is_not_an_input(output: &Path, inputs: &[&Path]) -> Result<()> {
    let Some(resolved) = resolve_output(output) else {
        return Ok(());
    };
    for input in inputs {
        if fs::canonicalize(input).is_ok_and(|input| input == resolved) {
            bail!(
                "output path {} is the same file as input {}",
                output.display(),
                input.display()
            );
        }
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet. `None` when its directory is missing.
fn resolve_output(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

fn remove_stale_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale output {}", path.display())),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
