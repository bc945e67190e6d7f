//! Self-healing classification code engine.
//!
//! Compiles a rule set into verified classification code (`engine compile`)
//! and re-applies the verified artifact to new data (`engine run`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use engine::compile::{CompileRequest, EngineSettings, OUTCOME_FILE, run_engine};
use engine::core::types::{EngineOutcome, EngineStop, ExpectedCounts};
use engine::exit_codes;
use engine::io::artifact::validate_artifact;
use engine::io::config::{EngineConfig, load_config, validate_slot};
use engine::io::context::extract_context;
use engine::io::executor::ProcessExecutor;
use engine::io::generator::build_generator;
use engine::io::rules_store::load_rules;
use engine::io::verified_store::FsVerifiedStore;
use engine::logging;
use engine::runtime::{ClassifierSource, PipelineRequest, resolve_classifier, run_pipeline};

#[derive(Parser)]
#[command(
    name = "engine",
    version,
    about = "Generate, verify, and run data classification code"
)]
struct Cli {
    /// Engine configuration file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print (or write) the schema context derived from a data file.
    Context {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a rule document against the schema and consistency rules.
    Rules {
        #[arg(long)]
        rules: PathBuf,
    },
    /// Run the generate/execute/validate loop for one scenario.
    Compile {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        rules: PathBuf,
        /// Schema context text; derived from the data when missing.
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Where candidate code must write its classified table.
        #[arg(long)]
        output: PathBuf,
        /// Expected category count, `CATEGORY=N`. Repeatable.
        #[arg(long = "expect", value_parser = parse_expectation)]
        expect: Vec<(String, usize)>,
        #[arg(long, default_value = "default")]
        label: String,
        /// Verified store slot to promote into (defaults to `paths.default_slot`).
        #[arg(long)]
        slot: Option<String>,
    },
    /// Validate a classified table on disk.
    Validate {
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long = "expect", value_parser = parse_expectation)]
        expect: Vec<(String, usize)>,
    },
    /// Apply the verified artifact (or native rules) to a data file.
    Run {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, conflicts_with = "native_rules")]
        slot: Option<String>,
        /// TOML rule classifier evaluated in-process instead of verified code.
        #[arg(long)]
        native_rules: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Context { data, out } => cmd_context(&data, out.as_deref()),
        Command::Rules { rules } => cmd_rules(&rules),
        Command::Compile {
            data,
            rules,
            schema,
            output,
            expect,
            label,
            slot,
        } => {
            let slot = slot.unwrap_or_else(|| config.paths.default_slot.clone());
            validate_slot(&slot)?;
            let request = CompileRequest {
                scenario_label: label,
                data_path: data,
                schema_path: schema,
                rules_path: rules,
                output_path: output,
                expected: expected_counts(expect),
                slot,
            };
            cmd_compile(&config, &request)
        }
        Command::Validate { artifact, expect } => {
            cmd_validate(&config, &artifact, expected_counts(expect).as_ref())
        }
        Command::Run {
            data,
            slot,
            native_rules,
        } => {
            let source = match native_rules {
                Some(rules_path) => ClassifierSource::Native { rules_path },
                None => ClassifierSource::Verified {
                    slot: slot.unwrap_or_else(|| config.paths.default_slot.clone()),
                },
            };
            cmd_run(&config, data, &source)
        }
    }
}

fn cmd_context(data: &Path, out: Option<&Path>) -> Result<i32> {
    let text = extract_context(data)?.render();
    match out {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(exit_codes::OK)
}

fn cmd_rules(path: &Path) -> Result<i32> {
    let rules = load_rules(path)?;
    println!(
        "{} rules ok ({})",
        rules.rules.len(),
        if rules.is_degraded() {
            "fallback"
        } else {
            "extracted"
        }
    );
    for (index, rule) in rules.rules.iter().enumerate() {
        match &rule.exception {
            Some(exception) => println!(
                "  {}. [{}] {}: {} (exception: {})",
                index + 1,
                rule.id,
                rule.name,
                rule.condition,
                exception
            ),
            None => println!(
                "  {}. [{}] {}: {}",
                index + 1,
                rule.id,
                rule.name,
                rule.condition
            ),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_compile(config: &EngineConfig, request: &CompileRequest) -> Result<i32> {
    let generator = build_generator(config)?;
    let executor = ProcessExecutor {
        interpreter: config.interpreter.clone(),
        sentinel: config.sentinel.clone(),
        output_limit_bytes: config.output_limit_bytes,
    };
    let store = FsVerifiedStore::new(&config.paths.verified_dir);
    let settings = EngineSettings::from_config(config);

    let outcome = run_engine(generator.as_ref(), &executor, &store, &settings, request)?;
    print_outcome(&outcome);
    println!(
        "outcome: {}",
        settings.work_dir.join(OUTCOME_FILE).display()
    );
    Ok(match outcome.stop {
        EngineStop::Succeeded { .. } => exit_codes::OK,
        EngineStop::Exhausted { .. } => exit_codes::FAILED,
        EngineStop::GeneratorUnavailable { .. } => exit_codes::GENERATOR_UNAVAILABLE,
    })
}

fn print_outcome(outcome: &EngineOutcome) {
    println!("scenario: {}", outcome.scenario_label);
    if outcome.degraded_rules {
        println!("warning: rules came from the fallback parser");
    }
    for record in &outcome.attempts {
        let status = record.failure.map_or("passed", |kind| kind.as_str());
        println!("attempt {}: {}", record.attempt, status);
    }
    match &outcome.stop {
        EngineStop::Succeeded { attempt } => println!("SUCCEEDED on attempt {attempt}"),
        EngineStop::Exhausted {
            attempts,
            max_attempts,
        } => println!("EXHAUSTED after {attempts} of {max_attempts} attempts"),
        EngineStop::GeneratorUnavailable { attempt, reason } => {
            println!("GENERATOR UNAVAILABLE on attempt {attempt}: {reason}");
        }
    }
    if !outcome.last_validation_report.is_empty() {
        println!("{}", outcome.last_validation_report);
    }
}

fn cmd_validate(
    config: &EngineConfig,
    artifact: &Path,
    expected: Option<&ExpectedCounts>,
) -> Result<i32> {
    let result = validate_artifact(artifact, &config.table.category_column, expected);
    println!("{}", result.report);
    if result.passed {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILED)
    }
}

fn cmd_run(config: &EngineConfig, data: PathBuf, source: &ClassifierSource) -> Result<i32> {
    let store = FsVerifiedStore::new(&config.paths.verified_dir);
    let classifier = resolve_classifier(config, &store, source)?;
    let request = PipelineRequest::from_config(config, data);
    let summary = run_pipeline(classifier.as_ref(), &request)?;
    println!(
        "classified {} rows: {} violations ({}%)",
        summary.total_items, summary.total_violations, summary.violation_rate
    );
    for (category, stats) in &summary.categories {
        println!("  {category}: {}", stats.count);
    }
    println!("classified: {}", request.classified_path.display());
    println!("violations: {}", request.violations_path.display());
    println!("summary: {}", request.summary_path.display());
    Ok(exit_codes::OK)
}

fn expected_counts(pairs: Vec<(String, usize)>) -> Option<ExpectedCounts> {
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.into_iter().collect())
    }
}

fn parse_expectation(raw: &str) -> Result<(String, usize)> {
    let (category, count) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected CATEGORY=N, got '{raw}'"))?;
    let category = category.trim();
    if category.is_empty() {
        return Err(anyhow!("empty category in '{raw}'"));
    }
    let count = count
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid count in '{raw}'"))?;
    Ok((category.to_string(), count))
}
