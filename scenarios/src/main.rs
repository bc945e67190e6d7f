mod case;
mod cli;
mod config;
mod fixtures;
mod outcome;
mod report;
mod results;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::run::HarnessPaths;

#[derive(Parser)]
#[command(
    name = "scenarios",
    version,
    about = "Multi-scenario harness for the classification engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Seed {
        case_id: String,
    },
    Run {
        case_id: String,
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    RunAll {
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    Report {
        case_id: String,
    },
    Clean {
        case_id: String,
    },
}

fn main() -> Result<()> {
    engine::logging::init();
    let cli = Cli::parse();
    let paths = HarnessPaths::new(&std::env::current_dir()?);
    let passed = match cli.command {
        Command::List => cli::list_cases(&paths).map(|()| true)?,
        Command::Seed { case_id } => cli::seed_case_by_id(&paths, &case_id).map(|()| true)?,
        Command::Run { case_id, runs } => cli::run_case_by_id(&paths, &case_id, runs)?,
        Command::RunAll { runs } => cli::run_all(&paths, runs)?,
        Command::Report { case_id } => cli::report_case(&paths, &case_id).map(|()| true)?,
        Command::Clean { case_id } => cli::clean_case(&paths, &case_id).map(|()| true)?,
    };
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
