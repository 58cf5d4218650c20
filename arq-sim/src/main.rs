//! Entry point for `arq-sim`.
//!
//! Loads a JSON scenario, runs it and prints the summary table.  The
//! simulation itself lives in the library.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arq_sim::{Scenario, Simulation};
use clap::{Parser, Subcommand};

/// Tick-driven simulator for ARQ and congestion-control protocols.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario and print per-flow results.
    Run {
        /// Scenario file (JSON).
        #[arg(short, long)]
        scenario: PathBuf,
        /// Override the number of ticks.
        #[arg(short, long)]
        ticks: Option<u64>,
        /// Override the scenario seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print an example scenario to stdout.
    Example,
}

fn main() -> Result<()> {
    // RUST_LOG=debug shows every packet event.
    env_logger::init();

    match Cli::parse().command {
        Command::Run {
            scenario,
            ticks,
            seed,
        } => run(&scenario, ticks, seed),
        Command::Example => {
            println!("{}", Scenario::example().to_json()?);
            Ok(())
        }
    }
}

fn run(path: &Path, ticks: Option<u64>, seed: Option<u64>) -> Result<()> {
    let mut scenario = Scenario::from_path(path)
        .with_context(|| format!("loading scenario {}", path.display()))?;
    if let Some(ticks) = ticks {
        scenario.ticks = ticks;
    }
    if seed.is_some() {
        scenario.seed = seed;
    }

    log::info!(
        "running {} flow(s) for {} ticks from {}",
        scenario.flows.len(),
        scenario.ticks,
        path.display()
    );
    let mut sim = Simulation::new(&scenario).context("building simulation")?;
    let report = sim.run();
    println!("{report}");
    log::debug!("{}", sim.channel());
    Ok(())
}
