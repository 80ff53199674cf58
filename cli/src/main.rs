//! offload-sim-cli — experiment runner.
//!
//! Thin binary: parse a TOML/JSON experiment file, drive `offload_sim`,
//! write the CSV export. Contains no algorithmic content, matching
//! spec.md's framing of the UI/export surface as outside the core.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};

use offload_sim::cancellation::CancellationToken;
use offload_sim::csv_export::export_csv;
use offload_sim::optimizer::{AnyOptimizer, DifferentialEvolutionOptimizer, GeneticOptimizer};
use offload_sim::Simulation;
use offload_types::ExperimentConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptimizerChoice {
    Genetic,
    DifferentialEvolution,
}

#[derive(Parser, Debug)]
#[command(name = "offload-sim-cli", about = "Baseline vs Predictive edge-offload scheduling simulation")]
struct Args {
    /// Experiment config file (.toml or .json, detected by extension)
    #[arg(short, long)]
    config: PathBuf,

    /// Where to write the CSV export. Defaults to stdout when omitted.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Predictive-policy optimizer implementation
    #[arg(long, value_enum, default_value = "genetic")]
    optimizer: OptimizerChoice,

    /// Additional random restarts per decision (overrides config)
    #[arg(long)]
    restarts: Option<usize>,
}

fn load_config(path: &PathBuf) -> Result<ExperimentConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", path.display())),
        _ => toml::from_str(&text).with_context(|| format!("parsing {} as TOML", path.display())),
    }
}

fn build_optimizer(config: &ExperimentConfig, choice: OptimizerChoice, restarts_override: Option<usize>) -> AnyOptimizer {
    let p = &config.globals.optimizer;
    let restarts = restarts_override.unwrap_or(p.restarts);
    let budget_ms = config.globals.optimizer_time_budget_ms;
    match choice {
        OptimizerChoice::Genetic => AnyOptimizer::Genetic(GeneticOptimizer {
            population: p.population,
            generations: p.generations,
            mutation_probability: p.mutation_probability,
            restarts,
            budget_ms,
        }),
        OptimizerChoice::DifferentialEvolution => AnyOptimizer::DifferentialEvolution(DifferentialEvolutionOptimizer {
            restarts,
            budget_ms,
            ..DifferentialEvolutionOptimizer::default()
        }),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "offload_sim_cli=info".into()))
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(
        sensors = config.sensors.len(),
        edges = config.edges.len(),
        slots = config.total_slots,
        "loaded experiment config"
    );

    let optimizer = build_optimizer(&config, args.optimizer, args.restarts);
    let sim = Simulation::new(config, optimizer).context("invalid experiment configuration")?;

    let cancellation = CancellationToken::new();
    let state = sim.run(
        &cancellation,
        |s| debug!(slot = s.current_slot, "slot processed"),
        |entry| debug!(sensor_id = %entry.sensor_id, slot = entry.slot, generation = entry.generation, best_fitness = entry.best_fitness, "optimizer generation"),
    );
    info!(status = ?state.status, slots_run = state.current_slot, "simulation finished");

    let csv_text = export_csv(&state).context("exporting CSV")?;
    match args.out {
        Some(path) => {
            fs::write(&path, csv_text).with_context(|| format!("writing CSV to {}", path.display()))?;
            info!(path = %path.display(), "wrote CSV export");
        }
        None => print!("{csv_text}"),
    }

    Ok(())
}
