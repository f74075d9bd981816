use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use common::config::{BackendKind, SimulationConfig};
use coordinator::{experiment, load_world, summary_line, ExperimentConfig};
use futures::StreamExt;
use simulator::Orchestrator;
use smol::block_on;

#[derive(Parser, Debug)]
#[command(name = "langmuir")]
#[command(version)]
#[command(about = "Kinetic Monte Carlo charge transport on a cubic lattice", long_about = None)]
struct Args {
    /// Parameter file of `key = value` lines; defaults are used when omitted
    config: Option<PathBuf>,

    /// Number of ticks, overriding `iterations.real`
    #[arg(long)]
    ticks: Option<u64>,

    /// Random seed, overriding `random.seed`
    #[arg(long)]
    seed: Option<u64>,

    /// Use the GPU potential backend
    #[arg(long)]
    gpu: bool,

    /// Restore carrier, defect and trap sites from this checkpoint
    #[arg(long)]
    checkpoint_in: Option<PathBuf>,

    /// Write the final sites to this checkpoint
    #[arg(long)]
    checkpoint_out: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_key_values(&std::fs::read_to_string(path)?)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if args.gpu {
        config.backend = BackendKind::Gpu;
    }

    let mut experiment_config = ExperimentConfig::from_simulation(&config).progress(!args.no_progress);
    if let Some(ticks) = args.ticks {
        experiment_config = experiment_config.ticks(ticks);
    }
    if let Some(path) = &args.checkpoint_out {
        experiment_config = experiment_config.checkpoint_out(path);
    }
    let experiment_config = experiment_config.finalize();

    let mut world = load_world(config, args.checkpoint_in.as_deref())?;
    let (tx, mut rx) = futures::channel::mpsc::unbounded();
    let mut orchestrator = Orchestrator::new();
    orchestrator.observe(tx);

    let print_every = experiment_config.print_every();
    let printer = async move {
        while let Some(report) = rx.next().await {
            if report.tick % print_every == 0 {
                println!("{}", summary_line(&report));
            }
        }
    };
    let (summary, ()) = block_on(futures::future::join(
        experiment(&mut world, orchestrator, &experiment_config, None),
        printer,
    ));
    let summary = summary?;

    println!(
        "{} {} ticks, seed {}, acceptance {:.3}",
        "finished".green().bold(),
        summary.ticks,
        world.random_seed(),
        summary.acceptance_ratio()
    );
    println!(
        "  electrons {} ({:.1}% of max), holes {} ({:.1}% of max)",
        summary.electrons,
        world.reached_electrons(),
        summary.holes,
        world.reached_holes()
    );
    println!(
        "  injected {}, extracted {}, recombined {}",
        summary.injected.to_string().cyan(),
        summary.extracted.to_string().cyan(),
        summary.recombined.to_string().cyan()
    );

    Ok(())
}
