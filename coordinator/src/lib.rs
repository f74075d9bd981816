//! The driving loop around a [`World`]: runs a fixed number of ticks, reports progress, honours
//! a cooperative stop request and persists the final configuration.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use colored::Colorize;
use common::{config::SimulationConfig, error::Result, messages::TickReport};
use log::info;
use simulator::{CheckpointRecord, Orchestrator, World};
use tqdm::Iter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentConfig {
    ticks: u64,
    print_every: u64,
    checkpoint_out: Option<PathBuf>,
    progress: bool,
}

impl ExperimentConfig {
    pub fn build() -> ExperimentConfigBuilder {
        ExperimentConfigBuilder {
            ticks: None,
            print_every: None,
            checkpoint_out: None,
            progress: None,
        }
    }

    /// Takes the tick counts from the `iterations.*` parameters of a simulation config.
    pub fn from_simulation(config: &SimulationConfig) -> ExperimentConfigBuilder {
        Self::build()
            .ticks(config.iterations_real as u64)
            .print_every(config.iterations_print as u64)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn print_every(&self) -> u64 {
        self.print_every
    }

    pub fn checkpoint_out(&self) -> Option<&Path> {
        self.checkpoint_out.as_deref()
    }
}

pub struct ExperimentConfigBuilder {
    ticks: Option<u64>,
    print_every: Option<u64>,
    checkpoint_out: Option<PathBuf>,
    progress: Option<bool>,
}

impl ExperimentConfigBuilder {
    pub fn ticks(mut self, ticks: u64) -> Self {
        self.ticks.replace(ticks);

        self
    }

    pub fn print_every(mut self, print_every: u64) -> Self {
        self.print_every.replace(print_every);

        self
    }

    pub fn checkpoint_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_out.replace(path.into());

        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.progress.replace(progress);

        self
    }

    pub fn finalize(self) -> ExperimentConfig {
        ExperimentConfig {
            ticks: self.ticks.unwrap_or(0),
            print_every: self.print_every.unwrap_or(100).max(1),
            checkpoint_out: self.checkpoint_out,
            progress: self.progress.unwrap_or(false),
        }
    }
}

/// A cloneable flag that asks a running [`experiment`] to stop after the current tick.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Totals over every tick an [`experiment`] committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub stopped_early: bool,
    pub attempted: u64,
    pub accepted: u64,
    pub injected: u64,
    pub extracted: u64,
    pub recombined: u64,
    pub electrons: usize,
    pub holes: usize,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.attempted += report.attempted;
        self.accepted += report.accepted;
        self.injected += report.injected;
        self.extracted += report.extracted;
        self.recombined += report.recombined;
        self.electrons = report.electrons;
        self.holes = report.holes;
    }

    pub fn acceptance_ratio(&self) -> f64 {
        if self.attempted > 0 {
            self.accepted as f64 / self.attempted as f64
        } else {
            0.0
        }
    }
}

/// Runs `config.ticks()` ticks of `world`.
///
/// The orchestrator is consumed so that its observers, and with them any report channels, are
/// dropped once the run is over. A stop handle, when given, is checked between ticks; a stopped
/// run still writes its checkpoint.
///
/// # Errors
/// The first error of [`Orchestrator::step`], or an I/O error while writing the checkpoint.
pub async fn experiment(
    world: &mut World,
    mut orchestrator: Orchestrator,
    config: &ExperimentConfig,
    stop: Option<&StopHandle>,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        electrons: world.num_electrons(),
        holes: world.num_holes(),
        ..Default::default()
    };
    let ticks: Box<dyn Iterator<Item = u64>> = if config.progress {
        Box::new((0..config.ticks).tqdm())
    } else {
        Box::new(0..config.ticks)
    };

    info!(
        "running {} ticks on a {}x{}x{} lattice (seed {})",
        config.ticks,
        world.lattice().width(),
        world.lattice().height(),
        world.lattice().depth(),
        world.random_seed()
    );
    for _ in ticks {
        if stop.is_some_and(StopHandle::is_stopped) {
            summary.stopped_early = true;
            info!("stop requested after tick {}", world.tick());
            break;
        }
        let report = orchestrator.step(world)?;
        summary.record(&report);
        if report.tick % config.print_every == 0 {
            info!(
                "tick {}: {} electrons, {} holes, acceptance {:.3}",
                report.tick,
                report.electrons,
                report.holes,
                report.acceptance_ratio()
            );
        }
        smol::future::yield_now().await;
    }
    drop(orchestrator);

    if let Some(path) = config.checkpoint_out() {
        save_checkpoint(world, path)?;
    }
    Ok(summary)
}

/// Builds a world from `config`, restoring the sites of a checkpoint file when one is given.
///
/// # Errors
/// Configuration errors from [`World`] construction, I/O errors opening the file, and
/// format errors from [`CheckpointRecord::read_from`].
pub fn load_world(config: SimulationConfig, checkpoint: Option<&Path>) -> Result<World> {
    match checkpoint {
        Some(path) => {
            let record = CheckpointRecord::read_from(&mut BufReader::new(File::open(path)?))?;
            info!("restoring checkpoint {}", path.display());
            World::from_checkpoint(config, &record)
        }
        None => World::new(config),
    }
}

/// Writes the current sites of `world` to `path`.
///
/// # Errors
/// I/O errors creating or writing the file.
pub fn save_checkpoint(world: &World, path: &Path) -> Result<()> {
    let record = world.checkpoint();
    record.write_to(&mut BufWriter::new(File::create(path)?))?;
    info!(
        "checkpoint written to {} ({} electrons, {} holes)",
        path.display(),
        record.electrons.len(),
        record.holes.len()
    );
    Ok(())
}

/// One colored progress line for a tick.
pub fn summary_line(report: &TickReport) -> String {
    let flux = report
        .flux
        .iter()
        .map(|f| format!("{} {}/{}", f.label, f.successes, f.attempts))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} {} {} {} {}",
        format!("tick {:>8}", report.tick).bold(),
        format!("e- {:>6}", report.electrons).blue(),
        format!("h+ {:>6}", report.holes).red(),
        format!("accept {:.3}", report.acceptance_ratio()).green(),
        flux.dimmed()
    )
}
