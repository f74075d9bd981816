use std::path::PathBuf;

use common::{config::SimulationConfig, messages::TickReport, ErrorKind};
use coordinator::{experiment, load_world, save_checkpoint, ExperimentConfig, StopHandle};
use futures::StreamExt;
use simulator::{Orchestrator, World};
use smol::block_on;

fn config(seed: u64) -> SimulationConfig {
    SimulationConfig::build()
        .grid(8, 6, 2)
        .occupancy(0.1, 0.0)
        .disorder(0.05, 0.05, -0.1)
        .seed_charges(true)
        .rates(0.5, 0.5)
        .coulomb(true, 3)
        .iterations(20, 5)
        .random_seed(seed)
        .finalize()
        .unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("langmuir-{}-{name}.bin", std::process::id()))
}

#[test]
fn test_experiment_runs_every_tick() {
    let config = config(11);
    let experiment_config = ExperimentConfig::from_simulation(&config).finalize();
    let mut world = World::new(config).unwrap();

    let summary = block_on(experiment(
        &mut world,
        Orchestrator::new(),
        &experiment_config,
        None,
    ))
    .unwrap();

    assert_eq!(summary.ticks, 20);
    assert!(!summary.stopped_early);
    assert_eq!(world.tick(), 20);
    assert_eq!(summary.electrons, world.num_electrons());
    assert!(summary.accepted <= summary.attempted);
}

#[test]
fn test_report_channel_closes_with_the_run() {
    let mut world = World::new(config(12)).unwrap();
    let (tx, rx) = futures::channel::mpsc::unbounded::<TickReport>();
    let mut orchestrator = Orchestrator::new();
    orchestrator.observe(tx);
    let experiment_config = ExperimentConfig::build().ticks(7).finalize();

    let (summary, ticks) = block_on(futures::future::join(
        experiment(&mut world, orchestrator, &experiment_config, None),
        rx.map(|report| report.tick).collect::<Vec<_>>(),
    ));

    assert_eq!(summary.unwrap().ticks, 7);
    assert_eq!(ticks, (1..=7).collect::<Vec<_>>());
}

#[test]
fn test_stop_handle_halts_between_ticks() {
    let mut world = World::new(config(13)).unwrap();
    let stop = StopHandle::new();
    let trigger = stop.clone();
    let mut orchestrator = Orchestrator::new();
    orchestrator.observe(move |report: &TickReport| {
        if report.tick == 3 {
            trigger.stop();
        }
    });
    let experiment_config = ExperimentConfig::build().ticks(50).finalize();

    let summary = block_on(experiment(&mut world, orchestrator, &experiment_config, Some(&stop))).unwrap();

    assert!(summary.stopped_early);
    assert_eq!(summary.ticks, 3);
    assert_eq!(world.tick(), 3);
}

#[test]
fn test_checkpoint_file_restores_the_world() {
    let path = temp_path("restore");
    let experiment_config = ExperimentConfig::build().ticks(10).checkpoint_out(&path).finalize();
    let mut world = World::new(config(14)).unwrap();

    block_on(experiment(
        &mut world,
        Orchestrator::new(),
        &experiment_config,
        None,
    ))
    .unwrap();
    let restored = load_world(config(14), Some(&path)).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(restored.checkpoint(), world.checkpoint());
    assert_eq!(restored.tick(), 0);
}

#[test]
fn test_truncated_checkpoint_file_is_rejected() {
    let path = temp_path("truncated");
    let world = World::new(config(15)).unwrap();
    save_checkpoint(&world, &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

    let error = load_world(config(15), Some(&path)).err().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(error.kind(), ErrorKind::BoundaryFormat);
}

#[test]
fn test_missing_checkpoint_file_is_an_io_error() {
    let error = load_world(config(16), Some(&temp_path("missing"))).err().unwrap();

    assert_eq!(error.kind(), ErrorKind::Io);
}
