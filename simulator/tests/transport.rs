use std::collections::{HashMap, HashSet};

use common::{
    config::{SimulationConfig, SimulationType, SiteType},
    messages::TickReport,
    ErrorKind,
};
use simulator::{CheckpointRecord, Orchestrator, Species, World};

fn transistor(seed: u64) -> SimulationConfig {
    SimulationConfig::build()
        .grid(12, 8, 2)
        .occupancy(0.2, 0.0)
        .disorder(0.05, 0.05, -0.15)
        .seed_charges(true)
        .rates(0.7, 0.7)
        .coulomb(true, 4)
        .random_seed(seed)
        .finalize()
        .unwrap()
}

fn solar_cell(seed: u64) -> SimulationConfig {
    SimulationConfig::build()
        .grid(10, 10, 1)
        .occupancy(0.15, 0.15)
        .seed_charges(true)
        .rates(0.5, 0.5)
        .recombination(0.3)
        .coulomb(true, 3)
        .simulation_type(SimulationType::SolarCell)
        .random_seed(seed)
        .finalize()
        .unwrap()
}

fn assert_unique_sites(world: &World) {
    let mut seen = HashSet::new();
    for species in Species::ALL {
        for carrier in world.carriers(species) {
            assert!(!world.lattice().is_defect(carrier.site()), "carrier on defect {}", carrier.site());
            assert!(seen.insert(carrier.site()), "two carriers on site {}", carrier.site());
        }
    }
    world.check_occupancy().unwrap();
}

#[test]
fn test_occupancy_stays_unique() {
    for config in [transistor(5), solar_cell(6)] {
        let mut world = World::new(config).unwrap();
        let mut orchestrator = Orchestrator::new();
        for _ in 0..40 {
            orchestrator.step(&mut world).unwrap();
            assert_unique_sites(&world);
        }
    }
}

#[test]
fn test_transport_conserves_attempts_and_carriers() {
    let mut world = World::new(transistor(17)).unwrap();
    let mut orchestrator = Orchestrator::new();

    for _ in 0..30 {
        let before: HashMap<_, _> = world
            .carriers(Species::Electron)
            .iter()
            .map(|c| (c.id(), c.stats()))
            .collect();
        let electrons = world.num_electrons();

        let report = orchestrator.step(&mut world).unwrap();

        assert_eq!(report.attempted, report.accepted + report.rejected);
        assert_eq!(report.attempted as usize, before.len());
        assert_eq!(
            report.electrons as u64,
            electrons as u64 + report.injected - report.extracted - report.recombined
        );
        for carrier in world.carriers(Species::Electron) {
            let stats = carrier.stats();
            assert_eq!(stats.attempted, stats.accepted + stats.rejected);
            if let Some(previous) = before.get(&carrier.id()) {
                assert_eq!(stats.attempted, previous.attempted + 1);
            } else {
                assert_eq!(stats.attempted, 0);
            }
        }
    }
}

#[test]
fn test_identical_seeds_give_identical_trajectories() {
    let mut a = World::new(solar_cell(99)).unwrap();
    let mut b = World::new(solar_cell(99)).unwrap();
    let mut orchestrator = Orchestrator::new();

    assert_eq!(a.checkpoint(), b.checkpoint());
    for _ in 0..25 {
        let ra = orchestrator.step(&mut a).unwrap();
        let rb = orchestrator.step(&mut b).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a.checkpoint(), b.checkpoint());
    }
}

#[test]
fn test_single_electron_moves_downhill() {
    let config = SimulationConfig::build()
        .grid(10, 10, 1)
        .occupancy(0.01, 0.0)
        .voltages(0.0, 1.0)
        .coulomb(false, 0)
        .rates(0.0, 0.0)
        .random_seed(2024)
        .finalize()
        .unwrap();
    let placements = CheckpointRecord {
        electrons: vec![0],
        ..Default::default()
    };
    let mut world = World::with_placements(config, &placements).unwrap();
    let field = world.field(Species::Electron).clone();
    assert!(field.total_at(1) < field.total_at(0));

    let report = Orchestrator::new().step(&mut world).unwrap();

    // Every neighbor of site 0 is at most as high, so the hop is always accepted.
    assert_eq!(report.accepted, 1);
    let site = world.carriers(Species::Electron)[0].site();
    assert!(site == 1 || site == 10, "moved to {site}");
    assert!(field.total_at(site) <= field.total_at(0));
}

#[test]
fn test_half_filled_cube_is_seeded_exactly() {
    let config = SimulationConfig::build()
        .grid(4, 4, 4)
        .occupancy(0.5, 0.0)
        .seed_charges(true)
        .random_seed(8)
        .finalize()
        .unwrap();
    let world = World::new(config).unwrap();

    assert_eq!(world.max_electrons(), 32);
    assert_eq!(world.num_electrons(), 32);
    assert_unique_sites(&world);
}

#[test]
fn test_unreachable_occupancy_fails_after_retry_budget() {
    let mut config = SimulationConfig::build()
        .grid(4, 4, 4)
        .occupancy(0.5, 0.0)
        .seed_charges(true)
        .random_seed(8)
        .finalize()
        .unwrap();
    config.coupling.set(SiteType::Source, SiteType::Normal, 0.0);

    let error = World::new(config).err().unwrap();
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert!(error.to_string().contains("exceeded max tries (640)"), "{error}");
}

#[test]
fn test_checkpoint_restores_the_same_sites() {
    let mut world = World::new(solar_cell(4)).unwrap();
    Orchestrator::new().run(&mut world, 10).unwrap();
    let record = world.checkpoint();

    let mut bytes = Vec::new();
    record.write_to(&mut bytes).unwrap();
    let read = CheckpointRecord::read_from(&mut bytes.as_slice()).unwrap();
    let restored = World::from_checkpoint(solar_cell(4), &read).unwrap();

    assert_eq!(restored.checkpoint(), record);
    assert_unique_sites(&restored);
}

#[test]
fn test_truncated_checkpoint_is_fatal() {
    let world = World::new(transistor(1)).unwrap();
    let bytes = world.checkpoint().to_bytes();

    let error = CheckpointRecord::read_from(&mut &bytes[..bytes.len() - 3]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::BoundaryFormat);
}

#[test]
fn test_observers_see_every_committed_tick() {
    let mut world = World::new(transistor(3)).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let mut orchestrator = Orchestrator::new();
    orchestrator.observe(move |report: &TickReport| tx.send(report.tick).unwrap());
    orchestrator.run(&mut world, 5).unwrap();

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(world.tick(), 5);
}

#[test]
fn test_closed_report_channel_stops_the_run() {
    let mut world = World::new(transistor(3)).unwrap();
    let (tx, rx) = futures::channel::mpsc::unbounded::<TickReport>();
    drop(rx);
    let mut orchestrator = Orchestrator::new();
    orchestrator.observe(tx);

    let error = orchestrator.step(&mut world).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Observer);
}
