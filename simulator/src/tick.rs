use common::{
    error::Result,
    interfaces::TickObserver,
    messages::{FluxReport, TickReport},
};
use log::debug;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    carrier::{Species, TransportContext, TransportState},
    world::World,
};

/// Drives a [`World`] one tick at a time and notifies observers after each committed tick.
#[derive(Default)]
pub struct Orchestrator {
    observers: Vec<Box<dyn TickObserver>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer that sees every report from now on.
    pub fn observe(&mut self, observer: impl TickObserver + 'static) -> &mut Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Runs one tick:
    ///
    /// 1. every live carrier proposes a hop in parallel against the committed field,
    /// 2. proposals are decided serially in a shuffled order, re-checking occupancy,
    /// 3. the dynamic field is recomputed from the new configuration,
    /// 4. sources inject, drains extract and optional recombination runs,
    /// 5. removed carriers are purged and the tick counter advances.
    ///
    /// Observers only see the report after all of this succeeded.
    ///
    /// # Errors
    /// Any error is fatal for the run: missing coupling constants, occupancy inconsistencies,
    /// backend failures and observer failures are all returned as is.
    pub fn step(&mut self, world: &mut World) -> Result<TickReport> {
        propose(world)?;
        let (accepted, rejected) = decide(world)?;
        world.check_occupancy()?;
        world.recompute()?;

        let before: Vec<(u64, u64)> = world.flux.iter().map(|a| (a.attempts(), a.successes())).collect();
        let mut agents = std::mem::take(&mut world.flux);
        let outcome = agents.iter_mut().try_for_each(|agent| agent.run(world).map(|_| ()));
        world.flux = agents;
        outcome?;
        let recombined = world.recombine()?;
        world.purge();
        world.check_occupancy()?;
        world.tick += 1;

        let mut injected = 0;
        let mut extracted = 0;
        let flux = world
            .flux
            .iter()
            .zip(before)
            .map(|(agent, (attempts, successes))| {
                let report = FluxReport {
                    label: agent.label(),
                    attempts: agent.attempts() - attempts,
                    successes: agent.successes() - successes,
                };
                if agent.is_source() {
                    injected += report.successes;
                } else {
                    extracted += report.successes;
                }
                report
            })
            .collect();

        let report = TickReport {
            tick: world.tick,
            attempted: accepted + rejected,
            accepted,
            rejected,
            electrons: world.num_electrons(),
            holes: world.num_holes(),
            injected,
            extracted,
            recombined,
            flux,
        };
        debug!(
            "tick {}: {}/{} hops accepted, {} electrons, {} holes",
            report.tick, report.accepted, report.attempted, report.electrons, report.holes
        );
        for observer in &mut self.observers {
            observer.on_tick(&report)?;
        }

        Ok(report)
    }

    /// Runs `ticks` ticks.
    ///
    /// # Errors
    /// The first error of [`Orchestrator::step`].
    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.step(world)?;
        }
        Ok(())
    }
}

/// Lets every carrier propose in parallel. Each carrier draws from its own stream of a
/// generator keyed once per tick from the shared source, so results do not depend on
/// scheduling.
fn propose(world: &mut World) -> Result<()> {
    let key: u64 = world.rng.gen();
    let World {
        config,
        lattice,
        table,
        fields,
        carriers,
        ..
    } = world;

    for species in Species::ALL {
        let context = TransportContext {
            lattice,
            table,
            field: &fields[species.index()],
            coupling: &config.coupling,
        };
        carriers[species.index()].par_iter_mut().try_for_each(|carrier| {
            let mut rng = ChaCha8Rng::seed_from_u64(key);
            rng.set_stream(carrier.id());
            carrier.propose(&context, &mut rng)
        })?;
    }
    Ok(())
}

/// Decides every proposal serially in a random order. Returns `(accepted, rejected)`.
fn decide(world: &mut World) -> Result<(u64, u64)> {
    let kt = world.config.kt();
    let mut order: Vec<(Species, usize)> = Species::ALL
        .iter()
        .flat_map(|&species| (0..world.carriers[species.index()].len()).map(move |i| (species, i)))
        .collect();
    order.shuffle(&mut world.rng);

    let (mut accepted, mut rejected) = (0, 0);
    for (species, index) in order {
        let carrier = &mut world.carriers[species.index()][index];
        if carrier.decide(&mut world.occupancy, kt, &mut world.rng)? {
            carrier.refresh_neighbors(&world.lattice);
        }
        match carrier.state() {
            TransportState::Accepted => accepted += 1,
            TransportState::Rejected => rejected += 1,
            TransportState::Idle | TransportState::Proposed(_) => {}
        }
    }
    Ok((accepted, rejected))
}
