//! Kinetic Monte Carlo transport of electrons and holes on a [`lattice::Lattice`].
//!
//! A [`World`] owns the lattice, the interaction table, one potential field per species, the
//! compute backend, the carriers and the flux agents. An [`Orchestrator`] advances it tick by
//! tick with a parallel propose phase and a serial decide phase.

pub mod carrier;
pub mod checkpoint;
pub mod flux;
pub mod occupancy;
pub mod tick;
pub mod world;

pub use carrier::{Carrier, CarrierId, Species, TransportState};
pub use checkpoint::CheckpointRecord;
pub use flux::{FluxAgent, FluxKind, Injection};
pub use tick::Orchestrator;
pub use world::World;
