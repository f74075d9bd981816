#![forbid(
    missing_docs,
    clippy::missing_assert_message,
    clippy::missing_docs_in_private_items,
    clippy::missing_asserts_for_indexing,
    clippy::missing_panics_doc
)]
//! This crate defines the common types, configuration, errors, and seams shared by the
//! charge-transport Monte Carlo workspace.

/// Defines the [`SimulationConfig`](crate::config::SimulationConfig) consumed by every other
/// crate, its builder, and the key/value parameter parser.
pub mod config;

/// Defines the error taxonomy: configuration, consistency, and checkpoint format failures.
pub mod error;

/// Defines the interfaces accessible to the outside of a running simulation:
/// - Tick observers: invoked once per committed tick with a
///   [`TickReport`](crate::messages::TickReport).
pub mod interfaces;

/// Defines the plain-data messages that cross crate boundaries: point charges handed to the
/// potential backends and the per-tick reports handed to observers.
pub mod messages;

/// Defines a small [`Copy`] [`Vector<T, const DIMS: usize>`](crate::vector::Vector) that wraps
/// the array type. Lattice coordinates and displacements are expressed with it.
pub mod vector;

pub use error::{Error, ErrorKind, Result};
