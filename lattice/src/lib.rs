#![forbid(
    missing_docs,
    clippy::missing_assert_message,
    clippy::missing_docs_in_private_items,
    clippy::missing_asserts_for_indexing,
    clippy::missing_panics_doc
)]
//! Defines the discretized 3-D device lattice and the precomputed Coulomb interaction table.

/// Contains the [`Lattice`](crate::grid::Lattice): site indexing, neighbor enumeration,
/// displacement geometry, and the site-type map (normal, defect, trap).
pub mod grid;

/// Contains the [`InteractionTable`](crate::interaction::InteractionTable) of pairwise Coulomb
/// energies indexed by lattice displacement.
pub mod interaction;

pub use common::config::{BoundaryPolicy, SiteType};
pub use grid::{Coordinate, Displacement, Face, Lattice, Neighbors, SiteId};
pub use interaction::InteractionTable;
