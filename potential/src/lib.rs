#![forbid(
    missing_docs,
    clippy::missing_assert_message,
    clippy::missing_docs_in_private_items,
    clippy::missing_asserts_for_indexing,
    clippy::missing_panics_doc
)]
//! Per-site potential energies and the interchangeable backends that aggregate the Coulomb
//! contribution of the current carrier configuration.

/// Contains the [`PotentialField`](crate::field::PotentialField) of one carrier species.
pub mod field;

/// Contains the [`PotentialComputeBackend`](crate::backend::PotentialComputeBackend) seam and
/// the configuration-selected [`Backend`](crate::backend::Backend).
pub mod backend;

/// Contains the data-parallel CPU backend.
pub mod cpu;

/// Contains the `wgpu` compute-shader backend.
#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{Backend, PotentialComputeBackend};
pub use cpu::CpuBackend;
pub use field::PotentialField;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;
