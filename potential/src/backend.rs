use common::{
    config::{BackendKind, SimulationConfig},
    error::Result,
    messages::PointCharge,
};
use lattice::{InteractionTable, Lattice};
use log::info;

use crate::cpu::CpuBackend;
#[cfg(feature = "gpu")]
use crate::gpu::GpuBackend;

/// Aggregates the Coulomb potential of a carrier configuration.
///
/// Implementations write `out[site] = Σ charge_j · table.energy_at(displacement(site_j, site))`
/// for every lattice site. All implementations agree to floating point tolerance, so switching
/// backends never changes what carriers observe.
// ANCHOR: PotentialComputeBackend
pub trait PotentialComputeBackend: Send {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Recomputes the charge-weighted interaction sum for every site. This is a blocking call.
    ///
    /// # Errors
    /// [`Error::Consistency`](common::Error::Consistency) if `out` or `table` do not match the
    /// lattice, [`Error::Backend`](common::Error::Backend) if the device fails.
    fn recompute(
        &mut self,
        lattice: &Lattice,
        table: &InteractionTable,
        carriers: &[PointCharge],
        out: &mut [f64],
    ) -> Result<()>;
}
// ANCHOR_END: PotentialComputeBackend

/// The backend selected by configuration. A run never mixes backends.
pub enum Backend {
    /// [`CpuBackend`]
    Cpu(CpuBackend),
    /// [`GpuBackend`]
    #[cfg(feature = "gpu")]
    Gpu(Box<GpuBackend>),
}

impl Backend {
    /// Creates the backend named by `config.backend`.
    ///
    /// # Errors
    /// [`Error::Configuration`](common::Error::Configuration) if the GPU backend is requested
    /// but this build has no `gpu` feature, or the device errors of [`GpuBackend::new`].
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Cpu => Backend::Cpu(CpuBackend),
            #[cfg(feature = "gpu")]
            BackendKind::Gpu => Backend::Gpu(Box::new(GpuBackend::new()?)),
            #[cfg(not(feature = "gpu"))]
            BackendKind::Gpu => {
                return Err(common::Error::configuration(
                    "Backend::from_config",
                    "use.gpu requested but this build has no `gpu` feature",
                ))
            }
        };
        info!("using {} potential backend", backend.name());

        Ok(backend)
    }
}

impl PotentialComputeBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Cpu(cpu) => cpu.name(),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.name(),
        }
    }

    fn recompute(
        &mut self,
        lattice: &Lattice,
        table: &InteractionTable,
        carriers: &[PointCharge],
        out: &mut [f64],
    ) -> Result<()> {
        match self {
            Backend::Cpu(cpu) => cpu.recompute(lattice, table, carriers, out),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.recompute(lattice, table, carriers, out),
        }
    }
}

/// Shared argument checks of every backend.
pub(crate) fn check_arguments(lattice: &Lattice, table: &InteractionTable, out: &[f64]) -> Result<()> {
    table.check_geometry(lattice)?;
    if out.len() != lattice.volume() {
        return Err(common::Error::consistency(
            "PotentialComputeBackend::recompute",
            format!("output holds {} values for {} sites", out.len(), lattice.volume()),
        ));
    }
    Ok(())
}
