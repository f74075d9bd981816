use common::{
    config::{BoundaryPolicy, SimulationConfig},
    error::{Error, Result},
    vector::Vector,
};
use log::debug;

use crate::grid::{Displacement, Lattice};

/// Pairwise Coulomb energies indexed by lattice displacement.
///
/// The energy only depends on `|dx|, |dy|, |dz|`, so the table stores one octant and is
/// symmetric under negation by construction. Entries beyond the cutoff radius, and the zero
/// displacement, are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTable {
    /// Number of stored absolute offsets per axis.
    extent: Vector<usize, 3>,
    /// Lattice extents the table was built for.
    dims: Vector<usize, 3>,
    /// Boundary policy the extents were derived under.
    boundary: BoundaryPolicy,
    /// Cutoff radius in lattice units.
    cutoff: usize,
    /// `energies[(|dz| * ey + |dy|) * ex + |dx|]`
    energies: Vec<f64>,
}

impl InteractionTable {
    /// Builds the table of `prefactor / r` for every displacement with `0 < r <= cutoff`,
    /// where `r` is in lattice units.
    pub fn coulomb(lattice: &Lattice, prefactor: f64, cutoff: usize) -> Self {
        let extent = lattice.max_displacement().map(|m| m.min(cutoff) + 1);
        let radius_squared = (cutoff as f64).powi(2);
        let mut energies = Vec::with_capacity(extent.product());
        for dz in 0..extent[2] {
            for dy in 0..extent[1] {
                for dx in 0..extent[0] {
                    let r2 = Vector::new([dx, dy, dz]).map(|c| c as f64).norm_squared();
                    let energy = if r2 > 0.0 && r2 <= radius_squared {
                        prefactor / r2.sqrt()
                    } else {
                        0.0
                    };
                    energies.push(energy);
                }
            }
        }
        debug!(
            "built interaction table with {} entries, cutoff {cutoff}, prefactor {prefactor:e} eV",
            energies.len()
        );

        Self {
            extent,
            dims: lattice.dims(),
            boundary: lattice.boundary(),
            cutoff,
            energies,
        }
    }

    /// A table that evaluates to zero everywhere.
    pub fn disabled(lattice: &Lattice) -> Self {
        Self::coulomb(lattice, 0.0, 0)
    }

    /// Builds the table described by `config`, or a disabled table when Coulomb interactions
    /// are switched off.
    pub fn from_config(lattice: &Lattice, config: &SimulationConfig) -> Self {
        if config.coulomb_interaction {
            Self::coulomb(lattice, config.coulomb_prefactor(), config.coulomb_cutoff)
        } else {
            Self::disabled(lattice)
        }
    }

    /// The interaction energy at `displacement`, zero beyond the cutoff.
    pub fn energy_at(&self, displacement: Displacement) -> f64 {
        let d = displacement.abs();
        if (0..3).any(|axis| d[axis] as usize >= self.extent[axis]) {
            return 0.0;
        }
        self.energies[(d[2] as usize * self.extent[1] + d[1] as usize) * self.extent[0] + d[0] as usize]
    }

    /// Number of stored absolute offsets per axis.
    pub fn extent(&self) -> Vector<usize, 3> {
        self.extent
    }

    /// The cutoff radius in lattice units.
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// The raw table, laid out as described on [`InteractionTable`].
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Whether every entry is zero.
    pub fn is_disabled(&self) -> bool {
        self.energies.iter().all(|e| *e == 0.0)
    }

    /// Checks that the table was built for the extents and boundary policy of `lattice`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if either differs.
    pub fn check_geometry(&self, lattice: &Lattice) -> Result<()> {
        if self.dims != lattice.dims() || self.boundary != lattice.boundary() {
            return Err(Error::consistency(
                "InteractionTable::check_geometry",
                format!(
                    "table built for {:?} {:?} but lattice is {:?} {:?}",
                    self.boundary,
                    self.dims.as_array(),
                    lattice.boundary(),
                    lattice.dims().as_array()
                ),
            ));
        }
        Ok(())
    }
}
