use common::error::{Error, Result};
use lattice::{InteractionTable, Lattice, SiteId};

/// The potential energy landscape seen by one carrier species.
///
/// Every value is an energy in eV for a carrier of charge `charge`, so the hop energy change is
/// a plain difference of two sites. The static part (linear bias plus trap energies) is fixed
/// during initialization; the dynamic part mirrors the last committed carrier configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialField {
    /// Charge sign of the species that reads this field.
    charge: i8,
    /// Bias and trap energy per site.
    static_potential: Vec<f64>,
    /// Coulomb energy per site from the current carriers.
    dynamic_potential: Vec<f64>,
    /// Whether [`PotentialField::apply_linear_bias`] ran.
    bias_applied: bool,
    /// Whether [`PotentialField::apply_trap_energies`] ran.
    traps_applied: bool,
}

impl PotentialField {
    /// A zero field over `volume` sites for carriers of charge sign `charge`.
    pub fn new(volume: usize, charge: i8) -> Self {
        Self {
            charge,
            static_potential: vec![0.0; volume],
            dynamic_potential: vec![0.0; volume],
            bias_applied: false,
            traps_applied: false,
        }
    }

    /// The charge sign of the species that reads this field.
    pub fn charge(&self) -> i8 {
        self.charge
    }

    /// Adds the electrostatic energy of a linear potential ramp from `voltage_source` at the
    /// left face to `voltage_drain` at the right face, sampled at site centers.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the bias was already applied.
    pub fn apply_linear_bias(&mut self, lattice: &Lattice, voltage_source: f64, voltage_drain: f64) -> Result<()> {
        if self.bias_applied {
            return Err(Error::consistency(
                "PotentialField::apply_linear_bias",
                "static potential is already biased",
            ));
        }
        let width = lattice.width() as f64;
        let slope = (voltage_drain - voltage_source) / width;
        let charge = f64::from(self.charge);
        for (site, value) in self.static_potential.iter_mut().enumerate() {
            let x = lattice.coordinate(site)[0] as f64;
            *value += charge * (voltage_source + slope * (x + 0.5));
        }
        self.bias_applied = true;
        Ok(())
    }

    /// Adds the energy offset of every trap registered on `lattice`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if trap energies were already applied.
    pub fn apply_trap_energies(&mut self, lattice: &Lattice) -> Result<()> {
        if self.traps_applied {
            return Err(Error::consistency(
                "PotentialField::apply_trap_energies",
                "trap energies are already applied",
            ));
        }
        for &trap in lattice.traps() {
            self.static_potential[trap] += lattice.trap_energy(trap);
        }
        self.traps_applied = true;
        Ok(())
    }

    /// The static energy at `site`.
    pub fn static_at(&self, site: SiteId) -> f64 {
        self.static_potential[site]
    }

    /// The Coulomb energy at `site` from the last committed configuration.
    pub fn dynamic_at(&self, site: SiteId) -> f64 {
        self.dynamic_potential[site]
    }

    /// The total energy at `site`.
    pub fn total_at(&self, site: SiteId) -> f64 {
        self.static_potential[site] + self.dynamic_potential[site]
    }

    /// Replaces the dynamic part from a freshly computed charge-weighted sum `phi`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if `phi` does not cover the lattice.
    pub fn set_dynamic(&mut self, phi: &[f64]) -> Result<()> {
        if phi.len() != self.dynamic_potential.len() {
            return Err(Error::consistency(
                "PotentialField::set_dynamic",
                format!("got {} values for {} sites", phi.len(), self.dynamic_potential.len()),
            ));
        }
        let charge = f64::from(self.charge);
        for (value, phi) in self.dynamic_potential.iter_mut().zip(phi) {
            *value = charge * phi;
        }
        Ok(())
    }

    /// Incrementally adds (`charge = ±1`) or removes (`charge = ∓1`) the contribution of a
    /// single carrier at `site`, touching only sites within the interaction cutoff.
    pub fn apply_point_charge(&mut self, lattice: &Lattice, table: &InteractionTable, site: SiteId, charge: i8) {
        if table.is_disabled() {
            return;
        }
        let weight = f64::from(self.charge) * f64::from(charge);
        for target in sites_within(lattice, table, site) {
            self.dynamic_potential[target] += weight * table.energy_at(lattice.displacement(site, target));
        }
    }
}

/// Every site inside the box spanned by the table extent around `center`, each listed once.
fn sites_within(lattice: &Lattice, table: &InteractionTable, center: SiteId) -> Vec<SiteId> {
    let origin = lattice.coordinate(center);
    let dims = lattice.dims();
    let extent = table.extent();
    let periodic = lattice.boundary() == lattice::BoundaryPolicy::Periodic;

    let axes: [Vec<usize>; 3] = std::array::from_fn(|axis| {
        let n = dims[axis] as isize;
        let reach = extent[axis] as isize - 1;
        if periodic && 2 * reach + 1 >= n {
            return (0..dims[axis]).collect();
        }
        (-reach..=reach)
            .map(|offset| origin[axis] as isize + offset)
            .filter_map(|c| {
                if periodic {
                    Some(c.rem_euclid(n) as usize)
                } else {
                    (0..n).contains(&c).then_some(c as usize)
                }
            })
            .collect()
    });

    let mut sites = Vec::with_capacity(axes.iter().map(Vec::len).product());
    for &z in &axes[2] {
        for &y in &axes[1] {
            for &x in &axes[0] {
                sites.push(lattice::grid::index([x, y, z].into(), dims));
            }
        }
    }
    sites
}
