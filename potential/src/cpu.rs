use common::{error::Result, messages::PointCharge};
use lattice::{InteractionTable, Lattice};
use rayon::prelude::*;

use crate::backend::{check_arguments, PotentialComputeBackend};

/// Gathers the interaction sum per site on the rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl PotentialComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn recompute(
        &mut self,
        lattice: &Lattice,
        table: &InteractionTable,
        carriers: &[PointCharge],
        out: &mut [f64],
    ) -> Result<()> {
        check_arguments(lattice, table, out)?;
        if table.is_disabled() || carriers.is_empty() {
            out.fill(0.0);
            return Ok(());
        }

        out.par_iter_mut().enumerate().for_each(|(site, phi)| {
            *phi = carriers
                .iter()
                .map(|c| f64::from(c.charge) * table.energy_at(lattice.displacement(c.site, site)))
                .sum();
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::ErrorKind;
    use lattice::BoundaryPolicy;

    use super::*;

    #[test]
    fn test_opposite_charges_cancel() {
        let lattice = Lattice::new(6, 6, 1, BoundaryPolicy::Open).unwrap();
        let table = InteractionTable::coulomb(&lattice, 1.0, 10);
        let carriers = [PointCharge { site: 14, charge: 1 }, PointCharge { site: 14, charge: -1 }];
        let mut out = vec![1.0; lattice.volume()];
        CpuBackend.recompute(&lattice, &table, &carriers, &mut out).unwrap();

        assert!(out.iter().all(|phi| phi.abs() < 1e-15));
    }

    #[test]
    fn test_single_charge_profile() {
        let lattice = Lattice::new(5, 1, 1, BoundaryPolicy::Open).unwrap();
        let table = InteractionTable::coulomb(&lattice, 2.0, 3);
        let mut out = vec![0.0; 5];
        CpuBackend
            .recompute(&lattice, &table, &[PointCharge { site: 0, charge: -1 }], &mut out)
            .unwrap();

        assert_eq!(out, vec![0.0, -2.0, -1.0, -2.0 / 3.0, 0.0]);
    }

    #[test]
    fn test_wrong_output_length() {
        let lattice = Lattice::new(3, 3, 1, BoundaryPolicy::Open).unwrap();
        let table = InteractionTable::disabled(&lattice);
        let mut out = vec![0.0; 4];

        assert_eq!(
            CpuBackend.recompute(&lattice, &table, &[], &mut out).unwrap_err().kind(),
            ErrorKind::Consistency
        );
    }
}
