#![cfg(feature = "gpu")]

use common::messages::PointCharge;
use lattice::{BoundaryPolicy, InteractionTable, Lattice};
use log::warn;
use potential::{CpuBackend, GpuBackend, PotentialComputeBackend};

fn carriers(volume: usize) -> Vec<PointCharge> {
    (0..volume)
        .step_by(7)
        .enumerate()
        .map(|(i, site)| PointCharge {
            site,
            charge: if i % 3 == 0 { 1 } else { -1 },
        })
        .collect()
}

#[test]
fn test_gpu_matches_cpu() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut gpu = match GpuBackend::new() {
        Ok(gpu) => gpu,
        Err(e) => {
            warn!("skipping GPU equivalence: {e}");
            return;
        }
    };

    for boundary in [BoundaryPolicy::Open, BoundaryPolicy::Periodic] {
        let lattice = Lattice::new(12, 9, 3, boundary).unwrap();
        let table = InteractionTable::coulomb(&lattice, 0.41, 6);
        let carriers = carriers(lattice.volume());

        let mut expected = vec![0.0; lattice.volume()];
        let mut actual = vec![0.0; lattice.volume()];
        CpuBackend.recompute(&lattice, &table, &carriers, &mut expected).unwrap();
        gpu.recompute(&lattice, &table, &carriers, &mut actual).unwrap();

        for (site, (e, a)) in expected.iter().zip(&actual).enumerate() {
            let tolerance = 1e-9 * e.abs().max(1.0);
            assert!((e - a).abs() <= tolerance, "site {site} ({boundary:?}): cpu {e}, gpu {a}");
        }
    }
}
