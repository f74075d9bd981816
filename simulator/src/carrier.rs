use std::fmt;

use common::{config::CouplingTable, error::Result};
use lattice::{InteractionTable, Lattice, Neighbors, SiteId};
use log::trace;
use potential::PotentialField;
use rand::{seq::SliceRandom, Rng};

use crate::occupancy::{Occupancy, Occupant};

/// The stable id of a carrier, unique across species within one world.
pub type CarrierId = u64;

/// The two mobile carrier species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Species {
    /// Negative carrier.
    Electron,
    /// Positive carrier.
    Hole,
}

impl Species {
    /// Both species, in storage order.
    pub const ALL: [Species; 2] = [Species::Electron, Species::Hole];

    /// The charge sign.
    pub const fn charge(self) -> i8 {
        match self {
            Species::Electron => -1,
            Species::Hole => 1,
        }
    }

    /// The position of this species in per-species arrays.
    pub const fn index(self) -> usize {
        match self {
            Species::Electron => 0,
            Species::Hole => 1,
        }
    }

    /// The opposite species.
    pub const fn opposite(self) -> Species {
        match self {
            Species::Electron => Species::Hole,
            Species::Hole => Species::Electron,
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Species::Electron => "electron",
            Species::Hole => "hole",
        })
    }
}

/// A pending hop computed in the propose phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    /// The neighbor the carrier wants to move to.
    pub candidate: SiteId,
    /// Energy change of the hop in eV, without self-interaction.
    pub pd: f64,
    /// Hop prefactor for the pair of site types.
    pub coupling: f64,
}

/// Per-tick transport state: `Idle -> Proposed -> {Accepted, Rejected}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportState {
    /// No proposal yet this tick, or no admissible neighbor.
    Idle,
    /// Waiting for the decide phase.
    Proposed(Proposal),
    /// Moved this tick.
    Accepted,
    /// Stayed this tick.
    Rejected,
}

/// Lifetime transport counters of one carrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Decide phases this carrier took part in.
    pub attempted: u64,
    /// Accepted hops.
    pub accepted: u64,
    /// Rejected hops.
    pub rejected: u64,
}

/// Read-only state the propose phase evaluates against.
#[derive(Clone, Copy)]
pub struct TransportContext<'a> {
    /// The lattice geometry and site types.
    pub lattice: &'a Lattice,
    /// Coulomb energies for the self-exclusion term.
    pub table: &'a InteractionTable,
    /// The field of the proposing carrier's species.
    pub field: &'a PotentialField,
    /// Hop prefactors.
    pub coupling: &'a CouplingTable,
}

/// A mobile electron or hole.
#[derive(Debug, Clone, PartialEq)]
pub struct Carrier {
    /// Stable id.
    id: CarrierId,
    /// Electron or hole.
    species: Species,
    /// The occupied site.
    site: SiteId,
    /// Admissible neighbors of `site`, defects removed.
    neighbors: Neighbors,
    /// Flagged for removal by a drain or recombination.
    removed: bool,
    /// Where this carrier is in the current tick.
    state: TransportState,
    /// Lifetime counters.
    stats: TransportStats,
}

/// The admissible hop targets of `site`.
fn admissible_neighbors(lattice: &Lattice, site: SiteId) -> Neighbors {
    let mut neighbors = lattice.neighbors(site);
    neighbors.retain(|n| !lattice.is_defect(*n));
    neighbors
}

impl Carrier {
    /// A carrier of `species` on `site`.
    pub fn new(id: CarrierId, species: Species, site: SiteId, lattice: &Lattice) -> Self {
        Self {
            id,
            species,
            site,
            neighbors: admissible_neighbors(lattice, site),
            removed: false,
            state: TransportState::Idle,
            stats: TransportStats::default(),
        }
    }

    pub fn id(&self) -> CarrierId {
        self.id
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    pub fn neighbors(&self) -> &[SiteId] {
        &self.neighbors
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// The occupancy entry of this carrier.
    pub fn occupant(&self) -> Occupant {
        Occupant {
            species: self.species,
            id: self.id,
        }
    }

    /// Flags the carrier for removal at the end of the tick.
    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    /// Picks a random admissible neighbor and evaluates the hop against the committed field.
    /// Mutates nothing but this carrier's transport state.
    ///
    /// # Errors
    /// [`Error::Configuration`](common::Error::Configuration) if no coupling constant exists
    /// for the pair of site types.
    pub fn propose<R: Rng + ?Sized>(&mut self, context: &TransportContext<'_>, rng: &mut R) -> Result<()> {
        self.state = TransportState::Idle;
        if self.removed {
            return Ok(());
        }
        let Some(&candidate) = self.neighbors.choose(rng) else {
            return Ok(());
        };

        let TransportContext {
            lattice,
            table,
            field,
            coupling,
        } = context;
        let self_interaction = table.energy_at(lattice.displacement(self.site, candidate));
        let pd = field.total_at(candidate) - field.total_at(self.site) - self_interaction;
        let coupling = coupling.get(lattice.type_of(self.site), lattice.type_of(candidate))?;

        self.state = TransportState::Proposed(Proposal { candidate, pd, coupling });
        Ok(())
    }

    /// Resolves the proposal against the live occupancy: a taken candidate is rejected,
    /// `pd <= 0` is accepted, otherwise the hop is accepted with probability
    /// `coupling * exp(-pd / kt)` drawn from `rng`. Returns whether the carrier moved.
    ///
    /// # Errors
    /// [`Error::Consistency`](common::Error::Consistency) if the occupancy map disagrees with
    /// this carrier's site.
    pub fn decide<R: Rng + ?Sized>(&mut self, occupancy: &mut Occupancy, kt: f64, rng: &mut R) -> Result<bool> {
        if self.removed {
            return Ok(false);
        }
        self.stats.attempted += 1;

        let TransportState::Proposed(proposal) = self.state else {
            return Ok(self.reject());
        };
        if occupancy.is_occupied(proposal.candidate) {
            trace!(
                "{} {} blocked at site {}",
                self.species,
                self.id,
                proposal.candidate
            );
            return Ok(self.reject());
        }
        let accepted = proposal.pd <= 0.0 || rng.gen::<f64>() < proposal.coupling * (-proposal.pd / kt).exp();
        if !accepted {
            return Ok(self.reject());
        }

        occupancy.vacate(self.site, self.occupant())?;
        occupancy.occupy(proposal.candidate, self.occupant())?;
        trace!(
            "{} {} hopped {} -> {} (pd = {:.4} eV)",
            self.species,
            self.id,
            self.site,
            proposal.candidate,
            proposal.pd
        );
        self.site = proposal.candidate;
        self.stats.accepted += 1;
        self.state = TransportState::Accepted;

        Ok(true)
    }

    /// Records a rejection.
    fn reject(&mut self) -> bool {
        self.stats.rejected += 1;
        self.state = TransportState::Rejected;
        false
    }

    /// Re-reads the admissible neighbors after the lattice changed or the carrier moved.
    pub(crate) fn refresh_neighbors(&mut self, lattice: &Lattice) {
        self.neighbors = admissible_neighbors(lattice, self.site);
    }
}

#[cfg(test)]
mod tests {
    use lattice::BoundaryPolicy;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    struct Fixture {
        lattice: Lattice,
        table: InteractionTable,
        field: PotentialField,
        coupling: CouplingTable,
    }

    impl Fixture {
        fn new(v_drain: f64) -> Self {
            let mut lattice = Lattice::new(3, 1, 1, BoundaryPolicy::Open).unwrap();
            lattice.register_trap(2, 0.0).unwrap();
            let table = InteractionTable::disabled(&lattice);
            let mut field = PotentialField::new(lattice.volume(), -1);
            field.apply_linear_bias(&lattice, 0.0, v_drain).unwrap();
            Self {
                lattice,
                table,
                field,
                coupling: CouplingTable::default(),
            }
        }

        fn context(&self) -> TransportContext<'_> {
            TransportContext {
                lattice: &self.lattice,
                table: &self.table,
                field: &self.field,
                coupling: &self.coupling,
            }
        }
    }

    #[test]
    fn test_downhill_hop_is_accepted() {
        let fixture = Fixture::new(3.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut carrier = Carrier::new(0, Species::Electron, 0, &fixture.lattice);
        let mut occupancy = Occupancy::new(3);
        occupancy.occupy(0, carrier.occupant()).unwrap();

        carrier.propose(&fixture.context(), &mut rng).unwrap();
        let TransportState::Proposed(proposal) = carrier.state() else {
            panic!("expected a proposal, got {:?}", carrier.state());
        };
        assert_eq!(proposal.candidate, 1);
        assert!((proposal.pd + 1.0).abs() < 1e-12);

        assert!(carrier.decide(&mut occupancy, 0.025, &mut rng).unwrap());
        assert_eq!(carrier.site(), 1);
        assert_eq!(occupancy.get(1), Some(carrier.occupant()));
        assert!(!occupancy.is_occupied(0));
    }

    #[test]
    fn test_occupied_candidate_is_rejected() {
        let fixture = Fixture::new(3.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut carrier = Carrier::new(0, Species::Electron, 0, &fixture.lattice);
        let blocker = Carrier::new(1, Species::Hole, 1, &fixture.lattice);
        let mut occupancy = Occupancy::new(3);
        occupancy.occupy(0, carrier.occupant()).unwrap();
        occupancy.occupy(1, blocker.occupant()).unwrap();

        carrier.propose(&fixture.context(), &mut rng).unwrap();
        assert!(!carrier.decide(&mut occupancy, 0.025, &mut rng).unwrap());
        assert_eq!(carrier.state(), TransportState::Rejected);
        assert_eq!(carrier.site(), 0);
        assert_eq!(
            carrier.stats(),
            TransportStats {
                attempted: 1,
                accepted: 0,
                rejected: 1
            }
        );
    }

    #[test]
    fn test_steep_uphill_hop_is_rejected() {
        let fixture = Fixture::new(-30.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut carrier = Carrier::new(0, Species::Electron, 0, &fixture.lattice);
        let mut occupancy = Occupancy::new(3);
        occupancy.occupy(0, carrier.occupant()).unwrap();

        for _ in 0..20 {
            carrier.propose(&fixture.context(), &mut rng).unwrap();
            assert!(!carrier.decide(&mut occupancy, 0.025, &mut rng).unwrap());
        }
        assert_eq!(carrier.stats().rejected, 20);
    }

    #[test]
    fn test_missing_coupling_is_a_configuration_error() {
        let mut fixture = Fixture::new(3.0);
        fixture.coupling = CouplingTable::empty();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut carrier = Carrier::new(0, Species::Electron, 1, &fixture.lattice);

        let error = carrier.propose(&fixture.context(), &mut rng).unwrap_err();
        assert_eq!(error.kind(), common::ErrorKind::Configuration);
        assert_eq!(carrier.state(), TransportState::Idle);
    }

    #[test]
    fn test_defects_are_not_neighbors() {
        let mut lattice = Lattice::new(3, 3, 1, BoundaryPolicy::Open).unwrap();
        lattice.register_defect(1).unwrap();
        let carrier = Carrier::new(0, Species::Hole, 4, &lattice);

        assert_eq!(carrier.neighbors(), &[3, 5, 7]);
    }
}
