use common::{config::SiteType, error::Result};
use lattice::{Face, SiteId};
use log::{trace, warn};
use rand::{seq::SliceRandom, Rng};
use smallvec::SmallVec;

use crate::{carrier::Species, world::World};

/// What a source creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Injection {
    /// A single carrier of one species.
    Carrier(Species),
    /// An electron and a hole on two adjacent free sites.
    Exciton,
}

/// The two flux agent variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluxKind {
    /// Injects carriers.
    Source(Injection),
    /// Extracts carriers of one species.
    Drain(Species),
}

/// A source or drain bound to a lattice face, or to the whole lattice when `face` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxAgent {
    /// Source or drain, and of what.
    kind: FluxKind,
    /// The face the agent acts on.
    face: Option<Face>,
    /// Probability per attempt; sources scale it by the contact coupling constant.
    rate: f64,
    /// Lifetime attempts.
    attempts: u64,
    /// Lifetime injections or extractions.
    successes: u64,
}

impl FluxAgent {
    /// A source of `species` on `face`.
    pub fn source(species: Species, face: Option<Face>, rate: f64) -> Self {
        Self::new(FluxKind::Source(Injection::Carrier(species)), face, rate)
    }

    /// A lattice-wide source of electron-hole pairs.
    pub fn exciton_source(rate: f64) -> Self {
        Self::new(FluxKind::Source(Injection::Exciton), None, rate)
    }

    /// A drain of `species` on `face`.
    pub fn drain(species: Species, face: Option<Face>, rate: f64) -> Self {
        Self::new(FluxKind::Drain(species), face, rate)
    }

    /// The lattice-wide unit-rate source used to place the initial population.
    pub fn seeder(species: Species) -> Self {
        Self::source(species, None, 1.0)
    }

    fn new(kind: FluxKind, face: Option<Face>, rate: f64) -> Self {
        Self {
            kind,
            face,
            rate,
            attempts: 0,
            successes: 0,
        }
    }

    pub fn kind(&self) -> FluxKind {
        self.kind
    }

    pub fn face(&self) -> Option<Face> {
        self.face
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Whether this agent injects.
    pub fn is_source(&self) -> bool {
        matches!(self.kind, FluxKind::Source(_))
    }

    /// A label such as `electron drain (right)`.
    pub fn label(&self) -> String {
        let what = match self.kind {
            FluxKind::Source(Injection::Carrier(species)) => format!("{species} source"),
            FluxKind::Source(Injection::Exciton) => "exciton source".to_string(),
            FluxKind::Drain(species) => format!("{species} drain"),
        };
        let place = self.face.map_or("lattice", Face::name);
        format!("{what} ({place})")
    }

    /// Runs the agent for one tick and returns the number of successes.
    ///
    /// # Errors
    /// See [`FluxAgent::try_seed`] and [`FluxAgent::extract`].
    pub fn run(&mut self, world: &mut World) -> Result<u64> {
        match self.kind {
            FluxKind::Source(_) => Ok(u64::from(self.try_seed(world, None)?)),
            FluxKind::Drain(_) => self.extract(world),
        }
    }

    /// Tries to inject at `site`, or at a random site of the face when `site` is `None`.
    /// The site must be valid, not a defect and free; the injection then succeeds with
    /// probability `rate * coupling(Source, type)`. A source whose species is at its maximum
    /// population does not attempt. Returns whether anything was placed. Drains never seed.
    ///
    /// # Errors
    /// [`Error::Configuration`](common::Error::Configuration) if the contact coupling is
    /// missing, [`Error::Consistency`](common::Error::Consistency) if placement collides.
    pub fn try_seed(&mut self, world: &mut World, site: Option<SiteId>) -> Result<bool> {
        let FluxKind::Source(injection) = self.kind else {
            return Ok(false);
        };
        if is_capped(world, injection) {
            return Ok(false);
        }

        self.attempts += 1;
        let site = site.unwrap_or_else(|| self.random_site(world));
        if !world.is_free(site) {
            return Ok(false);
        }
        let partner = match injection {
            Injection::Carrier(_) => None,
            Injection::Exciton => match random_free_neighbor(world, site) {
                Some(partner) => Some(partner),
                None => return Ok(false),
            },
        };
        let site_type = world.lattice().type_of(site);
        if !self.passes(world, site_type)? {
            return Ok(false);
        }

        match (injection, partner) {
            (Injection::Carrier(species), _) => {
                world.spawn(species, site)?;
            }
            (Injection::Exciton, Some(partner)) => {
                world.spawn(Species::Electron, site)?;
                world.spawn(Species::Hole, partner)?;
            }
            (Injection::Exciton, None) => return Ok(false),
        }
        trace!("{} injected at site {site}", self.label());
        self.successes += 1;

        Ok(true)
    }

    /// Places a carrier on `site` whenever the site is valid, not a defect and free, and the
    /// species is below its maximum population. No contact draw is made, so listed and
    /// restored sites land exactly where they were recorded. Exciton sources and drains
    /// never place.
    ///
    /// # Errors
    /// [`Error::Consistency`](common::Error::Consistency) if placement collides.
    pub fn place(&mut self, world: &mut World, site: SiteId) -> Result<bool> {
        let FluxKind::Source(Injection::Carrier(species)) = self.kind else {
            return Ok(false);
        };
        if is_capped(world, Injection::Carrier(species)) {
            return Ok(false);
        }
        self.attempts += 1;
        if !world.is_free(site) {
            return Ok(false);
        }
        world.spawn(species, site)?;
        self.successes += 1;

        Ok(true)
    }

    /// Gives every live carrier of the drained species on the face one chance of `rate` to
    /// leave; a unit rate empties the face. Returns the number extracted.
    ///
    /// # Errors
    /// [`Error::Consistency`](common::Error::Consistency) if the occupancy map disagrees with
    /// the carrier.
    pub fn extract(&mut self, world: &mut World) -> Result<u64> {
        let FluxKind::Drain(species) = self.kind else {
            return Ok(0);
        };
        let mut extracted = 0;
        for index in 0..world.carriers(species).len() {
            let carrier = &world.carriers(species)[index];
            let site = carrier.site();
            if carrier.is_removed() || !self.face.map_or(true, |f| world.lattice().is_on_face(site, f)) {
                continue;
            }
            self.attempts += 1;
            if self.rate >= 1.0 || world.rng.gen::<f64>() < self.rate {
                world.extract(species, index)?;
                self.successes += 1;
                extracted += 1;
            }
        }
        Ok(extracted)
    }

    /// A uniformly random site of the face, or of the lattice.
    fn random_site(&self, world: &mut World) -> SiteId {
        match self.face {
            Some(face) => {
                let size = world.lattice().face_size(face);
                let k = world.rng.gen_range(0..size);
                world.lattice().face_site(face, k)
            }
            None => {
                let volume = world.lattice().volume();
                world.rng.gen_range(0..volume)
            }
        }
    }

    /// Draws the injection with probability `rate * coupling(Source, to)`.
    fn passes(&self, world: &mut World, to: SiteType) -> Result<bool> {
        let p = self.rate * world.config().coupling.get(SiteType::Source, to)?;
        Ok(p >= 1.0 || world.rng.gen::<f64>() < p)
    }
}

/// Whether a source of `injection` is at its population cap. Excitons need room for both.
fn is_capped(world: &World, injection: Injection) -> bool {
    match injection {
        Injection::Carrier(species) => world.population(species) >= world.max_population(species),
        Injection::Exciton => Species::ALL
            .iter()
            .any(|s| world.population(*s) >= world.max_population(*s)),
    }
}

/// A random free, non-defect neighbor of `site`.
fn random_free_neighbor(world: &mut World, site: SiteId) -> Option<SiteId> {
    let free: SmallVec<[SiteId; 6]> = world
        .lattice()
        .neighbors(site)
        .into_iter()
        .filter(|n| world.is_free(*n))
        .collect();
    if free.is_empty() {
        warn!("no free neighbor next to site {site} for an exciton");
    }
    free.choose(&mut world.rng).copied()
}

#[cfg(test)]
mod tests {
    use common::config::{CouplingTable, SimulationConfig, SimulationType};

    use super::*;

    fn world_with(simulation_type: SimulationType, coupling: CouplingTable) -> World {
        let config = SimulationConfig::build()
            .grid(6, 4, 1)
            .occupancy(0.25, 0.25)
            .coulomb(false, 0)
            .simulation_type(simulation_type)
            .coupling(coupling)
            .random_seed(11)
            .finalize()
            .unwrap();
        World::new(config).unwrap()
    }

    fn world(simulation_type: SimulationType) -> World {
        world_with(simulation_type, CouplingTable::default())
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            FluxAgent::source(Species::Electron, Some(Face::Left), 0.5).label(),
            "electron source (left)"
        );
        assert_eq!(FluxAgent::exciton_source(0.5).label(), "exciton source (lattice)");
        assert_eq!(
            FluxAgent::drain(Species::Hole, Some(Face::Right), 0.5).label(),
            "hole drain (right)"
        );
    }

    #[test]
    fn test_source_injects_on_its_face() {
        let mut world = world(SimulationType::Transistor);
        let mut source = FluxAgent::source(Species::Electron, Some(Face::Left), 1.0);
        for _ in 0..50 {
            source.try_seed(&mut world, None).unwrap();
        }

        assert_eq!(world.population(Species::Electron), 4);
        assert!(world
            .carriers(Species::Electron)
            .iter()
            .all(|c| world.lattice().is_on_face(c.site(), Face::Left)));
        assert_eq!(source.successes(), 4);
    }

    #[test]
    fn test_source_respects_population_cap() {
        let mut world = world(SimulationType::Transistor);
        let mut seeder = FluxAgent::seeder(Species::Electron);
        for _ in 0..500 {
            seeder.try_seed(&mut world, None).unwrap();
        }

        assert_eq!(world.population(Species::Electron), world.max_population(Species::Electron));
    }

    #[test]
    fn test_occupied_site_is_refused() {
        let mut world = world(SimulationType::Transistor);
        let mut seeder = FluxAgent::seeder(Species::Electron);

        assert!(seeder.try_seed(&mut world, Some(3)).unwrap());
        assert!(!seeder.try_seed(&mut world, Some(3)).unwrap());
        assert!(!seeder.try_seed(&mut world, Some(999)).unwrap());
        assert_eq!(seeder.attempts(), 3);
    }

    #[test]
    fn test_exciton_places_adjacent_pair() {
        let mut world = world(SimulationType::SolarCell);
        let mut source = FluxAgent::exciton_source(1.0);

        assert!(source.try_seed(&mut world, Some(7)).unwrap());
        let electron = world.carriers(Species::Electron)[0].site();
        let hole = world.carriers(Species::Hole)[0].site();
        assert_eq!(electron, 7);
        assert!(world.lattice().neighbors(electron).contains(&hole));
    }

    #[test]
    fn test_unit_rate_drain_empties_its_face() {
        let mut world = world(SimulationType::Transistor);
        let mut seeder = FluxAgent::seeder(Species::Electron);
        for site in [0, 6, 5, 11] {
            assert!(seeder.try_seed(&mut world, Some(site)).unwrap());
        }
        let mut drain = FluxAgent::drain(Species::Electron, Some(Face::Right), 1.0);

        assert_eq!(drain.extract(&mut world).unwrap(), 2);
        assert_eq!(world.population(Species::Electron), 2);
        assert!(!world.occupancy().is_occupied(5));
        assert!(world.occupancy().is_occupied(6));
    }

    #[test]
    fn test_unit_rate_drain_ignores_contact_coupling() {
        let mut coupling = CouplingTable::default();
        coupling.set(SiteType::Normal, SiteType::Drain, 0.5);
        let mut world = world_with(SimulationType::Transistor, coupling);
        let mut seeder = FluxAgent::seeder(Species::Electron);
        for site in [5, 11, 17, 23] {
            assert!(seeder.place(&mut world, site).unwrap());
        }
        let mut drain = FluxAgent::drain(Species::Electron, Some(Face::Right), 1.0);

        assert_eq!(drain.extract(&mut world).unwrap(), 4);
        assert_eq!(world.population(Species::Electron), 0);
        assert_eq!(drain.attempts(), 4);
    }

    #[test]
    fn test_place_skips_the_contact_draw() {
        let mut coupling = CouplingTable::default();
        coupling.set(SiteType::Source, SiteType::Normal, 0.0);
        let mut world = world_with(SimulationType::Transistor, coupling);
        let mut seeder = FluxAgent::seeder(Species::Electron);

        assert!(!seeder.try_seed(&mut world, Some(4)).unwrap());
        assert!(seeder.place(&mut world, 4).unwrap());
        assert!(!seeder.place(&mut world, 4).unwrap());
        assert!(!FluxAgent::exciton_source(1.0).place(&mut world, 8).unwrap());
        assert_eq!(world.population(Species::Electron), 1);
    }
}
