use common::{
    config::{SimulationConfig, SimulationType, SiteType},
    error::{Error, Result},
    messages::PointCharge,
};
use lattice::{Face, InteractionTable, Lattice, SiteId};
use log::{debug, info};
use potential::{Backend, PotentialComputeBackend, PotentialField};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use crate::{
    carrier::{Carrier, CarrierId, Species},
    checkpoint::CheckpointRecord,
    flux::FluxAgent,
    occupancy::{Occupancy, Occupant},
};

/// Draws a non-zero seed from the operating system.
fn entropy_seed() -> u64 {
    loop {
        let seed = rand::random::<u64>();
        if seed != 0 {
            return seed;
        }
    }
}

/// The flux agents of each device type; sources come first.
fn flux_agents(config: &SimulationConfig) -> Vec<FluxAgent> {
    let (source, drain) = (config.source_rate, config.drain_rate);
    match config.simulation_type {
        SimulationType::Transistor => vec![
            FluxAgent::source(Species::Electron, Some(Face::Left), source),
            FluxAgent::drain(Species::Electron, Some(Face::Right), drain),
        ],
        SimulationType::SolarCell => vec![
            FluxAgent::exciton_source(source),
            FluxAgent::drain(Species::Electron, Some(Face::Left), drain),
            FluxAgent::drain(Species::Hole, Some(Face::Left), drain),
            FluxAgent::drain(Species::Electron, Some(Face::Right), drain),
            FluxAgent::drain(Species::Hole, Some(Face::Right), drain),
        ],
    }
}

/// Marks `site` as a defect, or as a trap of `energy`.
fn register(lattice: &mut Lattice, site_type: SiteType, site: SiteId, energy: f64) -> Result<()> {
    match site_type {
        SiteType::Defect => lattice.register_defect(site),
        _ => lattice.register_trap(site, energy),
    }
}

/// Registers the listed defects or traps, then fills randomly up to the lattice maximum.
fn place_special_sites<R: Rng>(
    lattice: &mut Lattice,
    site_type: SiteType,
    listed: &[SiteId],
    energy: f64,
    fill: bool,
    rng: &mut R,
) -> Result<()> {
    let placed = |lattice: &Lattice| match site_type {
        SiteType::Defect => lattice.defects().len(),
        _ => lattice.traps().len(),
    };
    let maximum = match site_type {
        SiteType::Defect => lattice.max_defects(),
        _ => lattice.max_traps(),
    };

    if listed.len() > maximum {
        return Err(Error::configuration(
            "World::place_special_sites",
            format!("can not place {} {site_type} sites; the maximum is {maximum}", listed.len()),
        ));
    }
    for &site in listed {
        register(lattice, site_type, site, energy)?;
    }
    if !fill {
        return Ok(());
    }

    let budget = 10 * lattice.volume();
    let mut tries = 0;
    while placed(&*lattice) < maximum {
        tries += 1;
        if tries > budget {
            return Err(Error::configuration(
                "World::place_special_sites",
                format!("can not seed {site_type} sites; exceeded max tries ({budget})"),
            ));
        }
        let site = rng.gen_range(0..lattice.volume());
        if lattice.type_of(site) == SiteType::Normal {
            register(lattice, site_type, site, energy)?;
        }
    }
    Ok(())
}

/// Checks that every coupling constant a hop or an injection can ask for exists.
fn check_couplings(config: &SimulationConfig, lattice: &Lattice) -> Result<()> {
    let reachable: SmallVec<[SiteType; 2]> = lattice
        .present_types()
        .into_iter()
        .filter(|t| *t != SiteType::Defect)
        .collect();
    for &from in &reachable {
        for &to in &reachable {
            config.coupling.get(from, to)?;
        }
        config.coupling.get(SiteType::Source, from)?;
    }
    Ok(())
}

/// Owns every piece of simulation state and is the only place it is mutated.
///
/// Electrons and holes share one lattice and one occupancy map; each species reads its own
/// [`PotentialField`].
pub struct World {
    /// The run parameters, with the seed actually used.
    pub(crate) config: SimulationConfig,
    pub(crate) lattice: Lattice,
    pub(crate) table: InteractionTable,
    /// One field per species, indexed by [`Species::index`].
    pub(crate) fields: [PotentialField; 2],
    pub(crate) backend: Backend,
    /// Carriers per species, indexed by [`Species::index`]. Removed carriers stay until purged.
    pub(crate) carriers: [Vec<Carrier>; 2],
    pub(crate) occupancy: Occupancy,
    /// Sources then drains.
    pub(crate) flux: Vec<FluxAgent>,
    /// The shared random source for every serial draw.
    pub(crate) rng: ChaCha8Rng,
    /// The next carrier id.
    next_id: CarrierId,
    /// Completed ticks.
    pub(crate) tick: u64,
    /// Scratch buffer for backend output.
    phi: Vec<f64>,
}

impl World {
    /// Builds a world from `config`: random defects and traps up to their maxima, and carriers
    /// up to their target occupancy when `seed_charges` is set.
    ///
    /// # Errors
    /// [`Error::Configuration`] for invalid parameters, missing coupling constants or an
    /// unreachable occupancy; [`Error::Backend`] if the requested backend is unavailable.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_placements(config, &CheckpointRecord::default())
    }

    /// Like [`World::new`], but places the listed sites first.
    ///
    /// # Errors
    /// As [`World::new`]; a listed site that is invalid, taken, or over the maximum is an
    /// [`Error::Configuration`] or [`Error::Consistency`].
    pub fn with_placements(config: SimulationConfig, placements: &CheckpointRecord) -> Result<Self> {
        Self::assemble(config, placements, true)
    }

    /// Rebuilds a world holding exactly the sites of `record`, without random filling.
    ///
    /// # Errors
    /// [`Error::BoundaryFormat`] if a site id lies outside the configured lattice; otherwise
    /// as [`World::with_placements`].
    pub fn from_checkpoint(config: SimulationConfig, record: &CheckpointRecord) -> Result<Self> {
        let volume = config.volume();
        let lists = [&record.electrons, &record.holes, &record.defects, &record.traps];
        if let Some(site) = lists.iter().flat_map(|l| l.iter()).find(|s| **s >= volume) {
            return Err(Error::boundary_format(format!(
                "site id {site} is outside a lattice of {volume} sites"
            )));
        }
        Self::assemble(config, record, false)
    }

    fn assemble(mut config: SimulationConfig, placements: &CheckpointRecord, fill: bool) -> Result<Self> {
        config.validate()?;
        if config.random_seed == 0 {
            config.random_seed = entropy_seed();
        }
        info!("random seed {}", config.random_seed);
        let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);

        let mut lattice = Lattice::from_config(&config)?;
        place_special_sites(&mut lattice, SiteType::Defect, &placements.defects, 0.0, fill, &mut rng)?;
        place_special_sites(
            &mut lattice,
            SiteType::Trap,
            &placements.traps,
            config.trap_potential,
            fill,
            &mut rng,
        )?;
        check_couplings(&config, &lattice)?;

        let table = InteractionTable::from_config(&lattice, &config);
        table.check_geometry(&lattice)?;
        let field = |species: Species| -> Result<PotentialField> {
            let mut field = PotentialField::new(lattice.volume(), species.charge());
            field.apply_linear_bias(&lattice, config.voltage_source, config.voltage_drain)?;
            field.apply_trap_energies(&lattice)?;
            Ok(field)
        };
        let fields = [field(Species::Electron)?, field(Species::Hole)?];
        let backend = Backend::from_config(&config)?;

        let volume = lattice.volume();
        let mut world = Self {
            flux: flux_agents(&config),
            config,
            lattice,
            table,
            fields,
            backend,
            carriers: [Vec::new(), Vec::new()],
            occupancy: Occupancy::new(volume),
            rng,
            next_id: 0,
            tick: 0,
            phi: vec![0.0; volume],
        };
        let seed_charges = fill && world.config.seed_charges;
        world.place_carriers(Species::Electron, &placements.electrons, seed_charges)?;
        world.place_carriers(Species::Hole, &placements.holes, seed_charges)?;
        world.recompute()?;

        info!(
            "built {}x{}x{} world: {} electrons, {} holes, {} defects, {} traps",
            world.lattice.width(),
            world.lattice.height(),
            world.lattice.depth(),
            world.num_electrons(),
            world.num_holes(),
            world.num_defects(),
            world.num_traps()
        );
        Ok(world)
    }

    /// Places the listed carriers exactly, then fills up to the target population through a
    /// unit-rate source within `10 * volume` tries.
    fn place_carriers(&mut self, species: Species, listed: &[SiteId], fill: bool) -> Result<()> {
        let mut seeder = FluxAgent::seeder(species);
        for &site in listed {
            if !seeder.place(self, site)? {
                return Err(Error::configuration(
                    "World::place_carriers",
                    format!("can not inject {species} at site {site}"),
                ));
            }
        }
        if !fill {
            return Ok(());
        }

        let budget = 10 * self.lattice.volume();
        let mut tries = 0;
        while self.population(species) < self.max_population(species) {
            tries += 1;
            if tries > budget {
                return Err(Error::configuration(
                    "World::place_carriers",
                    format!("can not seed {species}s; exceeded max tries ({budget})"),
                ));
            }
            seeder.try_seed(self, None)?;
        }
        debug!("seeded {} {species}s in {tries} tries", self.population(species));
        Ok(())
    }

    /// The run parameters, with the seed actually used.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The seed the random source was started from.
    pub fn random_seed(&self) -> u64 {
        self.config.random_seed
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn interaction_table(&self) -> &InteractionTable {
        &self.table
    }

    /// The field read by `species`.
    pub fn field(&self, species: Species) -> &PotentialField {
        &self.fields[species.index()]
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// The carriers of `species`, including ones flagged removed this tick.
    pub fn carriers(&self, species: Species) -> &[Carrier] {
        &self.carriers[species.index()]
    }

    /// Sources then drains.
    pub fn flux_agents(&self) -> &[FluxAgent] {
        &self.flux
    }

    /// Completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Whether a carrier may be placed on `site`.
    pub fn is_free(&self, site: SiteId) -> bool {
        self.lattice.contains(site) && !self.lattice.is_defect(site) && !self.occupancy.is_occupied(site)
    }

    /// Live carriers of `species`.
    pub fn population(&self, species: Species) -> usize {
        self.carriers(species).iter().filter(|c| !c.is_removed()).count()
    }

    /// The target population of `species`.
    pub fn max_population(&self, species: Species) -> usize {
        match species {
            Species::Electron => self.config.max_electrons(),
            Species::Hole => self.config.max_holes(),
        }
    }

    pub fn num_electrons(&self) -> usize {
        self.population(Species::Electron)
    }

    pub fn num_holes(&self) -> usize {
        self.population(Species::Hole)
    }

    pub fn num_carriers(&self) -> usize {
        self.num_electrons() + self.num_holes()
    }

    /// Carriers plus defects, which count as fixed charges.
    pub fn num_charges(&self) -> usize {
        self.num_carriers() + self.num_defects()
    }

    pub fn num_defects(&self) -> usize {
        self.lattice.defects().len()
    }

    pub fn num_traps(&self) -> usize {
        self.lattice.traps().len()
    }

    pub fn max_electrons(&self) -> usize {
        self.config.max_electrons()
    }

    pub fn max_holes(&self) -> usize {
        self.config.max_holes()
    }

    pub fn max_carriers(&self) -> usize {
        self.max_electrons() + self.max_holes()
    }

    /// The carrier maximum plus the placed defects.
    pub fn max_charges(&self) -> usize {
        self.max_carriers() + self.num_defects()
    }

    pub fn max_defects(&self) -> usize {
        self.lattice.max_defects()
    }

    pub fn max_traps(&self) -> usize {
        self.lattice.max_traps()
    }

    /// Live electrons as a percentage of their maximum.
    pub fn reached_electrons(&self) -> f64 {
        percentage(self.num_electrons(), self.max_electrons())
    }

    /// Live holes as a percentage of their maximum.
    pub fn reached_holes(&self) -> f64 {
        percentage(self.num_holes(), self.max_holes())
    }

    /// Live carriers as a percentage of their maximum.
    pub fn reached_carriers(&self) -> f64 {
        percentage(self.num_carriers(), self.max_carriers())
    }

    /// Live electrons as a percentage of the lattice volume.
    pub fn percent_electrons(&self) -> f64 {
        percentage(self.num_electrons(), self.lattice.volume())
    }

    /// Live holes as a percentage of the lattice volume.
    pub fn percent_holes(&self) -> f64 {
        percentage(self.num_holes(), self.lattice.volume())
    }

    /// The occupied sites of every category.
    pub fn checkpoint(&self) -> CheckpointRecord {
        let sites = |species: Species| {
            self.carriers(species)
                .iter()
                .filter(|c| !c.is_removed())
                .map(Carrier::site)
                .collect()
        };
        CheckpointRecord {
            electrons: sites(Species::Electron),
            holes: sites(Species::Hole),
            defects: self.lattice.defects().to_vec(),
            traps: self.lattice.traps().to_vec(),
        }
    }

    /// Creates a carrier on `site` and adds its charge to both fields.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the site is taken.
    pub(crate) fn spawn(&mut self, species: Species, site: SiteId) -> Result<CarrierId> {
        let id = self.next_id;
        let carrier = Carrier::new(id, species, site, &self.lattice);
        self.occupancy.occupy(site, carrier.occupant())?;
        self.carriers[species.index()].push(carrier);
        self.next_id += 1;
        for field in &mut self.fields {
            field.apply_point_charge(&self.lattice, &self.table, site, species.charge());
        }
        Ok(id)
    }

    /// Flags the carrier at `index` removed, frees its site and takes its charge out of both
    /// fields. The entry stays until [`World::purge`].
    ///
    /// # Errors
    /// [`Error::Consistency`] if the occupancy map disagrees with the carrier.
    pub(crate) fn extract(&mut self, species: Species, index: usize) -> Result<()> {
        let carrier = &mut self.carriers[species.index()][index];
        if carrier.is_removed() {
            return Err(Error::consistency(
                "World::extract",
                format!("{species} {} was already removed", carrier.id()),
            ));
        }
        carrier.mark_removed();
        let (site, occupant) = (carrier.site(), carrier.occupant());
        self.occupancy.vacate(site, occupant)?;
        for field in &mut self.fields {
            field.apply_point_charge(&self.lattice, &self.table, site, -species.charge());
        }
        Ok(())
    }

    /// Drops removed carriers from the collections.
    pub(crate) fn purge(&mut self) {
        for carriers in &mut self.carriers {
            carriers.retain(|c| !c.is_removed());
        }
    }

    /// Recomputes the dynamic part of both fields from the live carriers.
    ///
    /// # Errors
    /// Whatever the backend reports.
    pub fn recompute(&mut self) -> Result<()> {
        let charges: Vec<PointCharge> = self
            .carriers
            .iter()
            .flatten()
            .filter(|c| !c.is_removed())
            .map(|c| PointCharge {
                site: c.site(),
                charge: c.species().charge(),
            })
            .collect();
        self.backend
            .recompute(&self.lattice, &self.table, &charges, &mut self.phi)?;
        for field in &mut self.fields {
            field.set_dynamic(&self.phi)?;
        }
        Ok(())
    }

    /// Gives every live electron next to a hole one chance of `recombination_rate` to
    /// annihilate with a random adjacent hole. Returns the number of pairs removed.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the occupancy map disagrees with the carriers.
    pub(crate) fn recombine(&mut self) -> Result<u64> {
        let rate = self.config.recombination_rate;
        if rate <= 0.0 {
            return Ok(0);
        }
        let mut recombined = 0;
        for index in 0..self.carriers[Species::Electron.index()].len() {
            let electron = &self.carriers[Species::Electron.index()][index];
            if electron.is_removed() {
                continue;
            }
            let partners: SmallVec<[Occupant; 6]> = self
                .lattice
                .neighbors(electron.site())
                .into_iter()
                .filter_map(|n| self.occupancy.get(n))
                .filter(|o| o.species == Species::Hole)
                .collect();
            let Some(partner) = partners.choose(&mut self.rng).copied() else {
                continue;
            };
            if rate < 1.0 && self.rng.gen::<f64>() >= rate {
                continue;
            }
            let hole = self.carriers[Species::Hole.index()]
                .iter()
                .position(|c| c.id() == partner.id)
                .ok_or_else(|| {
                    Error::consistency(
                        "World::recombine",
                        format!("hole {} is on the lattice but not in the world", partner.id),
                    )
                })?;
            self.extract(Species::Electron, index)?;
            self.extract(Species::Hole, hole)?;
            recombined += 1;
        }
        Ok(recombined)
    }

    /// Verifies that every live carrier owns its site in the occupancy map and nothing else
    /// is there.
    ///
    /// # Errors
    /// [`Error::Consistency`] naming the first offending carrier.
    pub fn check_occupancy(&self) -> Result<()> {
        for carrier in self.carriers.iter().flatten().filter(|c| !c.is_removed()) {
            if self.occupancy.get(carrier.site()) != Some(carrier.occupant()) {
                return Err(Error::consistency(
                    "World::check_occupancy",
                    format!(
                        "{} {} at site {} but the site holds {:?}",
                        carrier.species(),
                        carrier.id(),
                        carrier.site(),
                        self.occupancy.get(carrier.site())
                    ),
                ));
            }
        }
        if self.occupancy.count() != self.num_carriers() {
            return Err(Error::consistency(
                "World::check_occupancy",
                format!(
                    "{} occupied sites for {} live carriers",
                    self.occupancy.count(),
                    self.num_carriers()
                ),
            ));
        }
        Ok(())
    }
}

/// `part / whole` in percent, zero when `whole` is zero.
fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}
