use std::{collections::HashMap, fmt, str::FromStr};

use itertools::Itertools;
use log::debug;

use crate::error::{Error, Result};

/// Elementary charge in coulombs.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
/// Boltzmann constant in J/K.
pub const BOLTZMANN: f64 = 1.380_649e-23;
/// Vacuum permittivity in F/m.
pub const VACUUM_PERMITTIVITY: f64 = 8.854_187_812_8e-12;

/// How the lattice treats its outer faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryPolicy {
    /// Sites on a face have fewer neighbors.
    Open,
    /// Every axis wraps around; displacements follow the minimum image convention.
    Periodic,
}

/// Which device is being simulated. Decides the flux agents and their faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationType {
    /// Electron source on the left face, electron drain on the right face.
    Transistor,
    /// Exciton source over the whole lattice, electron and hole drains on both x faces.
    SolarCell,
}

/// Where the dynamic potential is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Data-parallel CPU reduction.
    Cpu,
    /// GPU compute shader reduction.
    Gpu,
}

/// The type of a lattice site, or of a contact reservoir when a carrier enters or leaves the
/// lattice. Only hops and source injections look up coupling constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteType {
    /// An ordinary transport site.
    Normal,
    /// A site no carrier may occupy.
    Defect,
    /// A site carrying an additional trap energy.
    Trap,
    /// The reservoir a source injects from.
    Source,
    /// The reservoir a drain extracts into.
    Drain,
}

impl SiteType {
    /// All site types, in declaration order.
    pub const ALL: [SiteType; 5] = [
        SiteType::Normal,
        SiteType::Defect,
        SiteType::Trap,
        SiteType::Source,
        SiteType::Drain,
    ];

    /// The lowercase name used in parameter files.
    pub const fn name(self) -> &'static str {
        match self {
            SiteType::Normal => "normal",
            SiteType::Defect => "defect",
            SiteType::Trap => "trap",
            SiteType::Source => "source",
            SiteType::Drain => "drain",
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SiteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SiteType::ALL
            .into_iter()
            .find(|i| i.name() == s)
            .ok_or_else(|| Error::configuration("SiteType::from_str", format!("unknown site type `{s}`")))
    }
}

/// Hop prefactors keyed by `(from, to)` site types.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingTable {
    /// The defined prefactors.
    entries: HashMap<(SiteType, SiteType), f64>,
}

impl Default for CouplingTable {
    /// Unit coupling between normal and trap sites and from the source contact.
    fn default() -> Self {
        let mut table = Self::empty();
        for (from, to) in [
            (SiteType::Normal, SiteType::Normal),
            (SiteType::Normal, SiteType::Trap),
            (SiteType::Trap, SiteType::Normal),
            (SiteType::Trap, SiteType::Trap),
            (SiteType::Source, SiteType::Normal),
            (SiteType::Source, SiteType::Trap),
        ] {
            table.set(from, to, 1.0);
        }
        table
    }
}

impl CouplingTable {
    /// A table with no pairs defined.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Defines the prefactor for hops from `from` to `to`.
    pub fn set(&mut self, from: SiteType, to: SiteType, value: f64) {
        self.entries.insert((from, to), value);
    }

    /// The prefactor for hops from `from` to `to`.
    ///
    /// # Errors
    /// [`Error::Configuration`] if the pair was never defined.
    pub fn get(&self, from: SiteType, to: SiteType) -> Result<f64> {
        self.entries.get(&(from, to)).copied().ok_or_else(|| {
            Error::configuration(
                "coupling_constant",
                format!("no coupling constant defined for {from} -> {to}"),
            )
        })
    }

    /// Undefines a pair, returning its prefactor.
    pub fn remove(&mut self, from: SiteType, to: SiteType) -> Option<f64> {
        self.entries.remove(&(from, to))
    }

    /// Whether the pair is defined.
    pub fn contains(&self, from: SiteType, to: SiteType) -> bool {
        self.entries.contains_key(&(from, to))
    }
}

/// The complete set of parameters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Lattice extent along x.
    pub grid_x: usize,
    /// Lattice extent along y.
    pub grid_y: usize,
    /// Lattice extent along z.
    pub grid_z: usize,
    /// Open or periodic faces.
    pub boundary: BoundaryPolicy,
    /// Target electron occupancy as a fraction of the volume.
    pub electron_percentage: f64,
    /// Target hole occupancy as a fraction of the volume.
    pub hole_percentage: f64,
    /// Defect fraction of the volume.
    pub defect_percentage: f64,
    /// Trap fraction of the volume.
    pub trap_percentage: f64,
    /// Energy offset (eV) added at every trap site.
    pub trap_potential: f64,
    /// Whether to randomly seed carriers up to the target occupancy at start.
    pub seed_charges: bool,
    /// Random seed; `0` draws one from entropy.
    pub random_seed: u64,
    /// Per-tick injection probability of each source.
    pub source_rate: f64,
    /// Per-carrier, per-tick extraction probability of each drain.
    pub drain_rate: f64,
    /// Electrostatic potential (V) at the source (left) face.
    pub voltage_source: f64,
    /// Electrostatic potential (V) at the drain (right) face.
    pub voltage_drain: f64,
    /// Whether carriers interact through the Coulomb potential.
    pub coulomb_interaction: bool,
    /// Interaction cutoff radius in lattice units.
    pub coulomb_cutoff: usize,
    /// Relative dielectric constant of the medium.
    pub dielectric_constant: f64,
    /// Temperature in kelvin.
    pub temperature_kelvin: f64,
    /// Lattice spacing in meters.
    pub lattice_spacing: f64,
    /// Probability per tick that an electron and a neighboring hole recombine.
    pub recombination_rate: f64,
    /// Which potential compute backend to use.
    pub backend: BackendKind,
    /// Which device is simulated.
    pub simulation_type: SimulationType,
    /// Hop prefactors keyed by site type pairs.
    pub coupling: CouplingTable,
    /// Number of ticks to run.
    pub iterations_real: usize,
    /// Ticks between progress summaries.
    pub iterations_print: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_x: 64,
            grid_y: 64,
            grid_z: 1,
            boundary: BoundaryPolicy::Open,
            electron_percentage: 0.01,
            hole_percentage: 0.0,
            defect_percentage: 0.0,
            trap_percentage: 0.0,
            trap_potential: -0.1,
            seed_charges: false,
            random_seed: 0,
            source_rate: 0.9,
            drain_rate: 0.9,
            voltage_source: 0.0,
            voltage_drain: 1.0,
            coulomb_interaction: true,
            coulomb_cutoff: 50,
            dielectric_constant: 3.5,
            temperature_kelvin: 300.0,
            lattice_spacing: 1e-9,
            recombination_rate: 0.0,
            backend: BackendKind::Cpu,
            simulation_type: SimulationType::Transistor,
            coupling: CouplingTable::default(),
            iterations_real: 1000,
            iterations_print: 100,
        }
    }
}

impl SimulationConfig {
    /// Starts a [`SimulationConfigBuilder`] from the defaults.
    pub fn build() -> SimulationConfigBuilder {
        SimulationConfigBuilder {
            config: Self::default(),
        }
    }

    /// The number of lattice sites.
    pub fn volume(&self) -> usize {
        self.grid_x * self.grid_y * self.grid_z
    }

    /// The thermal energy `k_B T` in eV.
    pub fn kt(&self) -> f64 {
        BOLTZMANN * self.temperature_kelvin / ELEMENTARY_CHARGE
    }

    /// The Coulomb energy (eV) of two unit charges one lattice spacing apart.
    pub fn coulomb_prefactor(&self) -> f64 {
        ELEMENTARY_CHARGE
            / (4.0 * std::f64::consts::PI * VACUUM_PERMITTIVITY * self.dielectric_constant * self.lattice_spacing)
    }

    /// The maximum number of electrons.
    pub fn max_electrons(&self) -> usize {
        fraction_of(self.electron_percentage, self.volume())
    }

    /// The maximum number of holes.
    pub fn max_holes(&self) -> usize {
        fraction_of(self.hole_percentage, self.volume())
    }

    /// The maximum number of defects.
    pub fn max_defects(&self) -> usize {
        fraction_of(self.defect_percentage, self.volume())
    }

    /// The maximum number of traps.
    pub fn max_traps(&self) -> usize {
        fraction_of(self.trap_percentage, self.volume())
    }

    /// Checks the ranges of every parameter.
    ///
    /// # Errors
    /// [`Error::Configuration`] naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::configuration("SimulationConfig::validate", message));

        if self.volume() == 0 {
            return fail(format!(
                "grid dimensions must be positive, got {}x{}x{}",
                self.grid_x, self.grid_y, self.grid_z
            ));
        }
        for (name, value) in [
            ("electron.percentage", self.electron_percentage),
            ("hole.percentage", self.hole_percentage),
            ("defect.percentage", self.defect_percentage),
            ("trap.percentage", self.trap_percentage),
            ("source.rate", self.source_rate),
            ("drain.rate", self.drain_rate),
            ("recombination.rate", self.recombination_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must lie in [0, 1], got {value}"));
            }
        }
        let occupied = self.electron_percentage + self.hole_percentage + self.defect_percentage;
        if occupied > 1.0 {
            return fail(format!(
                "electron, hole, and defect percentages sum to {occupied}, which exceeds 1"
            ));
        }
        if self.trap_percentage + self.defect_percentage > 1.0 {
            return fail("trap and defect percentages exceed the lattice volume".to_string());
        }
        if self.temperature_kelvin <= 0.0 {
            return fail(format!("temperature.kelvin must be positive, got {}", self.temperature_kelvin));
        }
        if self.dielectric_constant <= 0.0 || self.lattice_spacing <= 0.0 {
            return fail("dielectric.constant and lattice.spacing must be positive".to_string());
        }
        if self.iterations_print == 0 {
            return fail("iterations.print must be positive".to_string());
        }
        Ok(())
    }

    /// Parses a parameter file of `key = value` lines on top of the defaults. Blank lines and
    /// `#` comments are ignored.
    ///
    /// # Errors
    /// [`Error::Configuration`] for unknown keys, malformed values, or out-of-range results.
    pub fn from_key_values(text: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut parsed = 0;
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split('=').map(str::trim).collect_tuple() else {
                return Err(Error::configuration(
                    "SimulationConfig::from_key_values",
                    format!("line {}: expected `key = value`, got `{line}`", line_no + 1),
                ));
            };
            config.set(key, value).map_err(|e| match e {
                Error::Configuration { operation, message } => Error::Configuration {
                    operation,
                    message: format!("line {}: {message}", line_no + 1),
                },
                other => other,
            })?;
            parsed += 1;
        }
        config.validate()?;
        debug!("parsed {parsed} parameters");
        Ok(config)
    }

    /// Sets a single parameter from its textual key and value.
    ///
    /// # Errors
    /// [`Error::Configuration`] for unknown keys or malformed values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "grid.x" => self.grid_x = parse_value(&key, value)?,
            "grid.y" => self.grid_y = parse_value(&key, value)?,
            "grid.z" => self.grid_z = parse_value(&key, value)?,
            "grid.boundary" => {
                self.boundary = match value {
                    "open" => BoundaryPolicy::Open,
                    "periodic" => BoundaryPolicy::Periodic,
                    _ => return Err(invalid_value(&key, value)),
                }
            }
            "electron.percentage" => self.electron_percentage = parse_value(&key, value)?,
            "hole.percentage" => self.hole_percentage = parse_value(&key, value)?,
            "defect.percentage" => self.defect_percentage = parse_value(&key, value)?,
            "trap.percentage" => self.trap_percentage = parse_value(&key, value)?,
            "trap.potential" => self.trap_potential = parse_value(&key, value)?,
            "seed.charges" => self.seed_charges = parse_value(&key, value)?,
            "random.seed" => self.random_seed = parse_value(&key, value)?,
            "source.rate" => self.source_rate = parse_value(&key, value)?,
            "drain.rate" => self.drain_rate = parse_value(&key, value)?,
            "voltage.source" => self.voltage_source = parse_value(&key, value)?,
            "voltage.drain" => self.voltage_drain = parse_value(&key, value)?,
            "coulomb.interaction" => self.coulomb_interaction = parse_value(&key, value)?,
            "coulomb.cutoff" => self.coulomb_cutoff = parse_value(&key, value)?,
            "dielectric.constant" => self.dielectric_constant = parse_value(&key, value)?,
            "temperature.kelvin" => self.temperature_kelvin = parse_value(&key, value)?,
            "lattice.spacing" => self.lattice_spacing = parse_value(&key, value)?,
            "recombination.rate" => self.recombination_rate = parse_value(&key, value)?,
            "use.gpu" => {
                self.backend = if parse_value::<bool>(&key, value)? {
                    BackendKind::Gpu
                } else {
                    BackendKind::Cpu
                }
            }
            "simulation.type" => {
                self.simulation_type = match value {
                    "transistor" => SimulationType::Transistor,
                    "solarcell" => SimulationType::SolarCell,
                    _ => {
                        return Err(Error::configuration(
                            "SimulationConfig::set",
                            format!("simulation.type({value}) must be transistor or solarcell"),
                        ))
                    }
                }
            }
            "iterations.real" => self.iterations_real = parse_value(&key, value)?,
            "iterations.print" => self.iterations_print = parse_value(&key, value)?,
            coupling if coupling.starts_with("coupling.") => {
                let Some((from, to)) = coupling["coupling.".len()..].split('.').collect_tuple() else {
                    return Err(Error::configuration(
                        "SimulationConfig::set",
                        format!("coupling key `{coupling}` must look like coupling.<from>.<to>"),
                    ));
                };
                let value = parse_value(&key, value)?;
                self.coupling.set(from.parse()?, to.parse()?, value);
            }
            _ => {
                return Err(Error::configuration(
                    "SimulationConfig::set",
                    format!("unknown parameter `{key}`"),
                ))
            }
        }
        Ok(())
    }
}

/// Builds a [`SimulationConfig`] one parameter at a time.
#[derive(Debug, Clone)]
pub struct SimulationConfigBuilder {
    /// The configuration under construction.
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    /// Sets the lattice extents.
    pub fn grid(mut self, x: usize, y: usize, z: usize) -> Self {
        self.config.grid_x = x;
        self.config.grid_y = y;
        self.config.grid_z = z;

        self
    }

    /// Sets the boundary policy.
    pub fn boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.config.boundary = boundary;

        self
    }

    /// Sets the target electron and hole occupancy fractions.
    pub fn occupancy(mut self, electrons: f64, holes: f64) -> Self {
        self.config.electron_percentage = electrons;
        self.config.hole_percentage = holes;

        self
    }

    /// Sets the defect and trap fractions and the trap energy.
    pub fn disorder(mut self, defects: f64, traps: f64, trap_potential: f64) -> Self {
        self.config.defect_percentage = defects;
        self.config.trap_percentage = traps;
        self.config.trap_potential = trap_potential;

        self
    }

    /// Enables or disables random carrier seeding.
    pub fn seed_charges(mut self, seed_charges: bool) -> Self {
        self.config.seed_charges = seed_charges;

        self
    }

    /// Sets the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;

        self
    }

    /// Sets the source and drain rates.
    pub fn rates(mut self, source: f64, drain: f64) -> Self {
        self.config.source_rate = source;
        self.config.drain_rate = drain;

        self
    }

    /// Sets the potentials at the source and drain faces.
    pub fn voltages(mut self, source: f64, drain: f64) -> Self {
        self.config.voltage_source = source;
        self.config.voltage_drain = drain;

        self
    }

    /// Enables or disables the Coulomb interaction.
    pub fn coulomb(mut self, enabled: bool, cutoff: usize) -> Self {
        self.config.coulomb_interaction = enabled;
        self.config.coulomb_cutoff = cutoff;

        self
    }

    /// Sets the temperature in kelvin.
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.config.temperature_kelvin = kelvin;

        self
    }

    /// Sets the recombination rate.
    pub fn recombination(mut self, rate: f64) -> Self {
        self.config.recombination_rate = rate;

        self
    }

    /// Selects the potential compute backend.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;

        self
    }

    /// Selects the simulated device.
    pub fn simulation_type(mut self, simulation_type: SimulationType) -> Self {
        self.config.simulation_type = simulation_type;

        self
    }

    /// Replaces the coupling table.
    pub fn coupling(mut self, coupling: CouplingTable) -> Self {
        self.config.coupling = coupling;

        self
    }

    /// Sets the number of ticks and the reporting interval.
    pub fn iterations(mut self, real: usize, print: usize) -> Self {
        self.config.iterations_real = real;
        self.config.iterations_print = print;

        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    /// See [`SimulationConfig::validate`].
    pub fn finalize(self) -> Result<SimulationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// `floor(fraction * volume)`, matching integer truncation of the target populations.
fn fraction_of(fraction: f64, volume: usize) -> usize {
    (fraction * volume as f64).floor() as usize
}

/// The error for a value that does not parse for `key`.
fn invalid_value(key: &str, value: &str) -> Error {
    Error::configuration(
        "SimulationConfig::set",
        format!("invalid value `{value}` for `{key}`"),
    )
}

/// Parses `value` for `key`, accepting `on/off` and `yes/no` for booleans.
fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    let normalized = match value.to_ascii_lowercase().as_str() {
        "on" | "yes" => "true".to_string(),
        "off" | "no" => "false".to_string(),
        other => other.to_string(),
    };
    normalized.parse().map_err(|_| invalid_value(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_parameter_file() {
        let text = "
            # transistor run
            grid.x = 10
            grid.y = 4
            grid.z = 1
            electron.percentage = 0.5
            seed.charges = on
            simulation.type = solarcell
            coupling.normal.trap = 0.25
            use.gpu = false
        ";
        let config = SimulationConfig::from_key_values(text).unwrap();

        assert_eq!(config.volume(), 40);
        assert_eq!(config.max_electrons(), 20);
        assert!(config.seed_charges);
        assert_eq!(config.simulation_type, SimulationType::SolarCell);
        assert_eq!(config.coupling.get(SiteType::Normal, SiteType::Trap).unwrap(), 0.25);
        assert_eq!(config.backend, BackendKind::Cpu);
    }

    #[test]
    fn test_unknown_key_names_line() {
        let err = SimulationConfig::from_key_values("grid.x = 4\nwarp.drive = 9\n").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_invalid_simulation_type() {
        let err = SimulationConfig::from_key_values("simulation.type = battery").unwrap_err();

        assert!(err.to_string().contains("transistor or solarcell"), "{err}");
    }

    #[test]
    fn test_overfull_lattice_is_rejected() {
        let err = SimulationConfig::build().occupancy(0.7, 0.5).finalize().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_coupling_pair() {
        let table = CouplingTable::empty();

        assert_eq!(
            table.get(SiteType::Normal, SiteType::Normal).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_thermal_energy_at_room_temperature() {
        let config = SimulationConfig::build().temperature(300.0).finalize().unwrap();

        assert!((config.kt() - 0.025852).abs() < 1e-5, "kT = {}", config.kt());
    }
}
