use common::{
    config::{BoundaryPolicy, SimulationConfig, SiteType},
    error::{Error, Result},
    vector::Vector,
};
use smallvec::SmallVec;

/// The stable id of a lattice site, `x + width * (y + height * z)`.
pub type SiteId = usize;

/// The integer position `(x, y, z)` of a site.
pub type Coordinate = Vector<usize, 3>;

/// The integer offset between two sites.
pub type Displacement = Vector<isize, 3>;

/// The neighbors of a site; at most six on a cubic lattice.
pub type Neighbors = SmallVec<[SiteId; 6]>;

/// One of the six outer faces of the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// `x = 0`
    Left,
    /// `x = width - 1`
    Right,
    /// `y = 0`
    Bottom,
    /// `y = height - 1`
    Top,
    /// `z = 0`
    Front,
    /// `z = depth - 1`
    Back,
}

impl Face {
    /// The axis normal to the face.
    pub const fn axis(self) -> usize {
        match self {
            Face::Left | Face::Right => 0,
            Face::Bottom | Face::Top => 1,
            Face::Front | Face::Back => 2,
        }
    }

    /// Whether the face sits at the upper end of its axis.
    pub const fn is_upper(self) -> bool {
        matches!(self, Face::Right | Face::Top | Face::Back)
    }

    /// The lowercase name used in logs and reports.
    pub const fn name(self) -> &'static str {
        match self {
            Face::Left => "left",
            Face::Right => "right",
            Face::Bottom => "bottom",
            Face::Top => "top",
            Face::Front => "front",
            Face::Back => "back",
        }
    }
}

/// Given a site id and the lattice extents, compute the coordinate.
pub fn deindex(site: SiteId, dims: Vector<usize, 3>) -> Coordinate {
    Vector::new([
        site % dims[0],
        (site / dims[0]) % dims[1],
        site / (dims[0] * dims[1]),
    ])
}

/// Given a coordinate and the lattice extents, compute the site id.
pub fn index(coordinate: Coordinate, dims: Vector<usize, 3>) -> SiteId {
    coordinate[0] + dims[0] * (coordinate[1] + dims[1] * coordinate[2])
}

/// A `width x height x depth` cubic lattice with a site-type map.
///
/// Site ids are stable for the lifetime of the lattice. Defect and trap sets are disjoint and
/// bounded by the configured maxima.
#[derive(Debug, Clone)]
pub struct Lattice {
    /// Extents along x, y, z.
    dims: Vector<usize, 3>,
    /// Open or periodic faces.
    boundary: BoundaryPolicy,
    /// The type of every site.
    site_types: Vec<SiteType>,
    /// Trap energy of every site, zero off traps.
    trap_energies: Vec<f64>,
    /// Defect sites in registration order.
    defects: Vec<SiteId>,
    /// Trap sites in registration order.
    traps: Vec<SiteId>,
    /// Maximum number of defects.
    max_defects: usize,
    /// Maximum number of traps.
    max_traps: usize,
}

impl Lattice {
    /// Creates a lattice of normal sites.
    ///
    /// # Errors
    /// [`Error::Configuration`] if any extent is zero.
    pub fn new(width: usize, height: usize, depth: usize, boundary: BoundaryPolicy) -> Result<Self> {
        let dims = Vector::new([width, height, depth]);
        let volume = dims.product();
        if volume == 0 {
            return Err(Error::configuration(
                "Lattice::new",
                format!("lattice extents must be positive, got {width}x{height}x{depth}"),
            ));
        }
        Ok(Self {
            dims,
            boundary,
            site_types: vec![SiteType::Normal; volume],
            trap_energies: vec![0.0; volume],
            defects: Vec::new(),
            traps: Vec::new(),
            max_defects: volume,
            max_traps: volume,
        })
    }

    /// Creates the lattice described by `config`, with its defect and trap maxima.
    ///
    /// # Errors
    /// See [`Lattice::new`].
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        Ok(
            Self::new(config.grid_x, config.grid_y, config.grid_z, config.boundary)?
                .with_limits(config.max_defects(), config.max_traps()),
        )
    }

    /// Bounds the number of defects and traps that may be registered.
    pub fn with_limits(mut self, max_defects: usize, max_traps: usize) -> Self {
        self.max_defects = max_defects;
        self.max_traps = max_traps;

        self
    }

    /// Extents along x, y, z.
    pub fn dims(&self) -> Vector<usize, 3> {
        self.dims
    }

    /// Extent along x.
    pub fn width(&self) -> usize {
        self.dims[0]
    }

    /// Extent along y.
    pub fn height(&self) -> usize {
        self.dims[1]
    }

    /// Extent along z.
    pub fn depth(&self) -> usize {
        self.dims[2]
    }

    /// The number of sites.
    pub fn volume(&self) -> usize {
        self.site_types.len()
    }

    /// The boundary policy fixed at construction.
    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Whether `site` is a valid id.
    pub fn contains(&self, site: SiteId) -> bool {
        site < self.volume()
    }

    /// The id of the site at `coordinate`, if it lies inside the lattice.
    pub fn site_id(&self, coordinate: Coordinate) -> Option<SiteId> {
        (0..3)
            .all(|axis| coordinate[axis] < self.dims[axis])
            .then(|| index(coordinate, self.dims))
    }

    /// The coordinate of `site`.
    pub fn coordinate(&self, site: SiteId) -> Coordinate {
        debug_assert!(self.contains(site), "site {site} is outside the lattice");
        deindex(site, self.dims)
    }

    /// The 6-connected neighbors of `site`, ordered `-x, +x, -y, +y, -z, +z`. Open faces drop
    /// neighbors outside the lattice; periodic faces wrap and never list a site twice or list
    /// the site itself.
    pub fn neighbors(&self, site: SiteId) -> Neighbors {
        let origin = self.coordinate(site);
        let mut out = Neighbors::new();
        for axis in 0..3 {
            let n = self.dims[axis];
            for step in [-1isize, 1] {
                let c = origin[axis] as isize + step;
                let c = match self.boundary {
                    BoundaryPolicy::Open if c < 0 || c >= n as isize => continue,
                    BoundaryPolicy::Open => c as usize,
                    BoundaryPolicy::Periodic => c.rem_euclid(n as isize) as usize,
                };
                let mut coordinate = origin;
                coordinate[axis] = c;
                let neighbor = index(coordinate, self.dims);
                if neighbor != site && !out.contains(&neighbor) {
                    out.push(neighbor);
                }
            }
        }
        out
    }

    /// The displacement from `from` to `to`. Periodic lattices use the minimum image.
    pub fn displacement(&self, from: SiteId, to: SiteId) -> Displacement {
        let a = self.coordinate(from);
        let b = self.coordinate(to);
        Vector::from_idx(|axis| {
            let d = b[axis] as isize - a[axis] as isize;
            match self.boundary {
                BoundaryPolicy::Open => d,
                BoundaryPolicy::Periodic => {
                    let n = self.dims[axis] as isize;
                    let d = d.rem_euclid(n);
                    if d > n / 2 {
                        d - n
                    } else {
                        d
                    }
                }
            }
        })
    }

    /// The largest absolute displacement possible along each axis.
    pub fn max_displacement(&self) -> Vector<usize, 3> {
        self.dims.map(|n| match self.boundary {
            BoundaryPolicy::Open => n - 1,
            BoundaryPolicy::Periodic => n / 2,
        })
    }

    /// The type of `site`.
    pub fn type_of(&self, site: SiteId) -> SiteType {
        self.site_types[site]
    }

    /// Whether `site` is a defect.
    pub fn is_defect(&self, site: SiteId) -> bool {
        self.site_types[site] == SiteType::Defect
    }

    /// The trap energy of `site`, zero off traps.
    pub fn trap_energy(&self, site: SiteId) -> f64 {
        self.trap_energies[site]
    }

    /// Defect sites in registration order.
    pub fn defects(&self) -> &[SiteId] {
        &self.defects
    }

    /// Trap sites in registration order.
    pub fn traps(&self) -> &[SiteId] {
        &self.traps
    }

    /// The maximum number of defects.
    pub fn max_defects(&self) -> usize {
        self.max_defects
    }

    /// The maximum number of traps.
    pub fn max_traps(&self) -> usize {
        self.max_traps
    }

    /// The distinct site types present on the lattice.
    pub fn present_types(&self) -> Vec<SiteType> {
        let mut present = vec![SiteType::Normal];
        if !self.defects.is_empty() {
            present.push(SiteType::Defect);
        }
        if !self.traps.is_empty() {
            present.push(SiteType::Trap);
        }
        if self.defects.len() + self.traps.len() == self.volume() {
            present.retain(|t| *t != SiteType::Normal);
        }
        present
    }

    /// Marks `site` as a defect.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the site is invalid or already special;
    /// [`Error::Configuration`] if the defect maximum is reached.
    pub fn register_defect(&mut self, site: SiteId) -> Result<()> {
        self.check_registrable("register_defect", site)?;
        if self.defects.len() >= self.max_defects {
            return Err(Error::configuration(
                "register_defect",
                format!("can not add defect at site {site}; maximum of {} reached", self.max_defects),
            ));
        }
        self.site_types[site] = SiteType::Defect;
        self.defects.push(site);
        Ok(())
    }

    /// Marks `site` as a trap carrying `energy`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the site is invalid or already special;
    /// [`Error::Configuration`] if the trap maximum is reached.
    pub fn register_trap(&mut self, site: SiteId, energy: f64) -> Result<()> {
        self.check_registrable("register_trap", site)?;
        if self.traps.len() >= self.max_traps {
            return Err(Error::configuration(
                "register_trap",
                format!("can not add trap at site {site}; maximum of {} reached", self.max_traps),
            ));
        }
        self.site_types[site] = SiteType::Trap;
        self.trap_energies[site] = energy;
        self.traps.push(site);
        Ok(())
    }

    /// Checks that `site` exists and is still a normal site.
    fn check_registrable(&self, operation: &'static str, site: SiteId) -> Result<()> {
        if !self.contains(site) {
            return Err(Error::consistency(
                operation,
                format!("site {site} is outside a lattice of {} sites", self.volume()),
            ));
        }
        match self.site_types[site] {
            SiteType::Normal => Ok(()),
            existing => Err(Error::consistency(
                operation,
                format!("site {site} is already registered as a {existing}"),
            )),
        }
    }

    /// The number of sites on `face`.
    pub fn face_size(&self, face: Face) -> usize {
        self.volume() / self.dims[face.axis()]
    }

    /// The `k`-th site of `face`, for `k < face_size(face)`.
    pub fn face_site(&self, face: Face, k: usize) -> SiteId {
        let axis = face.axis();
        let (a, b) = ((axis + 1) % 3, (axis + 2) % 3);
        let mut coordinate = Coordinate::zero();
        coordinate[axis] = if face.is_upper() { self.dims[axis] - 1 } else { 0 };
        coordinate[a] = k % self.dims[a];
        coordinate[b] = k / self.dims[a];
        index(coordinate, self.dims)
    }

    /// Whether `site` lies on `face`.
    pub fn is_on_face(&self, site: SiteId, face: Face) -> bool {
        let axis = face.axis();
        let c = self.coordinate(site)[axis];
        if face.is_upper() {
            c == self.dims[axis] - 1
        } else {
            c == 0
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ErrorKind;

    use super::*;

    fn open(w: usize, h: usize, d: usize) -> Lattice {
        Lattice::new(w, h, d, BoundaryPolicy::Open).unwrap()
    }

    #[test]
    fn test_index_bijection() {
        let lattice = open(4, 3, 5);
        for site in 0..lattice.volume() {
            let c = lattice.coordinate(site);
            assert_eq!(lattice.site_id(c), Some(site));
        }
        assert_eq!(lattice.site_id(Vector::new([4, 0, 0])), None);
        assert_eq!(lattice.coordinate(1), Vector::new([1, 0, 0]));
        assert_eq!(lattice.coordinate(4), Vector::new([0, 1, 0]));
    }

    #[test]
    fn test_open_neighbors() {
        let lattice = open(3, 3, 3);

        assert_eq!(lattice.neighbors(0).as_slice(), &[1, 3, 9]);
        assert_eq!(lattice.neighbors(13).len(), 6);
    }

    #[test]
    fn test_periodic_neighbors_wrap_and_dedupe() {
        let lattice = Lattice::new(4, 2, 1, BoundaryPolicy::Periodic).unwrap();

        // -x wraps to 3, +x is 1, -y and +y are both 4, z has extent one.
        assert_eq!(lattice.neighbors(0).as_slice(), &[3, 1, 4]);
    }

    #[test]
    fn test_displacement_minimum_image() {
        let open = open(10, 1, 1);
        let periodic = Lattice::new(10, 1, 1, BoundaryPolicy::Periodic).unwrap();

        assert_eq!(open.displacement(0, 9), Vector::new([9, 0, 0]));
        assert_eq!(periodic.displacement(0, 9), Vector::new([-1, 0, 0]));
        assert_eq!(periodic.displacement(9, 0), Vector::new([1, 0, 0]));
    }

    #[test]
    fn test_special_sites_are_disjoint() {
        let mut lattice = open(4, 4, 1);
        lattice.register_defect(5).unwrap();
        lattice.register_trap(6, -0.2).unwrap();

        assert_eq!(lattice.type_of(5), SiteType::Defect);
        assert_eq!(lattice.type_of(6), SiteType::Trap);
        assert_eq!(lattice.trap_energy(6), -0.2);
        assert_eq!(lattice.register_trap(5, -0.2).unwrap_err().kind(), ErrorKind::Consistency);
        assert_eq!(lattice.register_defect(6).unwrap_err().kind(), ErrorKind::Consistency);
        assert_eq!(lattice.register_defect(5).unwrap_err().kind(), ErrorKind::Consistency);
        assert_eq!(lattice.register_defect(99).unwrap_err().kind(), ErrorKind::Consistency);
    }

    #[test]
    fn test_defect_maximum() {
        let mut lattice = open(4, 4, 1).with_limits(1, 0);
        lattice.register_defect(0).unwrap();

        assert_eq!(lattice.register_defect(1).unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(lattice.register_trap(2, 0.1).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_faces() {
        let lattice = open(5, 3, 2);

        assert_eq!(lattice.face_size(Face::Left), 6);
        let right: Vec<_> = (0..lattice.face_size(Face::Right))
            .map(|k| lattice.face_site(Face::Right, k))
            .collect();
        assert!(right.iter().all(|&s| lattice.coordinate(s)[0] == 4));
        assert!(right.iter().all(|&s| lattice.is_on_face(s, Face::Right)));
        assert_eq!(lattice.face_site(Face::Left, 0), 0);
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        assert_eq!(
            Lattice::new(0, 4, 4, BoundaryPolicy::Open).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }
}
