use common::error::{Error, Result};
use lattice::SiteId;

use crate::carrier::{CarrierId, Species};

/// Who sits on an occupied site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occupant {
    /// Species of the carrier.
    pub species: Species,
    /// Stable id of the carrier.
    pub id: CarrierId,
}

/// The single site-occupancy map shared by electrons and holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    /// One slot per lattice site.
    sites: Vec<Option<Occupant>>,
    /// Number of occupied slots.
    count: usize,
}

impl Occupancy {
    /// An empty map over `volume` sites.
    pub fn new(volume: usize) -> Self {
        Self {
            sites: vec![None; volume],
            count: 0,
        }
    }

    /// The occupant of `site`, if any.
    pub fn get(&self, site: SiteId) -> Option<Occupant> {
        self.sites.get(site).copied().flatten()
    }

    /// Whether a carrier sits on `site`.
    pub fn is_occupied(&self, site: SiteId) -> bool {
        self.get(site).is_some()
    }

    /// The number of occupied sites.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Places `occupant` on `site`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the site is invalid or taken.
    pub fn occupy(&mut self, site: SiteId, occupant: Occupant) -> Result<()> {
        match self.sites.get_mut(site) {
            Some(slot @ None) => {
                *slot = Some(occupant);
                self.count += 1;
                Ok(())
            }
            Some(Some(other)) => Err(Error::consistency(
                "Occupancy::occupy",
                format!(
                    "{} {} can not occupy site {site}; {} {} is already there",
                    occupant.species, occupant.id, other.species, other.id
                ),
            )),
            None => Err(Error::consistency(
                "Occupancy::occupy",
                format!("site {site} is outside the lattice"),
            )),
        }
    }

    /// Clears `site`, which must hold `occupant`.
    ///
    /// # Errors
    /// [`Error::Consistency`] if the site holds anything else.
    pub fn vacate(&mut self, site: SiteId, occupant: Occupant) -> Result<()> {
        match self.sites.get_mut(site) {
            Some(slot) if *slot == Some(occupant) => {
                *slot = None;
                self.count -= 1;
                Ok(())
            }
            slot => Err(Error::consistency(
                "Occupancy::vacate",
                format!(
                    "{} {} is not on site {site} (found {:?})",
                    occupant.species,
                    occupant.id,
                    slot.map(|s| *s)
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ErrorKind;

    use super::*;

    #[test]
    fn test_occupy_and_vacate() {
        let mut occupancy = Occupancy::new(4);
        let electron = Occupant {
            species: Species::Electron,
            id: 0,
        };
        let hole = Occupant {
            species: Species::Hole,
            id: 1,
        };
        occupancy.occupy(2, electron).unwrap();

        assert_eq!(occupancy.get(2), Some(electron));
        assert_eq!(occupancy.count(), 1);
        assert_eq!(occupancy.occupy(2, hole).unwrap_err().kind(), ErrorKind::Consistency);
        assert_eq!(occupancy.vacate(2, hole).unwrap_err().kind(), ErrorKind::Consistency);
        occupancy.vacate(2, electron).unwrap();
        assert!(!occupancy.is_occupied(2));
        assert_eq!(occupancy.occupy(9, hole).unwrap_err().kind(), ErrorKind::Consistency);
    }
}
