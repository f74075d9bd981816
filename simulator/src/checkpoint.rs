//! The persisted record of which sites hold electrons, holes, defects and traps.
//!
//! Each category is written in the order electrons, holes, defects, traps as a big-endian
//! `i64` count followed by that many big-endian `i64` site ids. Reading is strict: a short
//! stream, a negative value or trailing bytes are all [`Error::BoundaryFormat`].

use std::io::{ErrorKind as IoErrorKind, Read, Write};

use common::error::{Error, Result};
use lattice::SiteId;

/// Occupied site ids per category, in the order they were stored.
///
/// Also used to hand explicit placements to [`World`](crate::world::World).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Sites holding an electron.
    pub electrons: Vec<SiteId>,
    /// Sites holding a hole.
    pub holes: Vec<SiteId>,
    /// Defect sites.
    pub defects: Vec<SiteId>,
    /// Trap sites.
    pub traps: Vec<SiteId>,
}

/// Category names used in read errors, in stream order.
const CATEGORIES: [(&str, &str); 4] = [
    ("electrons", "electron"),
    ("holes", "hole"),
    ("defects", "defect"),
    ("traps", "trap"),
];

impl CheckpointRecord {
    /// The four lists in stream order.
    fn lists(&self) -> [&Vec<SiteId>; 4] {
        [&self.electrons, &self.holes, &self.defects, &self.traps]
    }

    /// Writes the record to `writer`.
    ///
    /// # Errors
    /// [`Error::Io`] if the writer fails, [`Error::BoundaryFormat`] if a value does not fit the
    /// signed 64 bit format.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for list in self.lists() {
            write_i64(writer, list.len())?;
            for &site in list {
                write_i64(writer, site)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a record from `reader`, which must contain exactly one record.
    ///
    /// # Errors
    /// [`Error::BoundaryFormat`] if the stream is truncated, holds a negative count or id, or
    /// has trailing bytes; [`Error::Io`] for other read failures.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut lists: [Vec<SiteId>; 4] = Default::default();
        for (list, (plural, singular)) in lists.iter_mut().zip(CATEGORIES) {
            let count = read_i64(reader, || format!("expected number of {plural}"))?;
            *list = (0..count)
                .map(|i| read_i64(reader, || format!("expected {singular} {i} site id")))
                .collect::<Result<_>>()?;
        }

        let mut rest = [0u8; 1];
        if reader.read(&mut rest)? != 0 {
            return Err(Error::boundary_format("unexpected trailing data after traps"));
        }

        let [electrons, holes, defects, traps] = lists;
        Ok(Self {
            electrons,
            holes,
            defects,
            traps,
        })
    }

    /// Encodes the record into a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 * (4 + self.lists().iter().map(|l| l.len()).sum::<usize>()));
        for list in self.lists() {
            bytes.extend_from_slice(&(list.len() as i64).to_be_bytes());
            for &site in list {
                bytes.extend_from_slice(&(site as i64).to_be_bytes());
            }
        }
        bytes
    }
}

/// Writes one value as a big-endian `i64`.
fn write_i64<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let value = i64::try_from(value)
        .map_err(|_| Error::boundary_format(format!("value {value} does not fit a signed 64 bit integer")))?;
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Reads one non-negative big-endian `i64`; `context` names what was expected.
fn read_i64<R: Read>(reader: &mut R, context: impl Fn() -> String) -> Result<usize> {
    let mut buffer = [0u8; 8];
    match reader.read_exact(&mut buffer) {
        Ok(()) => {}
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => {
            return Err(Error::boundary_format(format!("read past end; {}", context())));
        }
        Err(e) => return Err(e.into()),
    }
    let value = i64::from_be_bytes(buffer);
    usize::try_from(value)
        .map_err(|_| Error::boundary_format(format!("corrupt value {value}; {}", context())))
}
