/// A carrier as seen by the potential backends: where it sits and its charge sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct PointCharge {
    /// The occupied site id.
    pub site: usize,
    /// `+1` for holes, `-1` for electrons.
    pub charge: i8,
}

/// Counters of one flux agent over a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxReport {
    /// Human-readable agent label, e.g. `electron source (left)`.
    pub label: String,
    /// Injection or extraction attempts this tick.
    pub attempts: u64,
    /// Successful injections or extractions this tick.
    pub successes: u64,
}

/// A summary of one committed tick, handed to every
/// [`TickObserver`](crate::interfaces::TickObserver).
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The tick counter after this tick completed.
    pub tick: u64,
    /// Transport attempts made this tick.
    pub attempted: u64,
    /// Hops accepted this tick.
    pub accepted: u64,
    /// Hops rejected this tick.
    pub rejected: u64,
    /// Live electrons after the tick.
    pub electrons: usize,
    /// Live holes after the tick.
    pub holes: usize,
    /// Carriers injected by sources this tick.
    pub injected: u64,
    /// Carriers extracted by drains this tick.
    pub extracted: u64,
    /// Electron-hole pairs recombined this tick.
    pub recombined: u64,
    /// Per-agent counters, sources before drains.
    pub flux: Vec<FluxReport>,
}

impl TickReport {
    /// The fraction of attempts that were accepted, or zero when nothing was attempted.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.attempted > 0 {
            self.accepted as f64 / self.attempted as f64
        } else {
            0.0
        }
    }
}
