use futures::channel::mpsc::UnboundedSender;

use crate::{
    error::{Error, Result},
    messages::TickReport,
};

/// The interface for anything that wants to watch a simulation. Observers are invoked by the
/// tick orchestrator after every committed tick and never see partial state.
// ANCHOR: TickObserver
pub trait TickObserver {
    /// Receives the report of a completed tick.
    ///
    /// # Errors
    /// An observer that can no longer accept reports returns [`Error::Observer`]; the
    /// orchestrator propagates it to its caller.
    fn on_tick(&mut self, report: &TickReport) -> Result<()>;
}
// ANCHOR_END: TickObserver

impl<F: FnMut(&TickReport)> TickObserver for F {
    fn on_tick(&mut self, report: &TickReport) -> Result<()> {
        self(report);
        Ok(())
    }
}

/// Forwards reports over an event channel, e.g. to an async consumer printing progress.
impl TickObserver for UnboundedSender<TickReport> {
    fn on_tick(&mut self, report: &TickReport) -> Result<()> {
        self.unbounded_send(report.clone())
            .map_err(|e| Error::Observer(format!("report channel closed at tick {}: {e}", report.tick)))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn report(tick: u64) -> TickReport {
        TickReport {
            tick,
            attempted: 4,
            accepted: 3,
            rejected: 1,
            electrons: 4,
            holes: 0,
            injected: 0,
            extracted: 0,
            recombined: 0,
            flux: Vec::new(),
        }
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        let mut observer = |r: &TickReport| seen.push(r.tick);
        observer.on_tick(&report(1)).unwrap();
        observer.on_tick(&report(2)).unwrap();

        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_channel_observer() {
        let (mut tx, rx) = futures::channel::mpsc::unbounded();
        tx.on_tick(&report(7)).unwrap();
        drop(tx);

        let received: Vec<_> = futures::executor::block_on(rx.collect());
        assert_eq!(received, vec![report(7)]);
    }

    #[test]
    fn test_closed_channel_is_an_error() {
        let (mut tx, rx) = futures::channel::mpsc::unbounded();
        drop(rx);

        assert!(tx.on_tick(&report(1)).is_err());
    }
}
