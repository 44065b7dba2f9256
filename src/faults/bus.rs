//! # Fault bus.
//!
//! One [`FaultBus`] per hub collects the subscriber failures that had no
//! caller to return to. Every failing step on the hub or any of its
//! sub-channels lands here after being logged.
//!
//! ```text
//! dispatch step fails ──► tracing::error! ──► FaultBus::report ──► watchers
//!                                                │
//!                                                └─ nobody watching: trace! and drop
//! ```
//!
//! Watchers that fall more than `fault_capacity` faults behind see
//! `RecvError::Lagged(n)`; a fault reported before a watcher subscribed is
//! never replayed to it.

use tokio::sync::broadcast;
use tracing::trace;

use super::fault::Fault;

/// Hub-wide sink for [`Fault`]s.
///
/// Clones share the same ring buffer.
#[derive(Clone, Debug)]
pub struct FaultBus {
    tx: broadcast::Sender<Fault>,
}

impl FaultBus {
    /// Creates a bus keeping the last `capacity` faults (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Hands `fault` to every current watcher.
    ///
    /// Returns `false` when nobody was watching; the fault is then only in the log.
    pub fn report(&self, fault: Fault) -> bool {
        let seq = fault.seq;
        match self.tx.send(fault) {
            Ok(_) => true,
            Err(_) => {
                trace!(seq, "fault reported with no watchers");
                false
            }
        }
    }

    /// Starts watching; only faults reported from now on are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Fault> {
        self.tx.subscribe()
    }

    /// Number of live watchers.
    pub fn watchers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TramError;
    use crate::faults::FaultKind;

    #[test]
    fn unwatched_faults_are_dropped() {
        let bus = FaultBus::new(0);
        assert_eq!(bus.watchers(), 0);
        assert!(!bus.report(Fault::from_error(TramError::NoRuntime)));
    }

    #[test]
    fn watchers_receive_reported_faults() {
        let bus = FaultBus::new(4);
        let mut rx = bus.subscribe();
        assert_eq!(bus.watchers(), 1);
        assert!(bus.report(Fault::from_error(TramError::SchedulerClosed)));

        let fault = rx.try_recv().expect("fault delivered");
        assert_eq!(fault.kind, FaultKind::Internal);
        assert_eq!(fault.error.as_label(), "scheduler_closed");
    }

    #[test]
    fn late_watchers_miss_earlier_faults() {
        let bus = FaultBus::new(4);
        let _early = bus.subscribe();
        bus.report(Fault::from_error(TramError::NoRuntime));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }
}
