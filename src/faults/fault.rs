//! # Fault records.
//!
//! A [`Fault`] describes one error that could not be returned to a caller:
//! a subscriber failing during deferred dispatch, or during synchronous
//! dispatch when `throw_immediately` is off.
//!
//! ## Ordering guarantees
//! Each fault carries a globally unique, monotonically increasing `seq`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::TramError;

/// Global sequence counter for fault ordering.
static FAULT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Subscriber returned an error.
    ///
    /// Sets `channel`, `event`, `subscriber`.
    SubscriberFailed,

    /// Subscriber panicked; the panic was caught.
    ///
    /// Sets `channel`, `event`, `subscriber`.
    SubscriberPanicked,

    /// Any other error that had no caller to return to.
    Internal,
}

/// An uncaught error with its dispatch coordinates.
#[derive(Clone, Debug)]
pub struct Fault {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp of the failure.
    pub at: SystemTime,
    /// Fault classification.
    pub kind: FaultKind,
    /// Channel the failing dispatch ran on.
    pub channel: Option<Arc<str>>,
    /// Event being dispatched.
    pub event: Option<Arc<str>>,
    /// Name of the failing subscriber.
    pub subscriber: Option<Arc<str>>,
    /// The error itself.
    pub error: Arc<TramError>,
}

impl Fault {
    /// Builds a fault from an error, copying the dispatch coordinates it carries.
    pub fn from_error(error: TramError) -> Self {
        let (kind, channel, event, subscriber) = match &error {
            TramError::Subscriber {
                channel,
                event,
                subscriber,
                panicked,
                ..
            } => {
                let kind = if *panicked {
                    FaultKind::SubscriberPanicked
                } else {
                    FaultKind::SubscriberFailed
                };
                (
                    kind,
                    Some(Arc::from(channel.as_str())),
                    Some(Arc::from(event.as_str())),
                    Some(Arc::from(subscriber.as_str())),
                )
            }
            _ => (FaultKind::Internal, None, None, None),
        };

        Self {
            seq: FAULT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel,
            event,
            subscriber,
            error: Arc::new(error),
        }
    }

    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self.kind, FaultKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_errors_carry_coordinates() {
        let fault = Fault::from_error(TramError::Subscriber {
            channel: "a-channel".into(),
            event: "scope:action".into(),
            subscriber: "audit".into(),
            panicked: true,
            source: "kaput".into(),
        });

        assert!(fault.is_panic());
        assert_eq!(fault.channel.as_deref(), Some("a-channel"));
        assert_eq!(fault.event.as_deref(), Some("scope:action"));
        assert_eq!(fault.subscriber.as_deref(), Some("audit"));
    }

    #[test]
    fn sequence_increases() {
        let a = Fault::from_error(TramError::NoRuntime);
        let b = Fault::from_error(TramError::NoRuntime);
        assert!(b.seq > a.seq);
        assert_eq!(a.kind, FaultKind::Internal);
    }
}
