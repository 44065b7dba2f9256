//! # Subscribers and handler identity.
//!
//! [`Subscriber`] is the extension point for reacting to events. Closures of
//! shape `Fn(&Value) -> anyhow::Result<()>` implement it automatically; types
//! can implement it to get a stable [`name`](Subscriber::name) in logs and
//! faults.
//!
//! Registering a subscriber yields a [`Handler`]: a cheap, cloneable reference
//! with a unique [`HandlerId`]. Identity is what `off` matches on, so the same
//! handler registered twice is delivered twice and removed together.
//!
//! ## Example
//! ```
//! use eventtram::{RawChannel, Subscriber, TramConfig};
//! use serde_json::{Value, json};
//!
//! struct Audit;
//!
//! impl Subscriber for Audit {
//!     fn on_event(&self, payload: &Value) -> anyhow::Result<()> {
//!         let _ = payload;
//!         Ok(())
//!     }
//!     fn name(&self) -> &str { "audit" }
//! }
//!
//! let channel = RawChannel::new("users", TramConfig::default());
//! let audit = channel.on_subscriber("user:saved", Audit);
//! assert_eq!(audit.name(), "audit");
//! channel.publish_sync("user:saved", json!({ "id": 1 })).unwrap();
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde_json::Value;

use crate::error::TramError;

static HANDLER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        Self(HANDLER_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value (for logs).
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Contract for event subscribers.
///
/// Called on the publisher's stack for `publish_sync` and on the dispatch
/// worker for `publish`. Errors and panics are isolated per subscriber.
pub trait Subscriber: Send + Sync + 'static {
    /// Handle one publication.
    fn on_event(&self, payload: &Value) -> anyhow::Result<()>;

    /// Human-readable name (for logs/faults).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Subscriber for F
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_event(&self, payload: &Value) -> anyhow::Result<()> {
        self(payload)
    }
}

/// A registered subscriber with its identity.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    subscriber: Arc<dyn Subscriber>,
}

impl Handler {
    /// Wraps a subscriber under a fresh identity.
    pub fn new<S: Subscriber>(subscriber: S) -> Self {
        Self::from_arc(Arc::new(subscriber))
    }

    /// Wraps a shared subscriber under a fresh identity.
    pub fn from_arc(subscriber: Arc<dyn Subscriber>) -> Self {
        Self::with_id(HandlerId::next(), subscriber)
    }

    pub(crate) fn with_id(id: HandlerId, subscriber: Arc<dyn Subscriber>) -> Self {
        Self { id, subscriber }
    }

    #[inline]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.subscriber.name()
    }

    pub(crate) fn subscriber(&self) -> &dyn Subscriber {
        self.subscriber.as_ref()
    }

    /// Runs the subscriber, turning returned errors and panics into [`TramError::Subscriber`].
    pub(crate) fn invoke(&self, channel: &str, event: &str, payload: &Value) -> Result<(), TramError> {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.subscriber.on_event(payload)));

        let (panicked, source) = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => (false, err.into()),
            Err(panic) => (true, panic_message(panic.as_ref()).into()),
        };

        Err(TramError::Subscriber {
            channel: channel.to_owned(),
            event: event.to_owned(),
            subscriber: self.name().to_owned(),
            panicked,
            source,
        })
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handler {}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named;

    impl Subscriber for Named {
        fn on_event(&self, _payload: &Value) -> anyhow::Result<()> {
            anyhow::bail!("named subscriber refuses")
        }
        fn name(&self) -> &str {
            "named"
        }
    }

    #[test]
    fn handlers_get_distinct_ids() {
        let a = Handler::new(|_: &Value| -> anyhow::Result<()> { Ok(()) });
        let b = Handler::new(|_: &Value| -> anyhow::Result<()> { Ok(()) });
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn returned_errors_keep_coordinates() {
        let handler = Handler::new(Named);
        let err = handler.invoke("users", "user:saved", &json!(null)).unwrap_err();
        match err {
            TramError::Subscriber {
                channel,
                event,
                subscriber,
                panicked,
                source,
            } => {
                assert_eq!(channel, "users");
                assert_eq!(event, "user:saved");
                assert_eq!(subscriber, "named");
                assert!(!panicked);
                assert_eq!(source.to_string(), "named subscriber refuses");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn panics_are_caught() {
        let handler = Handler::new(|_: &Value| -> anyhow::Result<()> { panic!("kaboom") });
        let err = handler.invoke("c", "e", &json!(1)).unwrap_err();
        assert_eq!(err.as_label(), "subscriber_panicked");
        assert!(err.to_string().contains("kaboom"));
    }
}
