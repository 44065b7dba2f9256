//! Error types used by channels, strategies and the hub.
//!
//! A single enum, [`TramError`], covers everything the engine can report:
//!
//! - subscriber and replier failures (returned errors **and** caught panics);
//! - peer query timeouts;
//! - payload (de)serialization problems;
//! - runtime plumbing (no Tokio runtime, closed scheduler or conduit).
//!
//! Like the rest of the crate it provides `as_label` / `as_message` helpers for
//! logs and metrics.

use std::time::Duration;
use thiserror::Error;

/// Boxed error used as the `source` of callback failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the event tram.
///
/// None of these is fatal to a channel: after any of them the subscriber and
/// replier tables are still valid and the channel keeps working.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TramError {
    /// A subscriber returned an error or panicked while handling an event.
    #[error("subscriber '{subscriber}' failed on '{channel}/{event}': {source}")]
    Subscriber {
        /// Channel the event was published on.
        channel: String,
        /// Event name.
        event: String,
        /// Subscriber name (see [`Subscriber::name`](crate::Subscriber::name)).
        subscriber: String,
        /// `true` when the failure was a caught panic.
        panicked: bool,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// A replier returned an error or panicked while answering a query.
    #[error("replier for '{query}' failed: {source}")]
    Replier {
        /// Query name.
        query: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// No peer answered a query in time.
    #[error("query '{query}' timed out after {timeout:?}")]
    QueryTimeout {
        /// Query name.
        query: String,
        /// Configured timeout of the strategy.
        timeout: Duration,
    },

    /// A payload, parameter list or envelope could not be (de)serialized.
    #[error("codec error for '{name}': {source}")]
    Codec {
        /// Event or query name the value belongs to.
        name: String,
        /// The serde_json error.
        #[source]
        source: serde_json::Error,
    },

    /// Deferred dispatch or a peer listener was needed outside of a Tokio runtime.
    #[error("a running tokio runtime is required")]
    NoRuntime,

    /// The deferred-dispatch worker is gone (its runtime was shut down).
    #[error("dispatch scheduler is closed")]
    SchedulerClosed,

    /// The peer conduit can no longer carry messages.
    #[error("conduit for group '{group}' is closed")]
    ConduitClosed {
        /// Broadcast group identifier.
        group: String,
    },
}

impl TramError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventtram::TramError;
    /// use std::time::Duration;
    ///
    /// let err = TramError::QueryTimeout { query: "q:sum".into(), timeout: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "query_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TramError::Subscriber { panicked: true, .. } => "subscriber_panicked",
            TramError::Subscriber { .. } => "subscriber_failed",
            TramError::Replier { .. } => "replier_failed",
            TramError::QueryTimeout { .. } => "query_timeout",
            TramError::Codec { .. } => "codec_error",
            TramError::NoRuntime => "no_runtime",
            TramError::SchedulerClosed => "scheduler_closed",
            TramError::ConduitClosed { .. } => "conduit_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TramError::Subscriber {
                channel,
                event,
                subscriber,
                source,
                ..
            } => format!("subscriber={subscriber} channel={channel} event={event} error={source}"),
            TramError::Replier { query, source } => format!("query={query} error={source}"),
            TramError::QueryTimeout { query, timeout } => {
                format!("query={query} timed out after {timeout:?}")
            }
            TramError::Codec { name, source } => format!("name={name} codec: {source}"),
            TramError::NoRuntime => "no tokio runtime".to_string(),
            TramError::SchedulerClosed => "scheduler closed".to_string(),
            TramError::ConduitClosed { group } => format!("conduit closed: group={group}"),
        }
    }

    /// Indicates whether the error came out of user code (a subscriber or replier).
    pub fn is_callback_failure(&self) -> bool {
        matches!(self, TramError::Subscriber { .. } | TramError::Replier { .. })
    }

    pub(crate) fn codec(name: impl Into<String>, source: serde_json::Error) -> Self {
        TramError::Codec {
            name: name.into(),
            source,
        }
    }

    pub(crate) fn replier(query: impl Into<String>, source: impl Into<BoxError>) -> Self {
        TramError::Replier {
            query: query.into(),
            source: source.into(),
        }
    }
}
