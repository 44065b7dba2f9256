//! # Notify strategies.
//!
//! A notify strategy decides **where** publications and queries go. Every
//! channel owns exactly one strategy, wired up once at construction:
//!
//! ```text
//! RawChannel::new
//!   ├─► strategy.init(repliers)                 (read the replier table lazily)
//!   └─► strategy.on_notify_subscribers(hook)    (hook delivers to local subscribers)
//!
//! publish / publish_sync ──► strategy.notify_subscribers(Publication)
//! query                  ──► strategy.query(name, params)
//! ```
//!
//! Two strategies ship with the crate:
//!
//! | Strategy              | Publications                 | Queries                         |
//! |-----------------------|------------------------------|---------------------------------|
//! | [`LocalStrategy`]     | hook, same process           | local replier, `None` if absent |
//! | [`BroadcastStrategy`] | posted to peers, not to self | posted to peers, awaited        |
//!
//! Strategies are built per channel by a [`StrategyFactory`] taken from
//! [`TramConfig`](crate::TramConfig). Closures `Fn(&str) -> Box<dyn NotifyStrategy>`
//! are factories too; they see the hub as a channel named
//! [`HUB_NAME`](crate::HUB_NAME).

mod broadcast;
mod envelope;
mod local;

pub use broadcast::{
    BroadcastFactory, BroadcastOptions, BroadcastStrategy, Conduit, ConduitOpener, MemoryNetwork,
    MemoryPort,
};
pub use envelope::{Envelope, Publication, QueryRequest, QueryResponse};
pub use local::{LocalFactory, LocalStrategy};

use std::sync::Arc;

use serde_json::Value;

use crate::channel::{Replier, Repliers, Reply};
use crate::error::TramError;

/// Callback a strategy uses to hand a publication to the channel's local subscribers.
pub type DispatchHook = Arc<dyn Fn(Publication) -> Result<(), TramError> + Send + Sync>;

/// Pluggable delivery policy for one channel.
///
/// `init` and `on_notify_subscribers` are each called exactly once, before any
/// other method.
pub trait NotifyStrategy: Send + Sync + 'static {
    /// Receives the channel's replier table.
    fn init(&mut self, repliers: Repliers);

    /// Receives the hook that delivers to the channel's local subscribers.
    fn on_notify_subscribers(&mut self, hook: DispatchHook);

    /// Routes a publication.
    ///
    /// Errors returned here surface from `publish_sync` / `publish`.
    fn notify_subscribers(&self, publication: Publication) -> Result<(), TramError>;

    /// Routes a query. `Ok(None)` means nobody will answer.
    fn query(&self, query: &str, params: Vec<Value>) -> Result<Option<Reply>, TramError>;

    /// Called whenever the channel gains a subscriber or a replier.
    ///
    /// Strategies with background work that needs a runtime start it here
    /// (or on first use) and report [`TramError::NoRuntime`] until one exists.
    fn activate(&self) -> Result<(), TramError> {
        Ok(())
    }
}

/// Builds the strategy of each channel.
///
/// `build` receives a sub-channel (or standalone channel) name. `build_hub`
/// builds the hub's own root channel; override it when the hub must not share
/// anything keyed by name with a sub-channel that happens to be called
/// [`HUB_NAME`](crate::HUB_NAME).
pub trait StrategyFactory: Send + Sync + 'static {
    fn build(&self, channel: &str) -> Box<dyn NotifyStrategy>;

    fn build_hub(&self) -> Box<dyn NotifyStrategy> {
        self.build(crate::tram::HUB_NAME)
    }
}

impl<F> StrategyFactory for F
where
    F: Fn(&str) -> Box<dyn NotifyStrategy> + Send + Sync + 'static,
{
    fn build(&self, channel: &str) -> Box<dyn NotifyStrategy> {
        self(channel)
    }
}

/// Looks up and invokes the replier for `query` in `repliers`.
pub(crate) fn ask_local(repliers: Option<&Repliers>, query: &str, params: Vec<Value>) -> Result<Option<Reply>, TramError> {
    let replier: Option<Replier> = repliers.and_then(|r| r.get(query));
    match replier {
        Some(replier) => replier.invoke(query, params).map(Some),
        None => Ok(None),
    }
}
