//! # Untyped channel over JSON values.
//!
//! [`RawChannel`] is the engine every typed view delegates to. Event and query
//! names are plain strings and payloads are [`serde_json::Value`]s.
//!
//! ```text
//! RawChannel ──► ChannelCore
//!                  ├─ ChannelState   (subscribers, dispatch, shared Context)
//!                  ├─ Repliers       (query name → replier)
//!                  └─ Box<dyn NotifyStrategy>
//!                        └─ hook ──► ChannelState::dispatch
//! ```

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::handler::{Handler, Subscriber};
use super::reply::{Replier, Repliers, Reply};
use super::state::{ChannelState, Context, OnceSubscriber};
use crate::config::TramConfig;
use crate::error::TramError;
use crate::faults::Fault;
use crate::strategies::{DispatchHook, NotifyStrategy, Publication};

struct ChannelCore {
    state: Arc<ChannelState>,
    repliers: Repliers,
    strategy: Box<dyn NotifyStrategy>,
}

/// A named channel with string event/query names and JSON payloads.
///
/// Cheap to clone; clones are the same channel.
///
/// ## Example
/// ```
/// use eventtram::{RawChannel, TramConfig};
/// use serde_json::{Value, json};
/// use std::sync::{Arc, Mutex};
///
/// let channel = RawChannel::new("raw", TramConfig::default());
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// channel.on("a:x", move |v| {
///     sink.lock().unwrap().push(v.clone());
///     Ok(())
/// });
/// channel.publish_sync("a:x", json!(42)).unwrap();
/// assert_eq!(*seen.lock().unwrap(), vec![json!(42)]);
///
/// channel.reply("q:sum", |params| Ok(json!(params.iter().filter_map(Value::as_i64).sum::<i64>())));
/// let reply = channel.query("q:sum", vec![json!(2), json!(3)]).unwrap().unwrap();
/// assert_eq!(reply.try_ready().unwrap(), json!(5));
/// ```
#[derive(Clone)]
pub struct RawChannel {
    core: Arc<ChannelCore>,
}

impl RawChannel {
    /// Creates a standalone channel; its strategy comes from `config.strategy`.
    pub fn new(name: impl Into<String>, config: TramConfig) -> Self {
        let name = name.into();
        let context = Context::new(config);
        let strategy = context.config.strategy.build(&name);
        Self::assemble(&name, context, strategy)
    }

    /// Creates a standalone channel with an explicit strategy.
    pub fn with_strategy(name: impl Into<String>, config: TramConfig, strategy: Box<dyn NotifyStrategy>) -> Self {
        Self::assemble(&name.into(), Context::new(config), strategy)
    }

    pub(crate) fn assemble(name: &str, context: Arc<Context>, mut strategy: Box<dyn NotifyStrategy>) -> Self {
        let state = ChannelState::new(name, context);
        let repliers = Repliers::new();

        strategy.init(repliers.clone());
        let target = Arc::clone(&state);
        let hook: DispatchHook = Arc::new(move |publication: Publication| target.dispatch(publication));
        strategy.on_notify_subscribers(hook);

        debug!(channel = name, "channel created");
        Self {
            core: Arc::new(ChannelCore {
                state,
                repliers,
                strategy,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.core.state.name()
    }

    /// Subscribes a closure to `event`.
    pub fn on<F>(&self, event: &str, f: F) -> Handler
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_subscriber(event, f)
    }

    /// Subscribes a [`Subscriber`] to `event`.
    pub fn on_subscriber<S: Subscriber>(&self, event: &str, subscriber: S) -> Handler {
        let handler = Handler::new(subscriber);
        self.on_handler(event, handler.clone());
        handler
    }

    /// Registers an existing handler (again) under `event`.
    pub fn on_handler(&self, event: &str, handler: Handler) {
        self.core.state.add(event, handler);
        self.activate();
    }

    /// Subscribes a closure for the next delivery of `event` only.
    pub fn once<F>(&self, event: &str, f: F) -> Handler
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.once_subscriber(event, f)
    }

    /// Subscribes a [`Subscriber`] for the next delivery of `event` only.
    pub fn once_subscriber<S: Subscriber>(&self, event: &str, subscriber: S) -> Handler {
        let handler = OnceSubscriber::handler(&self.core.state, event, Handler::new(subscriber));
        self.on_handler(event, handler.clone());
        handler
    }

    /// Removes every registration of `handler` under `event`.
    pub fn off(&self, event: &str, handler: &Handler) {
        self.core.state.remove(event, handler.id());
    }

    /// Removes every subscriber of `event`.
    pub fn off_event(&self, event: &str) {
        self.core.state.remove_event(event);
    }

    /// Removes `handler` from every event.
    pub fn off_handler(&self, handler: &Handler) {
        self.core.state.remove_everywhere(handler.id());
    }

    /// Publishes `payload`; subscribers run on a later scheduler tick.
    pub fn publish(&self, event: &str, payload: Value) -> Result<(), TramError> {
        self.core
            .strategy
            .notify_subscribers(Publication::new(event, payload, false))
    }

    /// Publishes `payload`; local subscribers run before this returns.
    pub fn publish_sync(&self, event: &str, payload: Value) -> Result<(), TramError> {
        self.core
            .strategy
            .notify_subscribers(Publication::new(event, payload, true))
    }

    /// Asks the strategy to answer `query`. `Ok(None)` means nobody will.
    pub fn query(&self, query: &str, params: Vec<Value>) -> Result<Option<Reply>, TramError> {
        self.core.strategy.query(query, params)
    }

    /// Installs a synchronous replier for `query`, replacing any previous one.
    pub fn reply<F>(&self, query: &str, f: F)
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.reply_with(query, Replier::new(move |params| f(params).map(Reply::Ready)));
    }

    /// Installs an async replier for `query`, replacing any previous one.
    pub fn reply_async<F, Fut>(&self, query: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let name = query.to_owned();
        self.reply_with(
            query,
            Replier::new(move |params| {
                let future = f(params);
                let name = name.clone();
                Ok(Reply::deferred(async move {
                    future.await.map_err(|e| TramError::replier(name, e))
                }))
            }),
        );
    }

    /// Installs `replier` for `query`, replacing any previous one.
    pub fn reply_with(&self, query: &str, replier: Replier) {
        if self.core.repliers.insert(query, replier).is_some() {
            debug!(channel = self.name(), query, "replier replaced");
        }
        self.activate();
    }

    fn activate(&self) {
        if let Err(err) = self.core.strategy.activate() {
            debug!(channel = self.name(), error = %err, "strategy not active yet");
        }
    }

    /// Replier table shared with the strategy.
    pub fn repliers(&self) -> &Repliers {
        &self.core.repliers
    }

    /// Number of registrations under `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.core.state.count(event)
    }

    /// Events with at least one subscriber, sorted.
    pub fn events(&self) -> Vec<String> {
        self.core.state.events()
    }

    /// Receiver for subscriber errors that had no caller to return to.
    ///
    /// Shared by every channel of the same hub.
    pub fn faults(&self) -> broadcast::Receiver<Fault> {
        self.core.state.context().faults.subscribe()
    }

    /// Waits until every deferred delivery queued so far (on this hub) has run.
    pub async fn flush(&self) -> Result<(), TramError> {
        self.core.state.context().scheduler.flush().await
    }

    /// Whether `self` and `other` are the same channel.
    pub fn same_channel(&self, other: &RawChannel) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl std::fmt::Debug for RawChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawChannel")
            .field("name", &self.name())
            .field("events", &self.events())
            .field("repliers", &self.core.repliers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn channel() -> RawChannel {
        RawChannel::new("raw", TramConfig::default())
    }

    #[test]
    fn same_handler_registered_twice_is_removed_together() {
        let ch = channel();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let h = ch.on("e", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        ch.on_handler("e", h.clone());

        ch.publish_sync("e", json!(null)).unwrap();
        assert_eq!(*hits.lock().unwrap(), 2);

        ch.off("e", &h);
        ch.publish_sync("e", json!(null)).unwrap();
        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[test]
    fn missing_replier_yields_none() {
        let ch = channel();
        assert!(ch.query("q:nobody", Vec::new()).unwrap().is_none());
    }

    #[test]
    fn failing_replier_surfaces_from_query() {
        let ch = channel();
        ch.reply("q:fail", |_| anyhow::bail!("refused"));
        let err = ch.query("q:fail", Vec::new()).unwrap_err();
        assert_eq!(err.as_label(), "replier_failed");
    }

    #[tokio::test]
    async fn async_replier_produces_deferred_reply() {
        let ch = channel();
        ch.reply_async("q:later", |params| async move { Ok::<_, anyhow::Error>(json!(params.len())) });
        let reply = ch.query("q:later", vec![json!(1)]).unwrap().unwrap();
        assert!(!reply.is_ready());
        assert_eq!(reply.await.unwrap(), json!(1));
    }

    #[test]
    fn deferred_publish_needs_a_runtime() {
        let ch = channel();
        ch.on("e", |_| Ok(()));
        assert!(matches!(ch.publish("e", json!(1)), Err(TramError::NoRuntime)));
    }

    #[test]
    fn clones_are_the_same_channel() {
        let a = channel();
        let b = a.clone();
        assert!(a.same_channel(&b));
        assert!(!a.same_channel(&channel()));
    }
}
