//! # Typed channel.
//!
//! [`Channel<Ev, Qu>`] wraps a [`RawChannel`] with compile-time catalogs:
//! `Ev` lists the events and `Qu` the queries the channel accepts. Payloads are
//! serialized to JSON on the way in and deserialized on the way out, so typed
//! and raw callers of the same channel interoperate.
//!
//! ## Example
//! ```
//! use eventtram::{Channel, TramConfig, catalog, define_event, define_query};
//! use std::sync::{Arc, Mutex};
//!
//! define_event!(pub Saved = "user:saved" => String);
//! define_query!(pub Sum = "q:sum" => fn(i64, i64) -> i64);
//!
//! let users: Channel<catalog![Saved], catalog![Sum]> = Channel::new("users", TramConfig::default());
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! users.on(Saved, move |name| {
//!     sink.lock().unwrap().push(name.clone());
//!     Ok(())
//! });
//! users.publish_sync(Saved, "ada".to_string()).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec!["ada".to_string()]);
//!
//! users.reply(Sum, |(a, b)| Ok(a + b));
//! let five = users.query(Sum, (2, 3)).unwrap().unwrap();
//! assert_eq!(five.try_ready().unwrap(), 5);
//! ```

use std::future::Future;
use std::marker::PhantomData;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::handler::{Handler, Subscriber};
use super::raw::RawChannel;
use super::reply::{Replier, Reply};
use super::views::{ReadonlyChannel, WriteonlyChannel};
use crate::catalog::{Contains, Event, Nil, Query, decode_params, encode_params};
use crate::config::TramConfig;
use crate::error::TramError;
use crate::faults::Fault;
use crate::strategies::NotifyStrategy;

/// Decodes the JSON payload into `E::Payload` before calling `f`.
struct TypedSubscriber<E, F> {
    f: F,
    _event: PhantomData<fn() -> E>,
}

impl<E, F> Subscriber for TypedSubscriber<E, F>
where
    E: Event,
    F: Fn(&E::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_event(&self, payload: &Value) -> anyhow::Result<()> {
        let payload = <E::Payload as Deserialize>::deserialize(payload).map_err(|e| TramError::codec(E::NAME, e))?;
        (self.f)(&payload)
    }

    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }
}

pub(crate) fn encode_payload<E: Event>(payload: E::Payload) -> Result<Value, TramError> {
    serde_json::to_value(payload).map_err(|e| TramError::codec(E::NAME, e))
}

/// A channel whose events and queries are checked against `Ev` and `Qu`.
pub struct Channel<Ev = Nil, Qu = Nil> {
    raw: RawChannel,
    _catalog: PhantomData<fn() -> (Ev, Qu)>,
}

impl<Ev, Qu> Clone for Channel<Ev, Qu> {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw.clone())
    }
}

impl<Ev, Qu> std::fmt::Debug for Channel<Ev, Qu> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Channel").field(&self.raw).finish()
    }
}

impl<Ev, Qu> Channel<Ev, Qu> {
    /// Creates a standalone channel; its strategy comes from `config.strategy`.
    pub fn new(name: impl Into<String>, config: TramConfig) -> Self {
        Self::from_raw(RawChannel::new(name, config))
    }

    /// Creates a standalone channel with an explicit strategy.
    pub fn with_strategy(name: impl Into<String>, config: TramConfig, strategy: Box<dyn NotifyStrategy>) -> Self {
        Self::from_raw(RawChannel::with_strategy(name, config, strategy))
    }

    /// Views `raw` through the catalogs `Ev` and `Qu`.
    pub fn from_raw(raw: RawChannel) -> Self {
        Self {
            raw,
            _catalog: PhantomData,
        }
    }

    /// The untyped channel underneath.
    pub fn raw(&self) -> &RawChannel {
        &self.raw
    }

    pub fn into_raw(self) -> RawChannel {
        self.raw
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Subscribes `f` to `event`. Returns the handler for later `off`.
    pub fn on<E, I, F>(&self, _event: E, f: F) -> Handler
    where
        E: Event,
        Ev: Contains<E, I>,
        F: Fn(&E::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.raw.on_subscriber(E::NAME, TypedSubscriber::<E, F> { f, _event: PhantomData })
    }

    /// Registers an existing handler (again) under `event`.
    pub fn on_handler<E, I>(&self, _event: E, handler: Handler)
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.on_handler(E::NAME, handler);
    }

    /// Subscribes `f` for the next delivery of `event` only.
    pub fn once<E, I, F>(&self, _event: E, f: F) -> Handler
    where
        E: Event,
        Ev: Contains<E, I>,
        F: Fn(&E::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.raw.once_subscriber(E::NAME, TypedSubscriber::<E, F> { f, _event: PhantomData })
    }

    /// Removes `handler` from `event`.
    pub fn off<E, I>(&self, _event: E, handler: &Handler)
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.off(E::NAME, handler);
    }

    /// Removes every subscriber of `event`.
    pub fn off_event<E, I>(&self, _event: E)
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.off_event(E::NAME);
    }

    /// Removes `handler` from every event.
    pub fn off_handler(&self, handler: &Handler) {
        self.raw.off_handler(handler);
    }

    /// Publishes on a later scheduler tick.
    pub fn publish<E, I>(&self, _event: E, payload: E::Payload) -> Result<(), TramError>
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.publish(E::NAME, encode_payload::<E>(payload)?)
    }

    /// Publishes and runs local subscribers before returning.
    pub fn publish_sync<E, I>(&self, _event: E, payload: E::Payload) -> Result<(), TramError>
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.publish_sync(E::NAME, encode_payload::<E>(payload)?)
    }

    /// Asks for an answer to `query`. `Ok(None)` means nobody will answer.
    pub fn query<Q, I>(&self, _query: Q, params: Q::Params) -> Result<Option<Reply<Q::Output>>, TramError>
    where
        Q: Query,
        Qu: Contains<Q, I>,
    {
        let params = encode_params(Q::NAME, &params)?;
        match self.raw.query(Q::NAME, params)? {
            Some(reply) => reply
                .and_then(|value| serde_json::from_value(value).map_err(|e| TramError::codec(Q::NAME, e)))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Installs the replier for `query`, replacing any previous one.
    pub fn reply<Q, I, F>(&self, _query: Q, f: F)
    where
        Q: Query,
        Qu: Contains<Q, I>,
        F: Fn(Q::Params) -> anyhow::Result<Q::Output> + Send + Sync + 'static,
    {
        self.raw.reply_with(
            Q::NAME,
            Replier::new(move |params| {
                let output = f(decode_params::<Q::Params>(Q::NAME, params)?)?;
                let value = serde_json::to_value(output).map_err(|e| TramError::codec(Q::NAME, e))?;
                Ok(Reply::Ready(value))
            }),
        );
    }

    /// Installs an async replier for `query`, replacing any previous one.
    pub fn reply_async<Q, I, F, Fut>(&self, _query: Q, f: F)
    where
        Q: Query,
        Qu: Contains<Q, I>,
        F: Fn(Q::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Q::Output>> + Send + 'static,
    {
        self.raw.reply_with(
            Q::NAME,
            Replier::new(move |params| {
                let future = f(decode_params::<Q::Params>(Q::NAME, params)?);
                Ok(Reply::deferred(async move {
                    let output = future.await.map_err(|e| TramError::replier(Q::NAME, e))?;
                    serde_json::to_value(output).map_err(|e| TramError::codec(Q::NAME, e))
                }))
            }),
        );
    }

    /// Subscribe/query-only view of this channel.
    pub fn readonly(&self) -> ReadonlyChannel<Ev, Qu> {
        ReadonlyChannel::new(self.clone())
    }

    /// Publish/reply-only view of this channel.
    pub fn writeonly(&self) -> WriteonlyChannel<Ev, Qu> {
        WriteonlyChannel::new(self.clone())
    }

    pub fn subscriber_count<E, I>(&self, _event: E) -> usize
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.raw.subscriber_count(E::NAME)
    }

    /// See [`RawChannel::faults`].
    pub fn faults(&self) -> broadcast::Receiver<Fault> {
        self.raw.faults()
    }

    /// See [`RawChannel::flush`].
    pub async fn flush(&self) -> Result<(), TramError> {
        self.raw.flush().await
    }

    pub fn same_channel<Ev2, Qu2>(&self, other: &Channel<Ev2, Qu2>) -> bool {
        self.raw.same_channel(other.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use serde::Serialize;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    crate::define_event!(Saved = "user:saved" => User);
    crate::define_event!(Cleared = "user:cleared" => ());
    crate::define_query!(Lookup = "user:lookup" => fn(u32) -> Option<String>);
    crate::define_query!(Count = "user:count" => fn() -> usize);

    type Users = Channel<catalog![Saved, Cleared], catalog![Lookup, Count]>;

    fn users() -> Users {
        Channel::new("users", TramConfig::default())
    }

    #[test]
    fn typed_and_raw_callers_interoperate() {
        let ch = users();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ch.on(Saved, move |user| {
            sink.lock().unwrap().push(user.clone());
            Ok(())
        });

        ch.raw()
            .publish_sync("user:saved", json!({ "id": 7, "name": "ada" }))
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![User {
                id: 7,
                name: "ada".into()
            }]
        );
    }

    fn ignore_user(_: &User) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn once_handlers_keep_the_callback_name() {
        let ch = users();
        let every = ch.on(Saved, ignore_user);
        let first = ch.once(Saved, ignore_user);
        assert!(first.name().ends_with("ignore_user"), "got {}", first.name());
        assert_eq!(first.name(), every.name());
    }

    #[test]
    fn undecodable_payload_is_a_subscriber_error() {
        let ch = Channel::<catalog![Saved], catalog![]>::new("users", TramConfig::default().with_throw_immediately(true));
        ch.on(Saved, |_| Ok(()));
        let err = ch.raw().publish_sync("user:saved", json!("not a user")).unwrap_err();
        assert_eq!(err.as_label(), "subscriber_failed");
    }

    #[test]
    fn unit_events_and_queries() {
        let ch = users();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        ch.once(Cleared, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        ch.publish_sync(Cleared, ()).unwrap();
        ch.publish_sync(Cleared, ()).unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);

        ch.reply(Count, |()| Ok(3));
        assert_eq!(ch.query(Count, ()).unwrap().unwrap().try_ready().unwrap(), 3);
    }

    #[test]
    fn single_parameter_queries() {
        let ch = users();
        ch.reply(Lookup, |(id,)| Ok((id == 1).then(|| "ada".to_string())));
        let hit = ch.query(Lookup, (1,)).unwrap().unwrap().try_ready().unwrap();
        let miss = ch.query(Lookup, (2,)).unwrap().unwrap().try_ready().unwrap();
        assert_eq!(hit.as_deref(), Some("ada"));
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn async_replier_decodes_on_resolution() {
        let ch = users();
        ch.reply_async(Count, |()| async { Ok::<_, anyhow::Error>(42) });
        let reply = ch.query(Count, ()).unwrap().unwrap();
        assert!(!reply.is_ready());
        assert_eq!(reply.await.unwrap(), 42);
    }
}
