//! # Restricted views of a channel.
//!
//! Hand a [`ReadonlyChannel`] to code that should only listen and ask, and a
//! [`WriteonlyChannel`] to code that should only publish and answer. Both
//! share the channel underneath; nothing is copied.
//!
//! ```text
//!                    ┌── readonly()  : on, once, off*, query
//! Channel<Ev, Qu> ───┤
//!                    └── writeonly() : publish, publish_sync, reply, reply_async
//! ```

use std::future::Future;

use super::handler::Handler;
use super::reply::Reply;
use super::typed::Channel;
use crate::catalog::{Contains, Event, Query};
use crate::error::TramError;

/// Subscribe/query-only view of a [`Channel`].
pub struct ReadonlyChannel<Ev, Qu> {
    inner: Channel<Ev, Qu>,
}

impl<Ev, Qu> ReadonlyChannel<Ev, Qu> {
    pub(crate) fn new(inner: Channel<Ev, Qu>) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn on<E, I, F>(&self, event: E, f: F) -> Handler
    where
        E: Event,
        Ev: Contains<E, I>,
        F: Fn(&E::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.on(event, f)
    }

    pub fn once<E, I, F>(&self, event: E, f: F) -> Handler
    where
        E: Event,
        Ev: Contains<E, I>,
        F: Fn(&E::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.once(event, f)
    }

    pub fn off<E, I>(&self, event: E, handler: &Handler)
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.inner.off(event, handler);
    }

    pub fn off_event<E, I>(&self, event: E)
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.inner.off_event(event);
    }

    pub fn off_handler(&self, handler: &Handler) {
        self.inner.off_handler(handler);
    }

    pub fn query<Q, I>(&self, query: Q, params: Q::Params) -> Result<Option<Reply<Q::Output>>, TramError>
    where
        Q: Query,
        Qu: Contains<Q, I>,
    {
        self.inner.query(query, params)
    }
}

impl<Ev, Qu> Clone for ReadonlyChannel<Ev, Qu> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<Ev, Qu> std::fmt::Debug for ReadonlyChannel<Ev, Qu> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadonlyChannel").field("name", &self.name()).finish()
    }
}

/// Publish/reply-only view of a [`Channel`].
pub struct WriteonlyChannel<Ev, Qu> {
    inner: Channel<Ev, Qu>,
}

impl<Ev, Qu> WriteonlyChannel<Ev, Qu> {
    pub(crate) fn new(inner: Channel<Ev, Qu>) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn publish<E, I>(&self, event: E, payload: E::Payload) -> Result<(), TramError>
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.inner.publish(event, payload)
    }

    pub fn publish_sync<E, I>(&self, event: E, payload: E::Payload) -> Result<(), TramError>
    where
        E: Event,
        Ev: Contains<E, I>,
    {
        self.inner.publish_sync(event, payload)
    }

    pub fn reply<Q, I, F>(&self, query: Q, f: F)
    where
        Q: Query,
        Qu: Contains<Q, I>,
        F: Fn(Q::Params) -> anyhow::Result<Q::Output> + Send + Sync + 'static,
    {
        self.inner.reply(query, f);
    }

    pub fn reply_async<Q, I, F, Fut>(&self, query: Q, f: F)
    where
        Q: Query,
        Qu: Contains<Q, I>,
        F: Fn(Q::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Q::Output>> + Send + 'static,
    {
        self.inner.reply_async(query, f);
    }
}

impl<Ev, Qu> Clone for WriteonlyChannel<Ev, Qu> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<Ev, Qu> std::fmt::Debug for WriteonlyChannel<Ev, Qu> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteonlyChannel").field("name", &self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog;
    use crate::{Channel, TramConfig};
    use std::sync::{Arc, Mutex};

    crate::define_event!(Tick = "tick" => u32);
    crate::define_query!(Echo = "echo" => fn(String) -> String);

    #[test]
    fn views_share_the_channel() {
        let ch: Channel<catalog![Tick], catalog![Echo]> = Channel::new("clock", TramConfig::default());
        let reader = ch.readonly();
        let writer = ch.writeonly();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        reader.on(Tick, move |n| {
            sink.lock().unwrap().push(*n);
            Ok(())
        });
        writer.publish_sync(Tick, 9).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![9]);

        writer.reply(Echo, |(s,)| Ok(s));
        let echoed = reader.query(Echo, ("hi".to_string(),)).unwrap().unwrap();
        assert_eq!(echoed.try_ready().unwrap(), "hi");
        assert_eq!(reader.name(), writer.name());
    }
}
