//! # The hub.
//!
//! [`EventTram`] is itself a channel (named [`HUB_NAME`]) and a registry of
//! named sub-channels. Every channel of one hub shares the hub's
//! [`TramConfig`], dispatch scheduler and fault bus, and gets its own notify
//! strategy from the configured factory.
//!
//! ```text
//! EventTram<Ch, Ev, Qu>
//!   ├─ root:     Channel<Ev, Qu>               ("eventTram", via Deref)
//!   └─ channels: name → RawChannel             (created on first access)
//!                  channel(Users) ──► Channel<Users::Events, Users::Queries>
//! ```
//!
//! ## Registries
//! `Ch`, `Ev` and `Qu` are type-level lists. [`register_channel`], [`register_events`]
//! and [`register_queries`] return the same hub under a wider list; nothing
//! happens at runtime.
//!
//! [`register_channel`]: EventTram::register_channel
//! [`register_events`]: EventTram::register_events
//! [`register_queries`]: EventTram::register_queries
//!
//! ## Example
//! ```
//! use eventtram::{EventTram, TramConfig, catalog, define_channel, define_event};
//!
//! define_event!(pub Started = "app:started" => ());
//! define_event!(pub Saved = "user:saved" => u32);
//! define_channel!(pub Users = "users" { events: [Saved], queries: [] });
//!
//! let hub = EventTram::new(TramConfig::default())
//!     .register_events::<catalog![Started]>()
//!     .register_channel::<Users>();
//!
//! hub.publish_sync(Started, ()).unwrap();
//!
//! let users = hub.channel(Users);
//! assert!(users.same_channel(&hub.channel(Users)));
//! assert_eq!(users.name(), "users");
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::catalog::{Append, ChannelDef, Cons, Contains, Nil};
use crate::channel::state::Context;
use crate::channel::{Channel, RawChannel};
use crate::config::TramConfig;

/// Name of the hub's own channel.
pub const HUB_NAME: &str = "eventTram";

struct Registry {
    context: Arc<Context>,
    channels: Mutex<HashMap<String, RawChannel>>,
}

/// Event hub with named sub-channels.
///
/// - `Ch`: registered channel definitions
/// - `Ev`: events of the hub channel
/// - `Qu`: queries of the hub channel
///
/// Cheap to clone; clones are the same hub.
pub struct EventTram<Ch = Nil, Ev = Nil, Qu = Nil> {
    root: Channel<Ev, Qu>,
    registry: Arc<Registry>,
    _channels: PhantomData<fn() -> Ch>,
}

impl EventTram {
    /// Creates a hub with empty registries.
    pub fn new(config: TramConfig) -> Self {
        let context = Context::new(config);
        let strategy = context.config.strategy.build_hub();
        let root = RawChannel::assemble(HUB_NAME, Arc::clone(&context), strategy);
        debug!(hub = HUB_NAME, "hub created");

        Self {
            root: Channel::from_raw(root),
            registry: Arc::new(Registry {
                context,
                channels: Mutex::new(HashMap::new()),
            }),
            _channels: PhantomData,
        }
    }
}

impl<Ch, Ev, Qu> EventTram<Ch, Ev, Qu> {
    /// Typed view of the registered sub-channel `D`, created on first access.
    ///
    /// Repeated calls with the same definition return the same channel.
    pub fn channel<D, I>(&self, _def: D) -> Channel<D::Events, D::Queries>
    where
        D: ChannelDef,
        Ch: Contains<D, I>,
    {
        Channel::from_raw(self.raw_channel(D::NAME))
    }

    /// The sub-channel called `name`, created on first access.
    ///
    /// Sub-channels are a separate namespace from the hub itself: a sub-channel
    /// named [`HUB_NAME`] is not the hub channel.
    pub fn raw_channel(&self, name: &str) -> RawChannel {
        let mut channels = self
            .registry
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = channels.get(name) {
            return existing.clone();
        }

        let strategy = self.registry.context.config.strategy.build(name);
        let channel = RawChannel::assemble(name, Arc::clone(&self.registry.context), strategy);
        channels.insert(name.to_owned(), channel.clone());
        channel
    }

    /// Names of the sub-channels created so far, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Adds `D` to the channel registry.
    pub fn register_channel<D: ChannelDef>(self) -> EventTram<Cons<D, Ch>, Ev, Qu> {
        self.retype()
    }

    /// Adds the events in list `L` to the hub channel's catalog.
    pub fn register_events<L>(self) -> EventTram<Ch, <Ev as Append<L>>::Output, Qu>
    where
        Ev: Append<L>,
    {
        self.retype()
    }

    /// Adds the queries in list `L` to the hub channel's catalog.
    pub fn register_queries<L>(self) -> EventTram<Ch, Ev, <Qu as Append<L>>::Output>
    where
        Qu: Append<L>,
    {
        self.retype()
    }

    pub fn config(&self) -> &TramConfig {
        &self.registry.context.config
    }

    /// Whether `self` and `other` are the same hub.
    pub fn same_hub<Ch2, Ev2, Qu2>(&self, other: &EventTram<Ch2, Ev2, Qu2>) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry)
    }

    fn retype<Ch2, Ev2, Qu2>(self) -> EventTram<Ch2, Ev2, Qu2> {
        EventTram {
            root: Channel::from_raw(self.root.into_raw()),
            registry: self.registry,
            _channels: PhantomData,
        }
    }
}

impl<Ch, Ev, Qu> Deref for EventTram<Ch, Ev, Qu> {
    type Target = Channel<Ev, Qu>;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl<Ch, Ev, Qu> Clone for EventTram<Ch, Ev, Qu> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            registry: Arc::clone(&self.registry),
            _channels: PhantomData,
        }
    }
}

impl<Ch, Ev, Qu> std::fmt::Debug for EventTram<Ch, Ev, Qu> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTram")
            .field("root", self.root.raw())
            .field("channels", &self.channel_names())
            .field("config", self.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    crate::define_event!(Ping = "ping" => ());
    crate::define_channel!(Net = "net" { events: [Ping], queries: [] });
    crate::define_channel!(Disk = "disk" { events: [], queries: [] });

    #[test]
    fn hub_channel_has_its_name() {
        let hub = EventTram::new(TramConfig::default());
        assert_eq!(hub.name(), HUB_NAME);
    }

    #[test]
    fn sub_channels_are_memoized_and_distinct() {
        let hub = EventTram::new(TramConfig::default())
            .register_channel::<Net>()
            .register_channel::<Disk>();

        let net = hub.channel(Net);
        assert!(net.same_channel(&hub.channel(Net)));
        assert!(!net.same_channel(&hub.channel(Disk)));
        assert!(!net.raw().same_channel(hub.raw()));
        assert_eq!(hub.channel_names(), vec!["disk".to_string(), "net".to_string()]);
    }

    #[test]
    fn sub_channel_named_like_the_hub_is_separate() {
        let hub = EventTram::new(TramConfig::default());
        assert!(!hub.raw_channel(HUB_NAME).same_channel(hub.raw()));
    }

    #[test]
    fn registering_keeps_the_same_hub() {
        let hub = EventTram::new(TramConfig::default());
        let before = hub.clone();
        let widened = hub.register_events::<catalog![Ping]>().register_queries::<catalog![]>();
        assert!(widened.same_hub(&before));
        assert!(widened.raw().same_channel(before.raw()));
    }
}
