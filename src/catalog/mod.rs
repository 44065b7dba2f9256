//! # Type-level namespace registries.
//!
//! Events, queries and channels are declared as zero-sized marker types:
//!
//! - [`Event`]: a name plus the payload type;
//! - [`Query`]: a name plus parameter and output types;
//! - [`ChannelDef`]: a channel name plus the catalogs of events and queries it carries.
//!
//! A catalog is a type-level list built with [`catalog!`](crate::catalog!)
//! (`Cons<A, Cons<B, Nil>>`). Typed APIs require `List: Contains<T, I>`; the
//! index `I` is inferred, so callers never write it. Using a marker that is not
//! listed is a compile error:
//!
//! ```compile_fail
//! use eventtram::{EventTram, TramConfig, catalog, define_event};
//!
//! define_event!(pub Listed = "listed" => ());
//! define_event!(pub Unlisted = "unlisted" => ());
//!
//! let hub = EventTram::new(TramConfig::default()).register_events::<catalog![Listed]>();
//! hub.on(Listed, |_| Ok(()));
//! hub.on(Unlisted, |_| Ok(()));
//! ```
//!
//! ## Widening
//! [`Append`] concatenates two lists; the hub's `register_*` methods use it to
//! return the same hub under a wider catalog.

mod list;
mod params;

pub use list::{Append, Cons, Contains, Here, Nil, There};
pub(crate) use params::{decode_params, encode_params};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A named, one-way publication with a typed payload.
///
/// Events without data use `()` as payload.
pub trait Event: 'static {
    /// Wire name of the event (e.g. `"scope:action"`).
    const NAME: &'static str;
    /// Payload carried by every publication of this event.
    type Payload: Serialize + DeserializeOwned + Send + 'static;
}

/// A named request/response interaction.
///
/// `Params` is usually a tuple: `(A, B)` travels as `[a, b]`, `()` as `[]`.
pub trait Query: 'static {
    /// Wire name of the query (e.g. `"q:sum"`).
    const NAME: &'static str;
    /// Parameters passed to the replier.
    type Params: Serialize + DeserializeOwned + Send + 'static;
    /// Value returned by the replier.
    type Output: Serialize + DeserializeOwned + Send + 'static;
}

/// A named sub-channel of a hub, with its event and query catalogs.
pub trait ChannelDef: 'static {
    /// Channel name, unique within a hub.
    const NAME: &'static str;
    /// Events accepted by the channel (a [`catalog!`](crate::catalog!) list).
    type Events: 'static;
    /// Queries accepted by the channel (a [`catalog!`](crate::catalog!) list).
    type Queries: 'static;
}

/// Builds a type-level list: `catalog![A, B]` is `Cons<A, Cons<B, Nil>>`.
#[macro_export]
macro_rules! catalog {
    () => { $crate::Nil };
    ($head:ty $(, $tail:ty)*) => {
        $crate::Cons<$head, $crate::catalog![$($tail),*]>
    };
}

/// Declares an [`Event`] marker type.
///
/// ```
/// eventtram::define_event!(pub UserSaved = "user:saved" => String);
/// assert_eq!(<UserSaved as eventtram::Event>::NAME, "user:saved");
/// ```
#[macro_export]
macro_rules! define_event {
    ($(#[$meta:meta])* $vis:vis $ty:ident = $name:literal => $payload:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $ty;

        impl $crate::Event for $ty {
            const NAME: &'static str = $name;
            type Payload = $payload;
        }
    };
}

/// Declares a [`Query`] marker type.
///
/// ```
/// eventtram::define_query!(pub Sum = "q:sum" => fn(i64, i64) -> i64);
/// assert_eq!(<Sum as eventtram::Query>::NAME, "q:sum");
/// ```
#[macro_export]
macro_rules! define_query {
    ($(#[$meta:meta])* $vis:vis $ty:ident = $name:literal => fn($($param:ty),* $(,)?) -> $out:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $ty;

        impl $crate::Query for $ty {
            const NAME: &'static str = $name;
            type Params = ($($param,)*);
            type Output = $out;
        }
    };
}

/// Declares a [`ChannelDef`] marker type.
///
/// ```
/// use eventtram::{define_channel, define_event, define_query};
///
/// define_event!(pub Saved = "saved" => u32);
/// define_query!(pub Count = "count" => fn() -> u32);
/// define_channel!(pub Users = "users" { events: [Saved], queries: [Count] });
///
/// assert_eq!(<Users as eventtram::ChannelDef>::NAME, "users");
/// ```
#[macro_export]
macro_rules! define_channel {
    ($(#[$meta:meta])* $vis:vis $ty:ident = $name:literal {
        events: [$($event:ty),* $(,)?],
        queries: [$($query:ty),* $(,)?] $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $ty;

        impl $crate::ChannelDef for $ty {
            const NAME: &'static str = $name;
            type Events = $crate::catalog![$($event),*];
            type Queries = $crate::catalog![$($query),*];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_event!(Ping = "ping" => ());
    crate::define_event!(Pong = "pong" => u8);
    crate::define_query!(Nothing = "nothing" => fn() -> bool);
    crate::define_query!(Pair = "pair" => fn(String, u8) -> String);
    crate::define_channel!(Net = "net" { events: [Ping, Pong], queries: [] });

    fn assert_contains<L, T, I>()
    where
        L: Contains<T, I>,
    {
    }

    fn assert_same<A: 'static, B: 'static>() {
        assert_eq!(std::any::TypeId::of::<A>(), std::any::TypeId::of::<B>());
    }

    #[test]
    fn macros_fill_in_names_and_types() {
        assert_eq!(Ping::NAME, "ping");
        assert_eq!(Nothing::NAME, "nothing");
        assert_same::<<Nothing as Query>::Params, ()>();
        assert_same::<<Pair as Query>::Params, (String, u8)>();
        assert_same::<<Net as ChannelDef>::Events, Cons<Ping, Cons<Pong, Nil>>>();
        assert_same::<<Net as ChannelDef>::Queries, Nil>();
    }

    #[test]
    fn membership_is_inferred() {
        assert_contains::<crate::catalog![Ping, Pong], Ping, _>();
        assert_contains::<crate::catalog![Ping, Pong], Pong, _>();
    }

    #[test]
    fn append_widens_lists() {
        type Wide = <crate::catalog![Ping] as Append<crate::catalog![Pong]>>::Output;
        assert_same::<Wide, crate::catalog![Ping, Pong]>();
        assert_contains::<Wide, Pong, _>();
    }
}
