//! # Channels: subscribers, publications and queries.
//!
//! - [`RawChannel`]: string names, JSON payloads; the engine.
//! - [`Channel`]: typed view checked against event/query catalogs.
//! - [`ReadonlyChannel`] / [`WriteonlyChannel`]: restricted views.
//! - [`Subscriber`], [`Handler`]: what listens, and its identity.
//! - [`Replier`], [`Reply`]: what answers, and the answer.

pub(crate) mod handler;
mod raw;
mod reply;
pub(crate) mod state;
mod typed;
mod views;

pub use handler::{Handler, HandlerId, Subscriber};
pub use raw::RawChannel;
pub use reply::{Replier, Repliers, Reply};
pub use typed::Channel;
pub use views::{ReadonlyChannel, WriteonlyChannel};
