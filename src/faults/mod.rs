//! Uncaught dispatch errors: fault records and the fault bus.
//!
//! When a subscriber fails and the channel is not configured to throw
//! immediately, nobody is on the call stack to receive the error. Instead it is
//! reported here, on a later scheduler tick, so an outer handler can still
//! observe it.
//!
//! ## Contents
//! - [`FaultKind`], [`Fault`] what failed, where and when
//! - [`FaultBus`] hub-wide sink that watchers subscribe to
//!
//! ## Quick reference
//! - **Publishers**: channel dispatch (per failing subscriber).
//! - **Consumers**: anything holding a receiver from
//!   [`RawChannel::faults`](crate::RawChannel::faults); a hub and all of its
//!   sub-channels share one bus.

mod bus;
mod fault;

pub use bus::FaultBus;
pub use fault::{Fault, FaultKind};
