//! # eventtram
//!
//! **Event Tram** is an in-process event bus for Rust.
//!
//! A hub carries named events and request/reply queries, and hands out named
//! sub-channels with the same surface. Names and payload types are checked at
//! compile time against type-level catalogs; underneath, everything travels as
//! JSON so the same channel can be extended across peers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  publish / publish_sync / query                      on / once / off / reply
//!              │                                                 │
//!              ▼                                                 ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │  EventTram (hub channel "eventTram" + name → sub-channel registry)         │
//! │  Channel<Ev, Qu>  ──►  RawChannel                                         │
//! │                          ├─ subscribers: event → [Handler]                │
//! │                          ├─ repliers:    query → Replier                  │
//! │                          └─ Box<dyn NotifyStrategy>                       │
//! └──────────────┬──────────────────────────────────────────────┬─────────────┘
//!                ▼                                              ▼
//!        LocalStrategy                                  BroadcastStrategy
//!   hook(Publication) ──► dispatch                 Envelope ──► Conduit ──► peers
//!                │                                              │
//!                ▼                                              ▼
//!   sync:  subscribers run on the caller's stack     peer listener ──► hook / replier
//!   async: Scheduler (FIFO steps, one per subscriber)
//!                │
//!                ▼
//!   uncaught failures ──► FaultBus (broadcast) + tracing::error!
//! ```
//!
//! ### Publication lifecycle
//! ```text
//! publish(e, payload)
//!   ├─► strategy.notify_subscribers(Publication{ e, payload, sync: false })
//!   ├─► dispatch: snapshot subscribers of e
//!   ├─► defer one step per subscriber
//!   └─► return Ok(())            (nothing has run yet)
//!
//! scheduler worker:
//!   step ──► subscriber(payload)
//!     ├─ Ok        ──► next step
//!     └─ Err/panic ──► throw_immediately ? skip rest + fault : fault on later tick
//! ```
//!
//! ## Features
//! | Area              | Description                                            | Key types / traits                                  |
//! |-------------------|--------------------------------------------------------|-----------------------------------------------------|
//! | **Hub**           | Root channel plus memoized named sub-channels.         | [`EventTram`]                                       |
//! | **Channels**      | Subscribe, publish, query, reply; restricted views.    | [`Channel`], [`RawChannel`], [`ReadonlyChannel`]    |
//! | **Catalogs**      | Compile-time event/query/channel registries.           | [`Event`], [`Query`], [`ChannelDef`], [`catalog!`]  |
//! | **Strategies**    | Pluggable delivery: local or peer broadcast.           | [`NotifyStrategy`], [`BroadcastStrategy`]           |
//! | **Faults**        | Subscriber errors with no caller to return to.         | [`FaultBus`], [`Fault`]                             |
//! | **Errors**        | One typed error for every failure path.                | [`TramError`]                                       |
//! | **Configuration** | Failure mode, strategy factory, fault bus capacity.    | [`TramConfig`]                                      |
//!
//! ## Example
//! ```rust
//! use eventtram::{EventTram, TramConfig, catalog, define_channel, define_event, define_query};
//!
//! define_event!(pub Saved = "user:saved" => String);
//! define_query!(pub Sum = "q:sum" => fn(i64, i64) -> i64);
//! define_channel!(pub Users = "users" { events: [Saved], queries: [] });
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), eventtram::TramError> {
//!     let hub = EventTram::new(TramConfig::default())
//!         .register_queries::<catalog![Sum]>()
//!         .register_channel::<Users>();
//!
//!     hub.reply(Sum, |(a, b)| Ok(a + b));
//!     let sum = hub.query(Sum, (2, 3))?.expect("replier installed").await?;
//!     assert_eq!(sum, 5);
//!
//!     let users = hub.channel(Users);
//!     users.on(Saved, |name| {
//!         println!("saved {name}");
//!         Ok(())
//!     });
//!     users.publish(Saved, "ada".to_string())?;
//!     users.flush().await?;
//!     Ok(())
//! }
//! ```
mod catalog;
mod channel;
mod config;
mod error;
mod faults;
mod scheduler;
mod strategies;
mod tram;

// ---- Public re-exports ----

pub use catalog::{Append, ChannelDef, Cons, Contains, Event, Here, Nil, Query, There};
pub use channel::{
    Channel, Handler, HandlerId, RawChannel, ReadonlyChannel, Replier, Repliers, Reply, Subscriber,
    WriteonlyChannel,
};
pub use config::TramConfig;
pub use error::{BoxError, TramError};
pub use faults::{Fault, FaultBus, FaultKind};
pub use scheduler::Scheduler;
pub use strategies::{
    BroadcastFactory, BroadcastOptions, BroadcastStrategy, Conduit, ConduitOpener, DispatchHook, Envelope,
    LocalFactory, LocalStrategy, MemoryNetwork, MemoryPort, NotifyStrategy, Publication, QueryRequest,
    QueryResponse, StrategyFactory,
};
pub use tram::{EventTram, HUB_NAME};
