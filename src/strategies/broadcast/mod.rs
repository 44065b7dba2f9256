//! # Peer broadcast strategy.
//!
//! Extends a channel across every peer that shares a [`Conduit`] group.
//!
//! ```text
//!   peer A                                   peer B
//! publish(e) ──► {"event":..} ── conduit ──► listener ──► hook ──► B's subscribers
//! query(q)   ──► {"query":..,"id"} ────────► listener ──► B's replier
//!   await    ◄── {"queryResponse":..,"id"} ◄─────────────────────┘
//! ```
//!
//! ## Rules
//! - Publications go to peers only: the sender's own subscribers are not
//!   notified.
//! - Every peer with a replier answers; the first response wins.
//! - A query with no response within [`BroadcastOptions::timeout`] fails with
//!   [`TramError::QueryTimeout`]. Dropping the query future forgets it.
//! - Malformed inbound messages are logged and dropped.
//! - The listener task starts on the current Tokio runtime, or on first use
//!   inside one when the strategy was built outside; it stops when the
//!   strategy (its channel) is dropped.
//!
//! ## Groups
//! [`BroadcastStrategy::factory`] keeps the hub and its sub-channels apart:
//!
//! | Channel              | Conduit group                |
//! |----------------------|------------------------------|
//! | hub                  | `"{group}/hub"`              |
//! | sub-channel `name`   | `"{group}/channel/{name}"`   |

mod conduit;
mod pending;

pub use conduit::{Conduit, ConduitOpener, MemoryNetwork, MemoryPort};

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use self::pending::PendingQueries;
use super::{DispatchHook, Envelope, NotifyStrategy, Publication, QueryRequest, QueryResponse, StrategyFactory};
use crate::channel::handler::panic_message;
use crate::channel::{Repliers, Reply};
use crate::error::TramError;

/// Tuning for [`BroadcastStrategy`].
#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// How long a query waits for the first peer response.
    pub timeout: Duration,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
        }
    }
}

impl BroadcastOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct PeerShared {
    group: String,
    conduit: Arc<dyn Conduit>,
    repliers: OnceLock<Repliers>,
    hook: OnceLock<DispatchHook>,
    pending: PendingQueries,
}

/// Notify strategy that relays publications and queries to peers.
pub struct BroadcastStrategy {
    shared: Arc<PeerShared>,
    options: BroadcastOptions,
    cancel: CancellationToken,
    /// Inbound stream not yet handed to a listener task.
    idle: Mutex<Option<BoxStream<'static, String>>>,
}

impl BroadcastStrategy {
    /// Joins the conduit's group.
    ///
    /// The listener starts right away inside a Tokio runtime. Outside one it
    /// starts on the first subscription, reply, publish or query made inside a
    /// runtime; messages posted meanwhile wait in the conduit.
    pub fn new(conduit: Arc<dyn Conduit>, options: BroadcastOptions) -> Self {
        let shared = Arc::new(PeerShared {
            group: conduit.group().to_owned(),
            conduit,
            repliers: OnceLock::new(),
            hook: OnceLock::new(),
            pending: PendingQueries::new(),
        });

        // Subscribe before returning so nothing posted afterwards is missed.
        let inbound = shared.conduit.subscribe();
        debug!(group = %shared.group, timeout = ?options.timeout, "broadcast strategy joined group");

        let strategy = Self {
            shared,
            options,
            cancel: CancellationToken::new(),
            idle: Mutex::new(Some(inbound)),
        };
        if strategy.listen().is_err() {
            debug!(group = %strategy.shared.group, "no runtime yet; listener deferred");
        }
        strategy
    }

    /// Factory giving the hub and every sub-channel a group of its own.
    pub fn factory<O: ConduitOpener>(opener: O, group: impl Into<String>, options: BroadcastOptions) -> BroadcastFactory<O> {
        BroadcastFactory {
            opener,
            group: group.into(),
            options,
        }
    }

    pub fn group(&self) -> &str {
        &self.shared.group
    }

    /// Queries still waiting for a response.
    pub fn pending_queries(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the listener task has been started.
    pub fn is_listening(&self) -> bool {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Spawns the listener if it is not running yet.
    fn listen(&self) -> Result<(), TramError> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.is_none() {
            return Ok(());
        }
        let handle = Handle::try_current().map_err(|_| TramError::NoRuntime)?;
        if let Some(inbound) = idle.take() {
            handle.spawn(listen(Arc::clone(&self.shared), inbound, self.cancel.clone()));
            trace!(group = %self.shared.group, "listener started");
        }
        Ok(())
    }
}

impl Drop for BroadcastStrategy {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BroadcastStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastStrategy")
            .field("group", &self.shared.group)
            .field("options", &self.options)
            .field("pending", &self.shared.pending.len())
            .finish()
    }
}

impl NotifyStrategy for BroadcastStrategy {
    fn init(&mut self, repliers: Repliers) {
        if self.shared.repliers.set(repliers).is_err() {
            warn!(group = %self.shared.group, "strategy initialised twice; keeping the first replier table");
        }
    }

    fn on_notify_subscribers(&mut self, hook: DispatchHook) {
        if self.shared.hook.set(hook).is_err() {
            warn!(group = %self.shared.group, "dispatch hook set twice; keeping the first");
        }
    }

    fn notify_subscribers(&self, publication: Publication) -> Result<(), TramError> {
        // Posting needs no runtime; the listener only matters for inbound traffic.
        let _ = self.listen();
        let text = Envelope::Publication(publication).encode()?;
        self.shared.conduit.post(text)
    }

    fn query(&self, query: &str, params: Vec<Value>) -> Result<Option<Reply>, TramError> {
        self.listen()?;
        let token = Uuid::new_v4().to_string();
        let response = self.shared.pending.track(query, &token);
        let guard = Forget {
            shared: Arc::clone(&self.shared),
            token: token.clone(),
        };

        let text = Envelope::Request(QueryRequest {
            query: query.to_owned(),
            params,
            id: Some(token),
        })
        .encode()?;
        self.shared.conduit.post(text)?;
        trace!(group = %self.shared.group, query, "query posted");

        let timeout = self.options.timeout;
        let deadline = Instant::now() + timeout;
        let query = query.to_owned();
        let group = self.shared.group.clone();

        Ok(Some(Reply::deferred(async move {
            let _guard = guard;
            match tokio::time::timeout_at(deadline, response).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(TramError::ConduitClosed { group }),
                Err(_) => Err(TramError::QueryTimeout { query, timeout }),
            }
        })))
    }

    fn activate(&self) -> Result<(), TramError> {
        self.listen()
    }
}

/// Removes a pending query when its reply is dropped or finished.
struct Forget {
    shared: Arc<PeerShared>,
    token: String,
}

impl Drop for Forget {
    fn drop(&mut self) {
        self.shared.pending.cancel(&self.token);
    }
}

async fn listen(shared: Arc<PeerShared>, mut inbound: BoxStream<'static, String>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.next() => match message {
                Some(text) => shared.receive(&text),
                None => break,
            },
        }
    }
    debug!(group = %shared.group, "broadcast listener stopped");
}

impl PeerShared {
    fn receive(self: &Arc<Self>, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(group = %self.group, error = %err, "dropping malformed peer message");
                return;
            }
        };

        match envelope {
            Envelope::Publication(publication) => self.deliver(publication),
            Envelope::Request(request) => self.answer(request),
            Envelope::Response(response) => {
                let QueryResponse {
                    query_response,
                    payload,
                    id,
                } = response;
                if !self.pending.complete(&query_response, id.as_deref(), payload) {
                    trace!(group = %self.group, query = %query_response, "response for another peer");
                }
            }
        }
    }

    fn deliver(&self, publication: Publication) {
        let Some(hook) = self.hook.get() else {
            return;
        };
        let event = publication.event.clone();
        if let Err(err) = hook(publication) {
            error!(group = %self.group, event = %event, error = %err, "peer publication failed");
        }
    }

    fn answer(self: &Arc<Self>, request: QueryRequest) {
        let QueryRequest { query, params, id } = request;
        let Some(replier) = self.repliers.get().and_then(|r| r.get(&query)) else {
            return;
        };

        match replier.invoke(&query, params) {
            Ok(Reply::Ready(payload)) => self.respond(query, payload, id),
            Ok(Reply::Deferred(future)) => {
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(Ok(payload)) => shared.respond(query, payload, id),
                        Ok(Err(err)) => {
                            error!(group = %shared.group, query = %query, error = %err, "async replier failed");
                        }
                        Err(panic) => {
                            error!(group = %shared.group, query = %query, panic = %panic_message(panic.as_ref()), "async replier panicked");
                        }
                    }
                });
            }
            Err(err) => error!(group = %self.group, query = %query, error = %err, "replier failed"),
        }
    }

    fn respond(&self, query: String, payload: Value, id: Option<String>) {
        let envelope = Envelope::Response(QueryResponse {
            query_response: query,
            payload,
            id,
        });
        if let Err(err) = envelope.encode().and_then(|text| self.conduit.post(text)) {
            warn!(group = %self.group, error = %err, "could not post query response");
        }
    }
}

/// [`StrategyFactory`] returned by [`BroadcastStrategy::factory`].
#[derive(Debug, Clone)]
pub struct BroadcastFactory<O> {
    opener: O,
    group: String,
    options: BroadcastOptions,
}

impl<O: ConduitOpener> BroadcastFactory<O> {
    fn join(&self, group: &str) -> Box<dyn NotifyStrategy> {
        Box::new(BroadcastStrategy::new(self.opener.open(group), self.options.clone()))
    }
}

impl<O: ConduitOpener> StrategyFactory for BroadcastFactory<O> {
    fn build(&self, channel: &str) -> Box<dyn NotifyStrategy> {
        self.join(&format!("{}/channel/{}", self.group, channel))
    }

    fn build_hub(&self) -> Box<dyn NotifyStrategy> {
        self.join(&format!("{}/hub", self.group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Replier;
    use serde_json::json;

    fn strategy(net: &MemoryNetwork, timeout_ms: u64) -> BroadcastStrategy {
        let options = BroadcastOptions::default().with_timeout(Duration::from_millis(timeout_ms));
        BroadcastStrategy::new(net.open("g"), options)
    }

    #[test]
    fn default_timeout_is_five_seconds() {
        assert_eq!(BroadcastOptions::default().timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unanswered_query_times_out_and_is_forgotten() {
        let net = MemoryNetwork::new();
        let lonely = strategy(&net, 30);

        let reply = lonely.query("q:none", Vec::new()).unwrap().unwrap();
        assert_eq!(lonely.pending_queries(), 1);

        let err = reply.await.unwrap_err();
        assert_eq!(err.as_label(), "query_timeout");
        assert_eq!(lonely.pending_queries(), 0);
    }

    #[tokio::test]
    async fn dropped_reply_is_forgotten() {
        let net = MemoryNetwork::new();
        let lonely = strategy(&net, 1000);
        let reply = lonely.query("q", Vec::new()).unwrap();
        assert_eq!(lonely.pending_queries(), 1);
        drop(reply);
        assert_eq!(lonely.pending_queries(), 0);
    }

    #[tokio::test]
    async fn peers_answer_each_others_queries() {
        let net = MemoryNetwork::new();
        let mut asker = strategy(&net, 1000);
        let mut answerer = strategy(&net, 1000);

        asker.init(Repliers::new());
        let repliers = Repliers::new();
        repliers.insert(
            "q:sum",
            Replier::new(|params| {
                let sum: i64 = params.iter().filter_map(Value::as_i64).sum();
                Ok(Reply::Ready(json!(sum)))
            }),
        );
        answerer.init(repliers);

        let reply = asker.query("q:sum", vec![json!(2), json!(3)]).unwrap().unwrap();
        assert_eq!(reply.await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn factory_scopes_groups_per_channel() {
        let net = MemoryNetwork::new();
        let factory = BroadcastStrategy::factory(net.clone(), "app", BroadcastOptions::default());
        let _hub = factory.build_hub();
        let _named_like_hub = factory.build(crate::HUB_NAME);
        let _users = factory.build("users");
        assert_eq!(
            net.groups(),
            vec![
                "app/channel/eventTram".to_string(),
                "app/channel/users".to_string(),
                "app/hub".to_string(),
            ]
        );
    }

    #[test]
    fn listener_waits_for_a_runtime() {
        let net = MemoryNetwork::new();
        let strategy = BroadcastStrategy::new(net.open("g"), BroadcastOptions::default());
        assert!(!strategy.is_listening());
        assert_eq!(strategy.activate().unwrap_err().as_label(), "no_runtime");
        assert_eq!(
            strategy.query("q", Vec::new()).unwrap_err().as_label(),
            "no_runtime"
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            strategy.activate().unwrap();
            assert!(strategy.is_listening());
        });
    }
}
