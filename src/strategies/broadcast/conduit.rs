//! # Conduits: the transport under [`BroadcastStrategy`](super::BroadcastStrategy).
//!
//! A [`Conduit`] posts text messages to every *other* member of its group and
//! yields the messages they post. [`MemoryNetwork`] implements it in-process
//! over [`tokio::sync::broadcast`], one ring buffer per group.
//!
//! ```text
//! MemoryNetwork
//!   └─ group "app/eventTram" ──► broadcast::Sender<Frame>
//!         ├─ MemoryPort #1  (post: tag frame with #1; subscribe: skip frames from #1)
//!         └─ MemoryPort #2
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::error::TramError;

/// Message transport between peers of one group.
pub trait Conduit: Send + Sync + 'static {
    /// Group this conduit belongs to.
    fn group(&self) -> &str;

    /// Sends `message` to every other member of the group.
    fn post(&self, message: String) -> Result<(), TramError>;

    /// Messages posted by other members from now on.
    fn subscribe(&self) -> BoxStream<'static, String>;
}

/// Opens conduits by group name.
pub trait ConduitOpener: Send + Sync + 'static {
    fn open(&self, group: &str) -> Arc<dyn Conduit>;
}

static PORT_SEQ: AtomicU64 = AtomicU64::new(1);

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
struct Frame {
    from: u64,
    body: Arc<str>,
}

/// In-process network of broadcast groups.
///
/// Cheap to clone; clones share the groups. Give the same network to every
/// hub that should act as a peer.
#[derive(Clone)]
pub struct MemoryNetwork {
    groups: Arc<Mutex<HashMap<String, broadcast::Sender<Frame>>>>,
    capacity: usize,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a network whose groups buffer up to `capacity` messages per slow reader.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Joins `group` with a new port.
    pub fn port(&self, group: &str) -> MemoryPort {
        let tx = {
            let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
            groups
                .entry(group.to_owned())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .clone()
        };
        MemoryPort {
            id: PORT_SEQ.fetch_add(1, Ordering::Relaxed),
            group: group.to_owned(),
            tx,
        }
    }

    /// Names of the groups opened so far, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("groups", &self.groups())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ConduitOpener for MemoryNetwork {
    fn open(&self, group: &str) -> Arc<dyn Conduit> {
        Arc::new(self.port(group))
    }
}

/// One member of a [`MemoryNetwork`] group.
#[derive(Debug)]
pub struct MemoryPort {
    id: u64,
    group: String,
    tx: broadcast::Sender<Frame>,
}

impl Conduit for MemoryPort {
    fn group(&self) -> &str {
        &self.group
    }

    fn post(&self, message: String) -> Result<(), TramError> {
        trace!(group = %self.group, port = self.id, "post");
        // No subscribers means no peers: the message is simply dropped.
        let _ = self.tx.send(Frame {
            from: self.id,
            body: Arc::from(message),
        });
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, String> {
        let me = self.id;
        let group = self.group.clone();
        let rx = self.tx.subscribe();

        futures::stream::unfold(rx, move |mut rx| {
            let group = group.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(frame) if frame.from == me => continue,
                        Ok(frame) => return Some((frame.body.to_string(), rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(group = %group, skipped, "peer messages dropped: reader lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ports_do_not_hear_themselves() {
        let net = MemoryNetwork::new();
        let a = net.port("g");
        let b = net.port("g");

        let mut a_in = a.subscribe();
        let mut b_in = b.subscribe();

        a.post("from a".into()).unwrap();
        b.post("from b".into()).unwrap();

        assert_eq!(b_in.next().await.as_deref(), Some("from a"));
        assert_eq!(a_in.next().await.as_deref(), Some("from b"));

        let silent = tokio::time::timeout(Duration::from_millis(20), a_in.next()).await;
        assert!(silent.is_err());
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let net = MemoryNetwork::new();
        let a = net.port("one");
        let b = net.port("two");
        let mut b_in = b.subscribe();

        a.post("hello".into()).unwrap();
        let heard = tokio::time::timeout(Duration::from_millis(20), b_in.next()).await;
        assert!(heard.is_err());
        assert_eq!(net.groups(), vec!["one".to_string(), "two".to_string()]);
    }
}
