//! Queries waiting for a peer's response.
//!
//! Each outstanding query holds a oneshot sender keyed by a correlation token.
//! A response carrying an `id` completes the waiter with that token; a response
//! without one completes the oldest waiter for the same query name.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

struct Waiting {
    token: String,
    query: String,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
pub(crate) struct PendingQueries {
    waiting: Mutex<Vec<Waiting>>,
}

impl PendingQueries {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&self, query: &str, token: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Waiting {
                token: token.to_owned(),
                query: query.to_owned(),
                tx,
            });
        rx
    }

    /// Hands `payload` to the matching waiter. Returns `false` if none matched.
    pub(crate) fn complete(&self, query: &str, token: Option<&str>, payload: Value) -> bool {
        let waiter = {
            let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
            let position = match token {
                Some(token) => waiting.iter().position(|w| w.token == token && w.query == query),
                None => waiting.iter().position(|w| w.query == query),
            };
            match position {
                Some(i) => waiting.remove(i),
                None => return false,
            }
        };
        waiter.tx.send(payload).is_ok()
    }

    pub(crate) fn cancel(&self, token: &str) {
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|w| w.token != token);
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_matching_wins_over_order() {
        let pending = PendingQueries::new();
        let mut first = pending.track("q", "t1");
        let mut second = pending.track("q", "t2");

        assert!(pending.complete("q", Some("t2"), json!(2)));
        assert_eq!(second.try_recv().unwrap(), json!(2));
        assert!(first.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn first_response_wins() {
        let pending = PendingQueries::new();
        let mut rx = pending.track("q", "t");

        assert!(pending.complete("q", Some("t"), json!("early")));
        assert!(!pending.complete("q", Some("t"), json!("late")));
        assert!(!pending.complete("q", None, json!("untagged")));
        assert_eq!(rx.try_recv().unwrap(), json!("early"));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn untagged_responses_go_to_the_oldest_waiter() {
        let pending = PendingQueries::new();
        let mut first = pending.track("q", "t1");
        let _second = pending.track("q", "t2");

        assert!(pending.complete("q", None, json!("x")));
        assert_eq!(first.try_recv().unwrap(), json!("x"));
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let pending = PendingQueries::new();
        let _rx = pending.track("q", "mine");
        assert!(!pending.complete("q", Some("someone-else"), json!(1)));
        assert!(!pending.complete("other", None, json!(1)));
        assert_eq!(pending.len(), 1);

        pending.cancel("mine");
        assert_eq!(pending.len(), 0);
    }
}
