//! # Query answers.
//!
//! A replier answers a query with a [`Reply`]: either a value that is ready
//! now, or a future that resolves later. Callers can await any reply
//! (`reply.await`), or use [`Reply::try_ready`] to get a ready value without
//! an executor.
//!
//! [`Repliers`] is the per-channel table from query name to [`Replier`]. The
//! channel owns it and hands a clone to its notify strategy in `init`. Lookups
//! happen when a query arrives, so repliers registered later are still found.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::channel::handler::panic_message;
use crate::error::TramError;

/// Answer to a query.
pub enum Reply<T = Value> {
    /// Value available immediately.
    Ready(T),
    /// Value produced later (async replier, peer round-trip).
    Deferred(BoxFuture<'static, Result<T, TramError>>),
}

impl<T> Reply<T> {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Reply::Ready(_))
    }

    /// Returns the value if it is ready, or the reply itself otherwise.
    pub fn try_ready(self) -> Result<T, Self> {
        match self {
            Reply::Ready(value) => Ok(value),
            deferred => Err(deferred),
        }
    }
}

impl<T: Send + 'static> Reply<T> {
    /// Wraps a future as a deferred reply.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, TramError>> + Send + 'static,
    {
        Reply::Deferred(Box::pin(future))
    }

    /// Waits for the value.
    pub async fn resolve(self) -> Result<T, TramError> {
        self.await
    }

    /// Converts the value with `map`, now for ready replies and on resolution otherwise.
    pub(crate) fn and_then<U, M>(self, map: M) -> Result<Reply<U>, TramError>
    where
        U: Send + 'static,
        M: FnOnce(T) -> Result<U, TramError> + Send + 'static,
    {
        match self {
            Reply::Ready(value) => map(value).map(Reply::Ready),
            Reply::Deferred(future) => Ok(Reply::deferred(async move { map(future.await?) })),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Reply<T> {
    type Output = Result<T, TramError>;
    type IntoFuture = BoxFuture<'static, Result<T, TramError>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Reply::Ready(value) => Box::pin(futures::future::ready(Ok(value))),
            Reply::Deferred(future) => future,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Reply::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

type ReplyFn = dyn Fn(Vec<Value>) -> anyhow::Result<Reply> + Send + Sync;

/// A registered query answerer over raw JSON params.
#[derive(Clone)]
pub struct Replier {
    f: Arc<ReplyFn>,
}

impl Replier {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Calls the replier; returned errors and panics become [`TramError::Replier`].
    pub fn invoke(&self, query: &str, params: Vec<Value>) -> Result<Reply, TramError> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| (self.f)(params))) {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(TramError::replier(query, err)),
            Err(panic) => Err(TramError::replier(query, panic_message(panic.as_ref()))),
        }
    }
}

impl std::fmt::Debug for Replier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Replier(..)")
    }
}

/// Shared table of repliers, keyed by query name. At most one per name.
#[derive(Clone, Default)]
pub struct Repliers {
    table: Arc<RwLock<HashMap<String, Replier>>>,
}

impl Repliers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current replier for `query`, if any.
    pub fn get(&self, query: &str) -> Option<Replier> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .cloned()
    }

    pub fn contains(&self, query: &str) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(query)
    }

    /// Registered query names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs `replier` for `query`, returning the one it replaced.
    pub(crate) fn insert(&self, query: &str, replier: Replier) -> Option<Replier> {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.to_owned(), replier)
    }
}

impl std::fmt::Debug for Repliers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repliers").field("queries", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ready_replies_need_no_executor() {
        let reply: Reply<i64> = Reply::Ready(5);
        assert!(reply.is_ready());
        assert_eq!(reply.try_ready().unwrap(), 5);
    }

    #[tokio::test]
    async fn deferred_replies_resolve() {
        let reply: Reply<i64> = Reply::deferred(async { Ok(7) });
        assert!(!reply.is_ready());
        let reply = reply.try_ready().unwrap_err();
        assert_eq!(reply.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn and_then_maps_both_shapes() {
        let ready = Reply::Ready(json!(2)).and_then(|v| Ok(v.as_i64().unwrap_or(0) * 10)).unwrap();
        assert_eq!(ready.try_ready().unwrap(), 20);

        let later = Reply::deferred(async { Ok(json!(3)) })
            .and_then(|v| Ok(v.as_i64().unwrap_or(0) * 10))
            .unwrap();
        assert_eq!(later.resolve().await.unwrap(), 30);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let repliers = Repliers::new();
        assert!(repliers.insert("q", Replier::new(|_| Ok(Reply::Ready(json!(1))))).is_none());
        assert!(repliers.insert("q", Replier::new(|_| Ok(Reply::Ready(json!(2))))).is_some());
        assert_eq!(repliers.len(), 1);

        let reply = repliers.get("q").unwrap().invoke("q", Vec::new()).unwrap();
        assert_eq!(reply.try_ready().unwrap(), json!(2));
    }

    #[test]
    fn replier_panics_are_caught() {
        let replier = Replier::new(|_| -> anyhow::Result<Reply> { panic!("no answer") });
        let err = replier.invoke("q:boom", Vec::new()).unwrap_err();
        assert_eq!(err.as_label(), "replier_failed");
        assert!(err.to_string().contains("no answer"));
    }
}
