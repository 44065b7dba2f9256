use serde_json::Value;

use super::{DispatchHook, NotifyStrategy, Publication, StrategyFactory, ask_local};
use crate::channel::{Repliers, Reply};
use crate::error::TramError;

/// Same-process delivery: publications go straight to the dispatch hook,
/// queries to the local replier table.
#[derive(Default)]
pub struct LocalStrategy {
    repliers: Option<Repliers>,
    hook: Option<DispatchHook>,
}

impl LocalStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotifyStrategy for LocalStrategy {
    fn init(&mut self, repliers: Repliers) {
        self.repliers = Some(repliers);
    }

    fn on_notify_subscribers(&mut self, hook: DispatchHook) {
        self.hook = Some(hook);
    }

    fn notify_subscribers(&self, publication: Publication) -> Result<(), TramError> {
        match &self.hook {
            Some(hook) => hook(publication),
            None => Ok(()),
        }
    }

    fn query(&self, query: &str, params: Vec<Value>) -> Result<Option<Reply>, TramError> {
        ask_local(self.repliers.as_ref(), query, params)
    }
}

impl std::fmt::Debug for LocalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStrategy")
            .field("repliers", &self.repliers)
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}

/// Factory producing a [`LocalStrategy`] for every channel. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFactory;

impl StrategyFactory for LocalFactory {
    fn build(&self, _channel: &str) -> Box<dyn NotifyStrategy> {
        Box::new(LocalStrategy::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Replier;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn publications_reach_the_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut strategy = LocalStrategy::new();
        strategy.on_notify_subscribers(Arc::new(move |p: Publication| {
            sink.lock().unwrap().push(p.event);
            Ok(())
        }));

        strategy
            .notify_subscribers(Publication::new("a:x", json!(1), true))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a:x".to_string()]);
    }

    #[test]
    fn queries_use_repliers_registered_after_init() {
        let repliers = Repliers::new();
        let mut strategy = LocalStrategy::new();
        strategy.init(repliers.clone());

        assert!(strategy.query("q", Vec::new()).unwrap().is_none());

        repliers.insert("q", Replier::new(|params| Ok(Reply::Ready(json!(params.len())))));
        let reply = strategy.query("q", vec![json!(1), json!(2)]).unwrap().unwrap();
        assert_eq!(reply.try_ready().unwrap(), json!(2));
    }
}
