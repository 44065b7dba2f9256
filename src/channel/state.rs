//! # Subscriber table and dispatch.
//!
//! [`ChannelState`] is what the notify strategy's dispatch hook points at. It
//! owns the per-event subscriber lists and performs delivery:
//!
//! ```text
//! hook(Publication{sync: true})  ──► snapshot ──► s1() ──► s2() ──► ... (caller's stack)
//! hook(Publication{sync: false}) ──► snapshot ──► defer(s1), defer(s2), ... ──► Scheduler
//! ```
//!
//! ## Rules
//! - Delivery iterates a snapshot: subscribers added or removed during a
//!   dispatch do not change who receives it.
//! - Subscribers run in registration order.
//! - A failing subscriber never stops the others, unless `throw_immediately`
//!   is on: then the sync path returns the first error to the publisher and the
//!   deferred path skips the remaining steps of that publication.
//! - Errors with no caller are reported on a later scheduler tick, to the
//!   fault bus and the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, error, trace};

use crate::channel::handler::{Handler, HandlerId, Subscriber};
use crate::config::TramConfig;
use crate::error::TramError;
use crate::faults::{Fault, FaultBus};
use crate::scheduler::Scheduler;
use crate::strategies::Publication;

/// Services shared by every channel of one hub.
pub(crate) struct Context {
    pub(crate) config: TramConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) faults: FaultBus,
}

impl Context {
    pub(crate) fn new(config: TramConfig) -> Arc<Self> {
        let faults = FaultBus::new(config.fault_capacity);
        Arc::new(Self {
            config,
            scheduler: Scheduler::new(),
            faults,
        })
    }
}

pub(crate) struct ChannelState {
    name: Arc<str>,
    context: Arc<Context>,
    subscribers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl ChannelState {
    pub(crate) fn new(name: &str, context: Arc<Context>) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            context,
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub(crate) fn add(&self, event: &str, handler: Handler) {
        trace!(channel = %self.name, event, subscriber = handler.name(), "subscribe");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_owned())
            .or_default()
            .push(handler);
    }

    /// Removes every registration of `id` under `event`.
    pub(crate) fn remove(&self, event: &str, id: HandlerId) {
        let mut table = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = table.get_mut(event) {
            list.retain(|h| h.id() != id);
            if list.is_empty() {
                table.remove(event);
            }
        }
    }

    pub(crate) fn remove_event(&self, event: &str) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event);
    }

    /// Removes `id` from every event.
    pub(crate) fn remove_everywhere(&self, id: HandlerId) {
        let mut table = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        table.retain(|_, list| {
            list.retain(|h| h.id() != id);
            !list.is_empty()
        });
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        events.sort();
        events
    }

    fn snapshot(&self, event: &str) -> Vec<Handler> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers a publication to the current subscribers of its event.
    pub(crate) fn dispatch(self: &Arc<Self>, publication: Publication) -> Result<(), TramError> {
        let Publication { event, payload, sync } = publication;
        let subscribers = self.snapshot(&event);
        if subscribers.is_empty() {
            trace!(channel = %self.name, event = %event, "no subscribers");
            return Ok(());
        }

        let throw = self.context.config.throw_immediately;

        if sync {
            for handler in &subscribers {
                if let Err(err) = handler.invoke(&self.name, &event, &payload) {
                    if throw {
                        return Err(err);
                    }
                    self.report_later(err);
                }
            }
            return Ok(());
        }

        let event: Arc<str> = Arc::from(event);
        let payload = Arc::new(payload);
        let aborted = Arc::new(AtomicBool::new(false));

        for handler in subscribers {
            let state = Arc::clone(self);
            let event = Arc::clone(&event);
            let payload = Arc::clone(&payload);
            let aborted = Arc::clone(&aborted);

            self.context.scheduler.defer(move || {
                if aborted.load(Ordering::Acquire) {
                    return;
                }
                if let Err(err) = handler.invoke(&state.name, &event, &payload) {
                    if throw {
                        aborted.store(true, Ordering::Release);
                        state.emit(Fault::from_error(err));
                    } else {
                        state.report_later(err);
                    }
                }
            })?;
        }
        Ok(())
    }

    /// Reports `err` on a later scheduler tick (or now, if nothing can be scheduled).
    fn report_later(self: &Arc<Self>, err: TramError) {
        let fault = Fault::from_error(err);
        let state = Arc::clone(self);
        let later = fault.clone();
        if self.context.scheduler.defer(move || state.emit(later)).is_err() {
            self.emit(fault);
        }
    }

    fn emit(&self, fault: Fault) {
        error!(
            channel = %self.name,
            event = fault.event.as_deref().unwrap_or_default(),
            subscriber = fault.subscriber.as_deref().unwrap_or_default(),
            label = fault.error.as_label(),
            error = %fault.error,
            "uncaught subscriber error"
        );
        self.context.faults.report(fault);
    }
}

/// Wrapper that delivers at most once, then unregisters itself.
pub(crate) struct OnceSubscriber {
    id: HandlerId,
    event: String,
    fired: AtomicBool,
    inner: Handler,
    state: Weak<ChannelState>,
}

impl OnceSubscriber {
    pub(crate) fn handler(state: &Arc<ChannelState>, event: &str, inner: Handler) -> Handler {
        let id = HandlerId::next();
        let wrapper = Self {
            id,
            event: event.to_owned(),
            fired: AtomicBool::new(false),
            inner,
            state: Arc::downgrade(state),
        };
        Handler::with_id(id, Arc::new(wrapper))
    }
}

impl Subscriber for OnceSubscriber {
    fn on_event(&self, payload: &Value) -> anyhow::Result<()> {
        // A snapshot taken before removal may still hold the wrapper.
        if self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(state) = self.state.upgrade() {
            state.remove(&self.event, self.id);
            debug!(channel = %state.name, event = %self.event, "once subscriber consumed");
        }
        self.inner.subscriber().on_event(payload)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
