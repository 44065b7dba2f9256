//! # Deferred dispatch scheduler.
//!
//! Deferred publications do not run their subscribers on the publisher's stack.
//! Each subscriber invocation becomes a *step* pushed onto a FIFO queue that a
//! single worker task drains on the current Tokio runtime.
//!
//! ## Architecture
//! ```text
//! publish(e) ──► defer(step s1) ──┐
//!            ──► defer(step s2) ──┼──► [unbounded queue] ──► worker ──► s1(), yield, s2(), yield, ...
//! flush()    ──► barrier ─────────┘                                 └─► barrier: notify flush()
//! ```
//!
//! ## Rules
//! - **FIFO**: steps run in the order they were deferred.
//! - **Yielding**: the worker yields to the runtime after every step, so
//!   subscribers never observe each other's synchronous effects mid-step.
//! - **Lazy**: the worker is spawned on first use; if it died with its runtime,
//!   the next use respawns it on the current runtime.
//! - **Detached**: the worker is a plain Tokio task and never keeps a runtime
//!   alive on its own.
//! - **Counted**: a step is pending until it runs or is dropped unrun (e.g. its
//!   runtime shut down), so `flush` never waits on work that is gone.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::TramError;

type Step = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Step(Queued),
    Barrier(oneshot::Sender<()>),
}

/// A deferred step, counted in `pending` until it is consumed.
struct Queued {
    step: Option<Step>,
    pending: Arc<AtomicUsize>,
}

impl Queued {
    fn new(step: Step, pending: &Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        Self {
            step: Some(step),
            pending: Arc::clone(pending),
        }
    }

    fn run(mut self) {
        if let Some(step) = self.step.take() {
            if std::panic::catch_unwind(AssertUnwindSafe(step)).is_err() {
                error!("deferred dispatch step panicked");
            }
        }
    }
}

impl Drop for Queued {
    fn drop(&mut self) {
        if self.step.is_some() {
            debug!("deferred dispatch step dropped before running");
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Inner {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    pending: Arc<AtomicUsize>,
}

/// Handle to a deferred-dispatch queue. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler. No task is spawned until the first step is deferred.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(None),
                pending: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Queues `step` to run on a later scheduler tick.
    ///
    /// Fails with [`TramError::NoRuntime`] when called outside a Tokio runtime
    /// and the worker is not running yet.
    pub fn defer<F>(&self, step: F) -> Result<(), TramError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Job::Step(Queued::new(Box::new(step), &self.inner.pending)))
    }

    /// Waits until every step queued so far, and every step those steps queued
    /// in turn, has run.
    pub async fn flush(&self) -> Result<(), TramError> {
        loop {
            let (done, wait) = oneshot::channel();
            self.send(Job::Barrier(done))?;
            wait.await.map_err(|_| TramError::SchedulerClosed)?;

            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
        }
    }

    /// Number of deferred steps that have not run yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    fn send(&self, job: Job) -> Result<(), TramError> {
        let mut slot = self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner);

        let job = match slot.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return Ok(()),
                // Worker is gone together with its runtime.
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let handle = tokio::runtime::Handle::try_current().map_err(|_| TramError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_worker(rx));
        tx.send(job).map_err(|_| TramError::SchedulerClosed)?;
        *slot = Some(tx);
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>) {
    debug!("dispatch worker started");

    while let Some(job) = rx.recv().await {
        match job {
            Job::Step(step) => {
                step.run();
                tokio::task::yield_now().await;
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn defer_outside_runtime_fails() {
        let scheduler = Scheduler::new();
        let err = scheduler.defer(|| {}).unwrap_err();
        assert!(matches!(err, TramError::NoRuntime));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn steps_run_in_fifo_order_after_flush() {
        let scheduler = Scheduler::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            scheduler
                .defer(move || seen.lock().unwrap().push(i))
                .unwrap();
        }
        assert!(seen.lock().unwrap().is_empty());

        scheduler.flush().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn flush_waits_for_steps_queued_by_steps() {
        let scheduler = Scheduler::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let inner_scheduler = scheduler.clone();
        let inner_seen = Arc::clone(&seen);
        scheduler
            .defer(move || {
                inner_seen.lock().unwrap().push("outer");
                let seen = Arc::clone(&inner_seen);
                inner_scheduler
                    .defer(move || seen.lock().unwrap().push("inner"))
                    .unwrap();
            })
            .unwrap();

        scheduler.flush().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn panicking_step_does_not_kill_worker() {
        let scheduler = Scheduler::new();
        let seen = Arc::new(StdMutex::new(0));

        scheduler.defer(|| panic!("step blew up")).unwrap();
        let counter = Arc::clone(&seen);
        scheduler.defer(move || *counter.lock().unwrap() += 1).unwrap();

        scheduler.flush().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn steps_lost_with_their_runtime_do_not_block_flush() {
        let scheduler = Scheduler::new();

        let first = runtime();
        first.block_on(async { scheduler.defer(|| {}).unwrap() });
        drop(first);
        assert_eq!(scheduler.pending(), 0);

        let second = runtime();
        second.block_on(async {
            tokio::time::timeout(Duration::from_millis(500), scheduler.flush())
                .await
                .expect("flush must not hang")
                .unwrap();

            let ran = Arc::new(StdMutex::new(false));
            let flag = Arc::clone(&ran);
            scheduler.defer(move || *flag.lock().unwrap() = true).unwrap();
            scheduler.flush().await.unwrap();
            assert!(*ran.lock().unwrap());
        });
    }
}
