//! # Mutation Scheduler
//!
//! Serializes every write to the store into one ordered stream of state
//! transitions.
//!
//! Transforms are queued on a bounded `mpsc` channel and drained by exactly
//! one dedicated worker thread. For each transform the worker:
//!
//! 1. takes a private copy of the previous state,
//! 2. applies the transform,
//! 3. rebuilds the id index,
//! 4. dispatches listeners,
//! 5. installs the new state for readers,
//! 6. resolves the submitter's [`Handle`].
//!
//! Readers load the installed snapshot through `ArcSwap` and never block on
//! the worker.

use crate::primitives::WORKER_THREAD_NAME;
use crate::{State, StoreError};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::any::Any;
use std::future::{Future, IntoFuture};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};

/// A pure state transition.
pub type Transform = Box<dyn FnOnce(State) -> State + Send + 'static>;

/// Messages sent from the scheduler to the worker loop.
enum Command {
    /// Apply a transform and signal completion on `reply`.
    Apply {
        transform: Transform,
        reply: oneshot::Sender<()>,
    },
    /// Stop the worker after the commands queued before this one.
    Shutdown,
}

/// Render a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Completion handle for a submitted transform.
///
/// Resolves once the worker has applied the transform and run every listener
/// it triggered. Rejected mutations still resolve. Dropping the handle is
/// fine; the transform runs regardless.
#[derive(Debug)]
#[must_use = "dropping a Handle does not cancel the mutation, but you may want to wait on it"]
pub struct Handle {
    rx: oneshot::Receiver<()>,
    worker: ThreadId,
}

impl Handle {
    /// Block the calling thread until the transform has been applied.
    ///
    /// # Errors
    ///
    /// * [`StoreError::WorkerGone`] -- the worker stopped before applying it.
    /// * [`StoreError::ReentrantWait`] -- called from inside a listener (on
    ///   the worker thread), where waiting would deadlock.
    pub fn wait(self) -> Result<(), StoreError> {
        if thread::current().id() == self.worker {
            tracing::error!("waited on a mutation from inside the mutation worker");
            return Err(StoreError::ReentrantWait);
        }
        self.rx.blocking_recv().map_err(|_| StoreError::WorkerGone)
    }
}

impl IntoFuture for Handle {
    type Output = Result<(), StoreError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.rx.await.map_err(|_| StoreError::WorkerGone) })
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Owner of the mutation queue, the worker thread and the current snapshot.
pub(crate) struct Scheduler {
    sender: mpsc::Sender<Command>,
    current: Arc<ArcSwap<State>>,
    worker_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the worker with an empty state.
    pub(crate) fn start(capacity: usize) -> Result<Self, StoreError> {
        let (sender, rx) = mpsc::channel::<Command>(capacity);
        let current = Arc::new(ArcSwap::from_pointee(State::new()));
        let worker_state = Arc::clone(&current);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(rx, worker_state))
            .map_err(|e| StoreError::Io(format!("failed to spawn mutation worker: {e}")))?;

        tracing::debug!(capacity, "mutation worker started");

        Ok(Self {
            sender,
            current,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The last fully-applied state.
    pub(crate) fn snapshot(&self) -> Arc<State> {
        self.current.load_full()
    }

    /// Check whether the calling thread is the worker.
    pub(crate) fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Queue a transform, blocking while the queue is full.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`submit_async`](Self::submit_async) there.
    pub(crate) fn submit(&self, transform: Transform) -> Handle {
        let (reply, rx) = oneshot::channel();
        let command = Command::Apply { transform, reply };

        if self.on_worker() {
            self.submit_from_worker(command);
        } else if self.sender.blocking_send(command).is_err() {
            tracing::warn!("mutation submitted after the worker stopped; dropped");
        }

        Handle {
            rx,
            worker: self.worker_id,
        }
    }

    /// Queue a transform, awaiting queue capacity.
    pub(crate) async fn submit_async(&self, transform: Transform) -> Handle {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(Command::Apply { transform, reply })
            .await
            .is_err()
        {
            tracing::warn!("mutation submitted after the worker stopped; dropped");
        }
        Handle {
            rx,
            worker: self.worker_id,
        }
    }

    /// Listeners that write back into the store run on the worker thread,
    /// which cannot block on its own full queue.
    fn submit_from_worker(&self, command: Command) {
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                tracing::debug!("queue full while submitting from the worker; handing off");
                let sender = self.sender.clone();
                let spawned = thread::Builder::new()
                    .name(format!("{WORKER_THREAD_NAME}-handoff"))
                    .spawn(move || {
                        if sender.blocking_send(command).is_err() {
                            tracing::warn!("mutation submitted after the worker stopped; dropped");
                        }
                    });
                if let Err(e) = spawned {
                    tracing::error!(error = %e, "failed to hand off mutation; dropped");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("mutation submitted after the worker stopped; dropped");
            }
        }
    }

    /// Stop the worker after everything already queued has been applied.
    ///
    /// Idempotent. Called from the worker itself it only signals the stop.
    pub(crate) fn shutdown(&self) {
        if self.on_worker() {
            self.signal_shutdown();
            return;
        }

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        // A closed channel means the worker is already gone.
        let _ = self.sender.blocking_send(Command::Shutdown);
        if worker.join().is_err() {
            tracing::error!("mutation worker exited with a panic");
        }
        tracing::debug!("mutation worker stopped");
    }

    /// Ask the worker to stop without blocking.
    ///
    /// With a full queue the request is not delivered; the worker still
    /// exits once every sender is dropped.
    fn signal_shutdown(&self) {
        match self.sender.try_send(Command::Shutdown) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("mutation queue full; shutdown request not delivered");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.signal_shutdown();
        }
    }
}

// =============================================================================
// WORKER
// =============================================================================

/// The worker loop. Runs until shutdown or until every sender is dropped.
fn run_worker(mut rx: mpsc::Receiver<Command>, current: Arc<ArcSwap<State>>) {
    let mut applied: u64 = 0;
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Apply { transform, reply } => {
                let _span = tracing::debug_span!("mutation", seq = applied).entered();
                apply(&current, transform);
                applied = applied.saturating_add(1);
                // The submitter may have dropped its handle.
                let _ = reply.send(());
            }
            Command::Shutdown => break,
        }
    }
    tracing::debug!(applied, "mutation worker loop exited");
}

/// Apply one transform and install the result.
///
/// A panicking transform or a result with duplicate ids is rejected and the
/// previous state stays installed.
fn apply(current: &ArcSwap<State>, transform: Transform) {
    let previous = current.load_full();
    let working = State::clone(&previous);

    let mut next = match catch_unwind(AssertUnwindSafe(move || transform(working))) {
        Ok(next) => next,
        Err(panic) => {
            tracing::error!(
                reason = %panic_message(panic.as_ref()),
                "transform panicked; mutation rejected"
            );
            return;
        }
    };

    if let Err(e) = next.reindex() {
        tracing::error!(error = %e, "index rebuild failed; mutation rejected");
        return;
    }

    let fired = next.dispatch_listeners();
    tracing::debug!(records = next.len(), fired, "mutation applied");

    current.store(Arc::new(next));
}

// =============================================================================
// TESTS
// =============================================================================
