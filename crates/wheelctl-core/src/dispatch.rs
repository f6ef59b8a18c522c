//! Action dispatch off the decode path.
//!
//! Simple actions are queued to a single "actions" worker thread and run in
//! order. A repeating action started by a hold gets its own thread, which
//! fires once immediately and then once per repeat interval until its
//! [`RepeatHandle`] is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};
use wheelctl_metrics::metric_defs;

use crate::actions::{ActionCatalog, ActionInvocation, ActionMode, ActionSink, Trigger};

// ============================================================================
// Repeat Handle
// ============================================================================

/// Ownership of one running hold-repeat loop. Dropping it stops the loop.
///
/// The loop notices immediately if it is waiting for the next interval, or
/// after the current firing if the sink is busy.
#[derive(Debug)]
pub struct RepeatHandle {
    action: String,
    active: Arc<AtomicBool>,
    /// Dropping the sender wakes the repeat thread.
    _stop_tx: Sender<()>,
}

impl RepeatHandle {
    pub(crate) fn new(action: String, active: Arc<AtomicBool>, stop_tx: Sender<()>) -> Self {
        RepeatHandle {
            action,
            active,
            _stop_tx: stop_tx,
        }
    }

    /// Name of the repeating action.
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the loop.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for RepeatHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        debug!("ActionDispatcher: repeat of '{}' cancelled", self.action);
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs resolved actions through an [`ActionSink`].
pub struct ActionDispatcher {
    catalog: ActionCatalog,
    sink: Arc<dyn ActionSink>,
    repeat_interval: Duration,
    queue: Option<Sender<ActionInvocation>>,
    worker: Option<JoinHandle<()>>,
}

impl ActionDispatcher {
    /// Create a dispatcher and start its action worker thread.
    pub fn new(sink: Arc<dyn ActionSink>, catalog: ActionCatalog, repeat_interval: Duration) -> Self {
        let (queue, rx) = crossbeam_channel::unbounded();
        let worker_sink = Arc::clone(&sink);
        let worker = thread::Builder::new()
            .name("actions".to_string())
            .spawn(move || action_worker_main(rx, worker_sink))
            .expect("Failed to spawn action worker thread");

        ActionDispatcher {
            catalog,
            sink,
            repeat_interval,
            queue: Some(queue),
            worker: Some(worker),
        }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn repeat_interval(&self) -> Duration {
        self.repeat_interval
    }

    fn lookup(&self, invocation: &ActionInvocation) -> Option<ActionMode> {
        let mode = self.catalog.mode(&invocation.name);
        if mode.is_none() {
            warn!("ActionDispatcher: unknown action '{}', ignoring", invocation.name);
        }
        mode
    }

    /// Run an action once on the action worker. Returns `false` if the action
    /// is unknown or the worker has stopped.
    pub fn fire(&self, invocation: ActionInvocation) -> bool {
        if self.lookup(&invocation).is_none() {
            return false;
        }
        self.enqueue(invocation)
    }

    fn enqueue(&self, invocation: ActionInvocation) -> bool {
        match &self.queue {
            Some(queue) => {
                trace!("ActionDispatcher: queueing {}", invocation);
                if queue.send(invocation).is_err() {
                    warn!("ActionDispatcher: action worker has stopped");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Start the action for a hold.
    ///
    /// A repeating action gets its own thread and a [`RepeatHandle`]; a simple
    /// action fires once and `None` is returned, as for an unknown action.
    pub fn start_hold(&self, invocation: ActionInvocation) -> Option<RepeatHandle> {
        match self.lookup(&invocation)? {
            ActionMode::Simple => {
                self.enqueue(invocation);
                None
            }
            ActionMode::Repeating => Some(self.spawn_repeat(invocation)),
        }
    }

    fn spawn_repeat(&self, invocation: ActionInvocation) -> RepeatHandle {
        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let handle = RepeatHandle::new(invocation.name.clone(), Arc::clone(&active), stop_tx);
        let sink = Arc::clone(&self.sink);
        let interval = self.repeat_interval;

        debug!(
            "ActionDispatcher: starting repeat of '{}' every {:?}",
            invocation.name, interval
        );
        thread::Builder::new()
            .name(format!("repeat-{}", invocation.name))
            .spawn(move || repeat_worker_main(invocation, sink, active, stop_rx, interval))
            .expect("Failed to spawn repeat thread");

        handle
    }

    /// Stop accepting actions and wait for queued ones to finish.
    pub fn shutdown(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("ActionDispatcher: action worker panicked");
            }
        }
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("actions", &self.catalog.len())
            .field("repeat_interval", &self.repeat_interval)
            .field("running", &self.queue.is_some())
            .finish()
    }
}

fn perform(sink: &dyn ActionSink, invocation: &ActionInvocation) {
    debug!("ActionDispatcher: performing {}", invocation);
    metrics::counter!(
        metric_defs::ACTIONS_DISPATCHED.name,
        "action" => invocation.name.clone(),
        "trigger" => invocation.trigger.as_str()
    )
    .increment(1);

    if let Err(e) = sink.perform(invocation) {
        warn!("ActionDispatcher: action '{}' failed: {}", invocation.name, e);
        metrics::counter!(metric_defs::ACTION_FAILURES.name, "action" => invocation.name.clone())
            .increment(1);
    }
}

/// Runs queued simple actions until the dispatcher drops its sender.
fn action_worker_main(rx: Receiver<ActionInvocation>, sink: Arc<dyn ActionSink>) {
    for invocation in rx.iter() {
        perform(sink.as_ref(), &invocation);
    }
    debug!("ActionDispatcher: action worker exiting");
}

fn repeat_worker_main(
    invocation: ActionInvocation,
    sink: Arc<dyn ActionSink>,
    active: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    interval: Duration,
) {
    metrics::gauge!(metric_defs::ACTIVE_HOLDS.name).increment(1.0);

    let mut count: u32 = 0;
    while active.load(Ordering::Acquire) {
        let trigger = if count == 0 {
            Trigger::Hold
        } else {
            metrics::counter!(metric_defs::HOLD_REPEATS.name, "action" => invocation.name.clone())
                .increment(1);
            Trigger::Repeat(count)
        };
        perform(sink.as_ref(), &invocation.retriggered(trigger));
        count = count.saturating_add(1);

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    metrics::gauge!(metric_defs::ACTIVE_HOLDS.name).decrement(1.0);
    trace!(
        "ActionDispatcher: repeat of '{}' stopped after {} firings",
        invocation.name,
        count
    );
}
