//! Deferred callback scheduling.
//!
//! The session timer never talks to a runtime directly; it asks a
//! [`Scheduler`] to run a [`Task`] after a delay and keeps the returned
//! [`TaskHandle`] so the task can be cancelled. Cancellation is synchronous:
//! once `cancel` returns, the task will not run, even if its deadline has
//! already passed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::error::{Error, Result};

#[cfg(any(test, feature = "testing"))]
use kiosk_types::{Clock, ManualClock};
#[cfg(any(test, feature = "testing"))]
use std::collections::BTreeMap;

/// A deferred callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Schedule `task` to run once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Cancel a scheduled task. Unknown or already-run handles are ignored.
    fn cancel(&self, handle: TaskHandle);

    /// Number of tasks scheduled but not yet run or cancelled.
    fn pending(&self) -> usize;
}

// ─────────────────────────────────────────────────────────────────────────────
// TokioScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduler backed by `tokio::time::sleep`, one spawned task per schedule.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a scheduler on the runtime of the calling context.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::NoRuntime(e.to_string()))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Held across spawn so the task cannot look itself up before it is registered.
        let mut registry = self.tasks.lock();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // A task cancelled after its sleep completed is no longer registered.
            let live = tasks.lock().remove(&id).is_some();
            if live {
                task();
            }
        });
        registry.insert(id, join.abort_handle());

        trace!(task_id = id, delay_ms = delay.as_millis() as u64, "Task scheduled");
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some(abort) = self.tasks.lock().remove(&handle.0) {
            abort.abort();
            trace!(task_id = handle.0, "Task cancelled");
        }
    }

    fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ManualScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Virtual-time scheduler for tests.
///
/// Tasks run only when the test calls [`advance`](ManualScheduler::advance)
/// or [`run_due`](ManualScheduler::run_due). Moving the shared
/// [`ManualClock`] directly, without either call, models a suspended
/// background tab whose timers have not fired.
#[cfg(any(test, feature = "testing"))]
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    state: Mutex<ManualState>,
}

#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
struct ManualState {
    next_id: u64,
    queue: BTreeMap<(u64, u64), Task>,
    deadlines: HashMap<u64, u64>,
}

#[cfg(any(test, feature = "testing"))]
impl ManualScheduler {
    /// Create a scheduler reading deadlines from `clock`.
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward by `ms`, running every task that falls due on the
    /// way in deadline order. The clock reads each task's deadline while it runs.
    pub fn advance(&self, ms: u64) {
        let target = self.clock.now_millis() + ms;
        while let Some((deadline, task)) = self.pop_due(target) {
            self.clock.set(deadline);
            task();
        }
        self.clock.set(target);
    }

    /// Run tasks whose deadline has already passed, without moving the clock.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now_millis();
        let mut ran = 0;
        while let Some((_, task)) = self.pop_due(now) {
            task();
            ran += 1;
        }
        ran
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.state.lock().queue.keys().next().map(|(d, _)| *d)
    }

    fn pop_due(&self, limit: u64) -> Option<(u64, Task)> {
        let mut state = self.state.lock();
        let key = *state.queue.keys().next()?;
        if key.0 > limit {
            return None;
        }
        let task = state.queue.remove(&key)?;
        state.deadlines.remove(&key.1);
        Some((key.0, task))
    }
}

#[cfg(any(test, feature = "testing"))]
impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let deadline = self.clock.now_millis() + delay.as_millis() as u64;
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut state = self.state.lock();
        if let Some(deadline) = state.deadlines.remove(&handle.0) {
            state.queue.remove(&(deadline, handle.0));
        }
    }

    fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

#[cfg(any(test, feature = "testing"))]
impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.clock.now_millis())
            .field("pending", &self.pending())
            .finish()
    }
}
