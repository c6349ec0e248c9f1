//! Reconciling time spent with the tab hidden.
//!
//! Runtimes throttle or suspend timers in background tabs, so a hidden
//! period is never trusted to have been timed correctly. When the tab
//! becomes visible again the elapsed time is measured directly: at or past
//! the timeout the session expires on the spot; otherwise the return counts
//! as fresh activity and the timer restarts in full.

use std::sync::Arc;

use kiosk_types::Clock;
use parking_lot::Mutex;
use tracing::debug;

use crate::signals::{ListenerId, SignalHub, Visibility};
use crate::timer::SessionTimer;

/// What [`VisibilityReconciler::on_show`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// No hide was recorded, or no session is running.
    Ignored,
    /// Away for less than the timeout; the timer was reset.
    Resumed { away_ms: u64 },
    /// Away for at least the timeout; the session was expired immediately.
    Expired { away_ms: u64 },
}

#[derive(Debug)]
pub struct VisibilityReconciler {
    timer: SessionTimer,
    clock: Arc<dyn Clock>,
    hidden_at: Arc<Mutex<Option<u64>>>,
    listener: Mutex<Option<(Arc<SignalHub>, ListenerId)>>,
}

impl VisibilityReconciler {
    pub fn new(timer: SessionTimer, clock: Arc<dyn Clock>) -> Self {
        Self {
            timer,
            clock,
            hidden_at: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    /// Record when the tab was hidden.
    pub fn on_hide(&self) {
        record_hide(self.clock.as_ref(), &self.hidden_at);
    }

    /// Decide between immediate expiry and resumption.
    pub fn on_show(&self) -> Reconciliation {
        reconcile(&self.timer, self.clock.as_ref(), &self.hidden_at)
    }

    /// Start reacting to visibility changes on `hub`, replacing any earlier
    /// attachment. Clears any stale hide timestamp.
    pub fn attach(&self, hub: Arc<SignalHub>) {
        self.detach();

        let timer = self.timer.clone();
        let clock = Arc::clone(&self.clock);
        let hidden_at = Arc::clone(&self.hidden_at);
        let id = hub.listen_visibility(move |visibility| match visibility {
            Visibility::Hidden => record_hide(clock.as_ref(), &hidden_at),
            Visibility::Visible => {
                reconcile(&timer, clock.as_ref(), &hidden_at);
            }
        });
        *self.listener.lock() = Some((hub, id));
    }

    /// Stop reacting to visibility changes. Idempotent.
    pub fn detach(&self) {
        if let Some((hub, id)) = self.listener.lock().take() {
            hub.unlisten(id);
        }
        *self.hidden_at.lock() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn hidden_at(&self) -> Option<u64> {
        *self.hidden_at.lock()
    }
}

fn record_hide(clock: &dyn Clock, hidden_at: &Mutex<Option<u64>>) {
    let now = clock.now_millis();
    *hidden_at.lock() = Some(now);
    debug!(hidden_at = now, "Tab hidden");
}

fn reconcile(
    timer: &SessionTimer,
    clock: &dyn Clock,
    hidden_at: &Mutex<Option<u64>>,
) -> Reconciliation {
    let Some(hidden) = hidden_at.lock().take() else {
        return Reconciliation::Ignored;
    };
    let Some(config) = timer.config() else {
        return Reconciliation::Ignored;
    };
    if !timer.is_running() {
        return Reconciliation::Ignored;
    }

    let away_ms = clock.now_millis().saturating_sub(hidden);
    if away_ms >= config.timeout_ms() {
        debug!(away_ms, timeout_ms = config.timeout_ms(), "Away past timeout, expiring");
        if timer.force_expire() {
            return Reconciliation::Expired { away_ms };
        }
        return Reconciliation::Ignored;
    }

    debug!(away_ms, "Returned within timeout, resetting timer");
    timer.reset();
    Reconciliation::Resumed { away_ms }
}
