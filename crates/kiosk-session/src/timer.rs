//! Warning/expiry schedule for one session.

use std::fmt;
use std::sync::{Arc, Weak};

use kiosk_types::Clock;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::TimerConfig;
use crate::scheduler::{Scheduler, TaskHandle};

/// Lifecycle of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No session.
    Disarmed,
    /// Counting toward the warning.
    Armed,
    /// Warning delivered, counting toward expiry.
    Warned,
    /// Expiry delivered.
    Fired,
}

type WarningCallback = Arc<dyn Fn(u64) + Send + Sync>;
type ExpireCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
struct Callbacks {
    on_warning: WarningCallback,
    on_expire: ExpireCallback,
}

struct TimerInner {
    state: TimerState,
    config: Option<TimerConfig>,
    last_activity_at: Option<u64>,
    warning: Option<TaskHandle>,
    expiry: Option<TaskHandle>,
    /// Bumped on every arm/reset/disarm/force; scheduled tasks carry the
    /// generation they were created under and do nothing if it moved on.
    generation: u64,
    callbacks: Option<Callbacks>,
}

struct TimerShared {
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<TimerInner>,
}

/// Owns at most one pending warning and one pending expiry.
///
/// Cloning yields another handle to the same timer. Callbacks are always
/// invoked with no internal lock held, so they may call back into the timer.
#[derive(Clone)]
pub struct SessionTimer {
    shared: Arc<TimerShared>,
}

impl SessionTimer {
    pub fn new(clock: Arc<dyn Clock>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                clock,
                scheduler,
                inner: Mutex::new(TimerInner {
                    state: TimerState::Disarmed,
                    config: None,
                    last_activity_at: None,
                    warning: None,
                    expiry: None,
                    generation: 0,
                    callbacks: None,
                }),
            }),
        }
    }

    /// Cancel any schedule and start a new one from now.
    ///
    /// `on_warning` receives the milliseconds left until expiry.
    pub fn arm<W, E>(&self, config: TimerConfig, on_warning: W, on_expire: E)
    where
        W: Fn(u64) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.shared.inner.lock();
        inner.config = Some(config);
        inner.callbacks = Some(Callbacks {
            on_warning: Arc::new(on_warning),
            on_expire: Arc::new(on_expire),
        });
        self.reschedule(&mut inner);
        debug!(
            timeout_ms = config.timeout_ms(),
            warning_ms = config.warning_ms(),
            "Session timer armed"
        );
    }

    /// Restart the schedule from now with the current config.
    ///
    /// Both pending callbacks are cancelled before the new ones are
    /// scheduled, so a reset after the warning returns the timer to `Armed`
    /// and the old expiry never fires. No-op when disarmed.
    pub fn reset(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state == TimerState::Disarmed {
            return false;
        }
        self.reschedule(&mut inner);
        trace!("Session timer reset");
        true
    }

    /// Cancel everything and forget the callbacks. Idempotent.
    pub fn disarm(&self) {
        let mut inner = self.shared.inner.lock();
        self.cancel_pending(&mut inner);
        inner.generation += 1;
        if inner.state != TimerState::Disarmed {
            debug!(from = ?inner.state, "Session timer disarmed");
        }
        inner.state = TimerState::Disarmed;
        inner.callbacks = None;
        inner.config = None;
        inner.last_activity_at = None;
    }

    /// Expire immediately, without waiting for the scheduled expiry.
    ///
    /// Returns false (and delivers nothing) unless the timer was `Armed` or
    /// `Warned`.
    pub fn force_expire(&self) -> bool {
        let callback = {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, TimerState::Armed | TimerState::Warned) {
                return false;
            }
            self.cancel_pending(&mut inner);
            inner.generation += 1;
            inner.state = TimerState::Fired;
            inner.callbacks.as_ref().map(|c| Arc::clone(&c.on_expire))
        };
        debug!("Session timer expired early");
        if let Some(on_expire) = callback {
            on_expire();
        }
        true
    }

    /// Milliseconds until expiry: `max(0, timeout - (now - last_activity))`.
    /// Zero when disarmed.
    pub fn remaining(&self) -> u64 {
        let inner = self.shared.inner.lock();
        match (inner.state, inner.config, inner.last_activity_at) {
            (TimerState::Disarmed, _, _) => 0,
            (_, Some(config), Some(last)) => {
                let elapsed = self.shared.clock.now_millis().saturating_sub(last);
                config.timeout_ms().saturating_sub(elapsed)
            }
            _ => 0,
        }
    }

    pub fn state(&self) -> TimerState {
        self.shared.inner.lock().state
    }

    /// Whether a warning or expiry is still pending.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), TimerState::Armed | TimerState::Warned)
    }

    pub fn config(&self) -> Option<TimerConfig> {
        self.shared.inner.lock().config
    }

    /// Start of the current schedule, in epoch milliseconds.
    pub fn last_activity_at(&self) -> Option<u64> {
        self.shared.inner.lock().last_activity_at
    }

    fn cancel_pending(&self, inner: &mut TimerInner) {
        if let Some(handle) = inner.warning.take() {
            self.shared.scheduler.cancel(handle);
        }
        if let Some(handle) = inner.expiry.take() {
            self.shared.scheduler.cancel(handle);
        }
    }

    fn reschedule(&self, inner: &mut TimerInner) {
        self.cancel_pending(inner);
        let Some(config) = inner.config else {
            return;
        };

        inner.generation += 1;
        inner.state = TimerState::Armed;
        inner.last_activity_at = Some(self.shared.clock.now_millis());

        let generation = inner.generation;
        let weak = Arc::downgrade(&self.shared);
        inner.warning = Some(self.shared.scheduler.schedule(
            config.warning_delay(),
            Box::new(move || fire_warning(weak, generation)),
        ));

        let weak = Arc::downgrade(&self.shared);
        inner.expiry = Some(self.shared.scheduler.schedule(
            config.expiry_delay(),
            Box::new(move || fire_expiry(weak, generation)),
        ));
    }
}

fn fire_warning(shared: Weak<TimerShared>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let (callback, remaining) = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation || inner.state != TimerState::Armed {
            trace!(generation, "Stale warning ignored");
            return;
        }
        inner.state = TimerState::Warned;
        inner.warning = None;
        let remaining = match (inner.config, inner.last_activity_at) {
            (Some(config), Some(last)) => {
                let elapsed = shared.clock.now_millis().saturating_sub(last);
                config.timeout_ms().saturating_sub(elapsed)
            }
            _ => 0,
        };
        (
            inner.callbacks.as_ref().map(|c| Arc::clone(&c.on_warning)),
            remaining,
        )
    };
    debug!(remaining_ms = remaining, "Session warning threshold crossed");
    if let Some(on_warning) = callback {
        on_warning(remaining);
    }
}

fn fire_expiry(shared: Weak<TimerShared>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let callback = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation
            || !matches!(inner.state, TimerState::Armed | TimerState::Warned)
        {
            trace!(generation, "Stale expiry ignored");
            return;
        }
        inner.state = TimerState::Fired;
        inner.expiry = None;
        if let Some(handle) = inner.warning.take() {
            shared.scheduler.cancel(handle);
        }
        inner.callbacks.as_ref().map(|c| Arc::clone(&c.on_expire))
    };
    debug!("Session expiry threshold crossed");
    if let Some(on_expire) = callback {
        on_expire();
    }
}

impl fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("SessionTimer")
            .field("state", &inner.state)
            .field("config", &inner.config)
            .field("last_activity_at", &inner.last_activity_at)
            .field("generation", &inner.generation)
            .finish()
    }
}
