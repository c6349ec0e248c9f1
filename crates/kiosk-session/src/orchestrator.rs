//! The session unit surfaced to the rest of the application.
//!
//! [`SessionOrchestrator`] composes the activity monitor, the session timer
//! and the visibility reconciler into one enable/disable-able unit. Every
//! enable starts a new epoch; callbacks wired during an earlier epoch carry
//! that epoch and do nothing once it has passed, so a timer or listener that
//! fires after `disable()` can never touch the next session.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use kiosk_types::{Clock, millis_to_datetime};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::activity::ActivityMonitor;
use crate::config::TimerConfig;
use crate::scheduler::Scheduler;
use crate::signals::SignalHub;
use crate::timer::{SessionTimer, TimerState};
use crate::visibility::VisibilityReconciler;

/// Capacity of the async event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Observable status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Enabled, counting toward the warning.
    Active,
    /// Enabled, warning delivered.
    Warning,
    /// Ended by inactivity. Behaves as disabled until the next `enable`.
    Expired,
    /// No session.
    Disabled,
}

/// Notification emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The warning threshold was crossed.
    Warning { remaining_ms: u64 },
    /// The session ended through inactivity. Delivered once per session.
    Expired,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub status: SessionStatus,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub timeout_ms: u64,
    pub warning_ms: u64,
}

/// Identifies a synchronous event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Stored lifecycle; `Active` vs `Warning` is read off the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Enabled,
    Expired,
    Disabled,
}

struct OrchestratorState {
    phase: Phase,
    epoch: u64,
    config: Option<TimerConfig>,
}

struct OrchestratorShared {
    hub: Arc<SignalHub>,
    timer: SessionTimer,
    monitor: ActivityMonitor,
    reconciler: VisibilityReconciler,
    state: Mutex<OrchestratorState>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

/// Inactivity session for one authenticated principal at a time.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct SessionOrchestrator {
    shared: Arc<OrchestratorShared>,
}

impl SessionOrchestrator {
    pub fn new(clock: Arc<dyn Clock>, scheduler: Arc<dyn Scheduler>, hub: Arc<SignalHub>) -> Self {
        let timer = SessionTimer::new(Arc::clone(&clock), scheduler);
        let monitor = ActivityMonitor::new(Arc::clone(&hub), Arc::clone(&clock));
        let reconciler = VisibilityReconciler::new(timer.clone(), clock);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(OrchestratorShared {
                hub,
                timer,
                monitor,
                reconciler,
                state: Mutex::new(OrchestratorState {
                    phase: Phase::Disabled,
                    epoch: 0,
                    config: None,
                }),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Start a session: listen for activity, arm the timer, and reconcile
    /// visibility changes. An enabled session is fully disabled first.
    pub fn enable(&self, config: TimerConfig) {
        if self.is_active() {
            self.disable();
        }

        let epoch = {
            let mut state = self.shared.state.lock();
            state.epoch += 1;
            state.phase = Phase::Enabled;
            state.config = Some(config);
            state.epoch
        };

        let weak = Arc::downgrade(&self.shared);
        self.shared
            .monitor
            .start(move |_| on_activity(&weak, epoch));

        let (warn_ref, expire_ref) = (Arc::downgrade(&self.shared), Arc::downgrade(&self.shared));
        self.shared.timer.arm(
            config,
            move |remaining_ms| on_warning(&warn_ref, epoch, remaining_ms),
            move || on_expire(&expire_ref, epoch),
        );

        self.shared.reconciler.attach(Arc::clone(&self.shared.hub));

        info!(
            epoch,
            timeout_ms = config.timeout_ms(),
            warning_ms = config.warning_ms(),
            "Session enabled"
        );
    }

    /// Stop listening, cancel all timers, detach the reconciler. Idempotent.
    pub fn disable(&self) {
        let mut state = self.shared.state.lock();
        let previous = state.phase;
        state.epoch += 1;
        state.phase = Phase::Disabled;

        self.shared.monitor.stop();
        self.shared.timer.disarm();
        self.shared.reconciler.detach();

        if previous != Phase::Disabled {
            info!(from = ?previous, "Session disabled");
        }
    }

    /// Manual "stay logged in": restart the schedule from now.
    ///
    /// Returns false when no session is active.
    pub fn reset_timer(&self) -> bool {
        let state = self.shared.state.lock();
        if state.phase != Phase::Enabled {
            return false;
        }
        self.shared.timer.reset();
        debug!("Session timer reset manually");
        true
    }

    /// Milliseconds until expiry; zero when inactive.
    pub fn get_remaining_time(&self) -> u64 {
        if !self.is_active() {
            return 0;
        }
        self.shared.timer.remaining()
    }

    /// Start of the current inactivity window.
    pub fn get_last_activity(&self) -> Option<DateTime<Utc>> {
        self.shared.timer.last_activity_at().map(millis_to_datetime)
    }

    /// Whether a warning or expiry is pending.
    pub fn is_timer_active(&self) -> bool {
        self.shared.timer.is_running()
    }

    /// Whether a session is enabled and not yet expired.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().phase == Phase::Enabled
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.shared.state.lock();
        self.shared.status_of(state.phase)
    }

    /// Snapshot of the current (or just-ended) session, if one was ever enabled.
    pub fn session(&self) -> Option<Session> {
        let state = self.shared.state.lock();
        let config = state.config?;
        Some(Session {
            status: self.shared.status_of(state.phase),
            last_activity_at: self.shared.timer.last_activity_at().map(millis_to_datetime),
            timeout_ms: config.timeout_ms(),
            warning_ms: config.warning_ms(),
        })
    }

    /// The event target this orchestrator listens on.
    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.shared.hub
    }

    /// Register a synchronous listener for warning and expiry events.
    ///
    /// Listeners run on the thread that crossed the threshold, with no
    /// orchestrator lock held, so they may call back into the orchestrator.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Receive events asynchronously.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }
}

impl OrchestratorShared {
    fn status_of(&self, phase: Phase) -> SessionStatus {
        match phase {
            Phase::Enabled if self.timer.state() == TimerState::Warned => SessionStatus::Warning,
            Phase::Enabled => SessionStatus::Active,
            Phase::Expired => SessionStatus::Expired,
            Phase::Disabled => SessionStatus::Disabled,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event.clone());
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

fn on_activity(shared: &Weak<OrchestratorShared>, epoch: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let state = shared.state.lock();
    if state.epoch != epoch || state.phase != Phase::Enabled {
        trace!(epoch, "Activity for inactive session ignored");
        return;
    }
    shared.timer.reset();
}

fn on_warning(shared: &Weak<OrchestratorShared>, epoch: u64, remaining_ms: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    {
        let state = shared.state.lock();
        if state.epoch != epoch || state.phase != Phase::Enabled {
            return;
        }
    }
    info!(remaining_ms, "Session about to expire");
    shared.emit(SessionEvent::Warning { remaining_ms });
}

fn on_expire(shared: &Weak<OrchestratorShared>, epoch: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    {
        let mut state = shared.state.lock();
        if state.epoch != epoch || state.phase != Phase::Enabled {
            return;
        }
        state.phase = Phase::Expired;
        state.epoch += 1;
        shared.monitor.stop();
        shared.reconciler.detach();
    }
    info!("Session expired due to inactivity");
    shared.emit(SessionEvent::Expired);
}

impl fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SessionOrchestrator")
            .field("phase", &state.phase)
            .field("epoch", &state.epoch)
            .field("timer", &self.shared.timer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::signals::{ActivitySignal, Visibility};
    use kiosk_types::ManualClock;

    struct Harness {
        clock: Arc<ManualClock>,
        scheduler: Arc<ManualScheduler>,
        hub: Arc<SignalHub>,
        session: SessionOrchestrator,
        log: Arc<Mutex<Vec<(u64, SessionEvent)>>>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
            let hub = Arc::new(SignalHub::new());
            let session =
                SessionOrchestrator::new(clock.clone(), scheduler.clone(), Arc::clone(&hub));

            let log = Arc::new(Mutex::new(Vec::new()));
            let (log_ref, clock_ref) = (Arc::clone(&log), Arc::clone(&clock));
            session.subscribe(move |event| {
                log_ref.lock().push((clock_ref.now_millis(), event.clone()));
            });

            Self {
                clock,
                scheduler,
                hub,
                session,
                log,
            }
        }

        fn enable(&self, timeout_ms: u64, warning_ms: u64) {
            self.session
                .enable(TimerConfig::new(timeout_ms, warning_ms).unwrap());
        }

        fn log(&self) -> Vec<(u64, SessionEvent)> {
            self.log.lock().clone()
        }

        fn expirations(&self) -> usize {
            self.log()
                .iter()
                .filter(|(_, e)| *e == SessionEvent::Expired)
                .count()
        }
    }

    #[test]
    fn test_idle_session_warns_then_expires_on_schedule() {
        for (timeout, warning) in [(300_000, 30_000), (10_000, 9_999), (2, 1)] {
            let h = Harness::new();
            h.enable(timeout, warning);
            h.scheduler.advance(timeout * 2);

            assert_eq!(
                h.log(),
                vec![
                    (
                        timeout - warning,
                        SessionEvent::Warning {
                            remaining_ms: warning
                        }
                    ),
                    (timeout, SessionEvent::Expired),
                ]
            );
            assert_eq!(h.session.status(), SessionStatus::Expired);
            assert!(!h.session.is_timer_active());
        }
    }

    #[test]
    fn test_reset_after_warning_returns_to_active() {
        let h = Harness::new();
        h.enable(300_000, 30_000);

        h.scheduler.advance(280_000);
        assert_eq!(h.session.status(), SessionStatus::Warning);

        assert!(h.session.reset_timer());
        assert_eq!(h.session.status(), SessionStatus::Active);
        assert_eq!(h.session.get_remaining_time(), 300_000);

        // The pre-reset expiry (t=300000) must not arrive.
        h.scheduler.advance(100_000);
        assert_eq!(h.expirations(), 0);
        assert!(h.session.is_active());

        // New thresholds are relative to the reset.
        h.scheduler.advance(200_000);
        assert_eq!(h.log().last(), Some(&(580_000, SessionEvent::Expired)));
    }

    #[test]
    fn test_activity_postpones_thresholds() {
        let h = Harness::new();
        h.enable(10_000, 2_000);

        h.scheduler.advance(7_000);
        h.hub.dispatch_activity(ActivitySignal::PointerMove);
        h.scheduler.advance(7_000);
        assert!(h.log().is_empty());

        h.scheduler.advance(1_000);
        assert_eq!(
            h.log(),
            vec![(15_000, SessionEvent::Warning { remaining_ms: 2_000 })]
        );

        h.hub.dispatch_activity(ActivitySignal::KeyDown);
        assert_eq!(h.session.status(), SessionStatus::Active);
    }

    #[test]
    fn test_enable_twice_does_not_duplicate_listeners() {
        let h = Harness::new();
        h.enable(10_000, 2_000);
        h.enable(10_000, 2_000);

        assert_eq!(h.hub.listener_count(), ActivitySignal::ALL.len() + 1);
        assert_eq!(h.scheduler.pending(), 2);
    }

    #[test]
    fn test_disable_is_idempotent_and_silences_everything() {
        let h = Harness::new();
        h.enable(10_000, 2_000);
        h.session.disable();
        h.session.disable();

        assert!(!h.session.is_timer_active());
        assert_eq!(h.session.status(), SessionStatus::Disabled);
        assert_eq!(h.hub.listener_count(), 0);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.session.get_remaining_time(), 0);
        assert!(!h.session.reset_timer());

        h.hub.dispatch_activity(ActivitySignal::Click);
        h.scheduler.advance(50_000);
        assert!(h.log().is_empty());
        assert!(!h.session.is_timer_active());
    }

    #[test]
    fn test_activity_then_disable_leaves_no_timer() {
        let h = Harness::new();
        h.enable(10_000, 2_000);

        h.hub.dispatch_activity(ActivitySignal::KeyPress);
        h.session.disable();

        assert!(!h.session.is_timer_active());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_visibility_return_within_timeout_resets() {
        let h = Harness::new();
        h.enable(300_000, 30_000);

        h.hub.set_visibility(Visibility::Hidden);
        // Background tab: time passes, timers are suspended.
        h.clock.advance(200_000);
        h.hub.set_visibility(Visibility::Visible);

        assert!(h.session.is_timer_active());
        assert_eq!(h.session.get_remaining_time(), 300_000);
        h.scheduler.run_due();
        assert!(h.log().is_empty());
    }

    #[test]
    fn test_return_during_warning_rearms_warning() {
        let h = Harness::new();
        h.enable(10_000, 2_000);
        h.scheduler.advance(8_500);
        assert_eq!(h.session.status(), SessionStatus::Warning);

        h.hub.set_visibility(Visibility::Hidden);
        h.clock.advance(1_000);
        h.hub.set_visibility(Visibility::Visible);
        assert_eq!(h.session.status(), SessionStatus::Active);

        h.scheduler.advance(8_000);
        assert_eq!(
            h.log().last(),
            Some(&(17_500, SessionEvent::Warning { remaining_ms: 2_000 }))
        );
    }

    #[test]
    fn test_visibility_return_past_timeout_expires_once() {
        let h = Harness::new();
        h.enable(300_000, 30_000);

        h.hub.set_visibility(Visibility::Hidden);
        h.clock.advance(310_000);
        h.hub.set_visibility(Visibility::Visible);

        assert_eq!(h.log(), vec![(310_000, SessionEvent::Expired)]);

        // Throttled timers delivered late are stale.
        h.scheduler.run_due();
        h.scheduler.advance(1_000_000);
        assert_eq!(h.expirations(), 1);
        assert_eq!(h.session.status(), SessionStatus::Expired);
    }

    #[test]
    fn test_after_expiry_activity_has_no_effect_until_reenabled() {
        let h = Harness::new();
        h.enable(10_000, 2_000);
        h.scheduler.advance(10_000);
        assert_eq!(h.expirations(), 1);

        h.hub.dispatch_activity(ActivitySignal::Click);
        assert!(!h.session.is_timer_active());
        assert!(!h.session.reset_timer());
        assert_eq!(h.hub.listener_count(), 0);

        h.enable(10_000, 2_000);
        assert!(h.session.is_active());
        h.scheduler.advance(10_000);
        assert_eq!(h.expirations(), 2);
    }

    #[test]
    fn test_listener_may_disable_from_expiry() {
        let h = Harness::new();
        let inner = h.session.clone();
        h.session.subscribe(move |event| {
            if *event == SessionEvent::Expired {
                inner.disable();
            }
        });

        h.enable(10_000, 2_000);
        h.scheduler.advance(10_000);
        assert_eq!(h.session.status(), SessionStatus::Disabled);
    }

    #[test]
    fn test_session_snapshot_and_last_activity() {
        let h = Harness::new();
        assert!(h.session.session().is_none());

        h.clock.advance(5_000);
        h.enable(10_000, 2_000);
        let snapshot = h.session.session().unwrap();
        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.timeout_ms, 10_000);
        assert_eq!(snapshot.warning_ms, 2_000);
        assert_eq!(
            h.session.get_last_activity().map(|t| t.timestamp_millis()),
            Some(5_000)
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let h = Harness::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = h.session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(h.session.unsubscribe(id));
        assert!(!h.session.unsubscribe(id));

        h.enable(10_000, 2_000);
        h.scheduler.advance(10_000);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_broadcast_receiver_sees_events() {
        let h = Harness::new();
        let mut events = h.session.events();

        h.enable(10_000, 2_000);
        h.scheduler.advance(10_000);

        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Warning { remaining_ms: 2_000 }
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
    }
}
