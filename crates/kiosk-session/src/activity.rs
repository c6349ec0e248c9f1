//! Interaction signal monitoring.

use std::sync::Arc;

use kiosk_types::Clock;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::signals::{ActivitySignal, ListenerId, SignalHub};

/// Observes the fixed [`ActivitySignal::ALL`] set and records the time of
/// the most recent signal.
///
/// Every signal counts: there is no debouncing. Starting an already started
/// monitor replaces the previous registration; stopping a stopped monitor
/// does nothing.
#[derive(Debug)]
pub struct ActivityMonitor {
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    listeners: Mutex<Vec<ListenerId>>,
    last_activity_at: Arc<Mutex<Option<u64>>>,
}

impl ActivityMonitor {
    pub fn new(hub: Arc<SignalHub>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hub,
            clock,
            listeners: Mutex::new(Vec::new()),
            last_activity_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Register for every signal and call `on_activity` on each one.
    pub fn start<F>(&self, on_activity: F)
    where
        F: Fn(ActivitySignal) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        for id in listeners.drain(..) {
            self.hub.unlisten(id);
        }

        let on_activity = Arc::new(on_activity);
        for signal in ActivitySignal::ALL {
            let on_activity = Arc::clone(&on_activity);
            let clock = Arc::clone(&self.clock);
            let last = Arc::clone(&self.last_activity_at);
            let id = self.hub.listen_activity(signal, move |signal| {
                let now = clock.now_millis();
                *last.lock() = Some(now);
                trace!(signal = %signal, at = now, "Activity");
                on_activity(signal);
            });
            listeners.push(id);
        }

        debug!(signals = listeners.len(), "Activity monitor started");
    }

    /// Remove all listeners.
    pub fn stop(&self) {
        let mut listeners = self.listeners.lock();
        if listeners.is_empty() {
            return;
        }
        for id in listeners.drain(..) {
            self.hub.unlisten(id);
        }
        debug!("Activity monitor stopped");
    }

    pub fn is_started(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    /// Time of the most recent signal, in epoch milliseconds.
    pub fn last_activity_at(&self) -> Option<u64> {
        *self.last_activity_at.lock()
    }
}
