//! Host event target for interaction signals and visibility changes.
//!
//! The [`SignalHub`] stands where the document sits in a browser: the host
//! dispatches events into it, and session components add and remove
//! listeners on it. Dispatch snapshots the listener list before calling out,
//! so a listener may add or remove listeners (including itself) safely.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Error;

/// An interaction signal that counts as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
    KeyDown,
}

impl ActivitySignal {
    /// The complete signal set the activity monitor listens for.
    pub const ALL: [ActivitySignal; 7] = [
        ActivitySignal::PointerDown,
        ActivitySignal::PointerMove,
        ActivitySignal::KeyPress,
        ActivitySignal::Scroll,
        ActivitySignal::TouchStart,
        ActivitySignal::Click,
        ActivitySignal::KeyDown,
    ];

    /// DOM event name of the signal.
    pub fn event_name(&self) -> &'static str {
        match self {
            ActivitySignal::PointerDown => "mousedown",
            ActivitySignal::PointerMove => "mousemove",
            ActivitySignal::KeyPress => "keypress",
            ActivitySignal::Scroll => "scroll",
            ActivitySignal::TouchStart => "touchstart",
            ActivitySignal::Click => "click",
            ActivitySignal::KeyDown => "keydown",
        }
    }
}

impl fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

impl FromStr for ActivitySignal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivitySignal::ALL
            .into_iter()
            .find(|signal| signal.event_name() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown activity signal: {s}")))
    }
}

/// Page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Identifies a registered listener for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ActivityHandler = Arc<dyn Fn(ActivitySignal) + Send + Sync>;
type VisibilityHandler = Arc<dyn Fn(Visibility) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    activity: Vec<(ListenerId, ActivitySignal, ActivityHandler)>,
    visibility: Vec<(ListenerId, VisibilityHandler)>,
    current: Option<Visibility>,
}

impl Registry {
    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

/// In-process event target.
#[derive(Default)]
pub struct SignalHub {
    registry: Mutex<Registry>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for one activity signal.
    pub fn listen_activity<F>(&self, signal: ActivitySignal, handler: F) -> ListenerId
    where
        F: Fn(ActivitySignal) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next();
        registry.activity.push((id, signal, Arc::new(handler)));
        id
    }

    /// Listen for visibility changes.
    pub fn listen_visibility<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Visibility) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next();
        registry.visibility.push((id, Arc::new(handler)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unlisten(&self, id: ListenerId) {
        let mut registry = self.registry.lock();
        registry.activity.retain(|(lid, _, _)| *lid != id);
        registry.visibility.retain(|(lid, _)| *lid != id);
    }

    /// Deliver an activity signal to its listeners, in registration order.
    pub fn dispatch_activity(&self, signal: ActivitySignal) {
        let handlers: Vec<ActivityHandler> = {
            let registry = self.registry.lock();
            registry
                .activity
                .iter()
                .filter(|(_, s, _)| *s == signal)
                .map(|(_, _, h)| Arc::clone(h))
                .collect()
        };
        trace!(signal = %signal, listeners = handlers.len(), "Dispatching activity");
        for handler in handlers {
            handler(signal);
        }
    }

    /// Record a visibility change and notify listeners.
    ///
    /// Repeating the current state is not a change and notifies no one.
    pub fn set_visibility(&self, visibility: Visibility) {
        let handlers: Vec<VisibilityHandler> = {
            let mut registry = self.registry.lock();
            if registry.current == Some(visibility) {
                return;
            }
            registry.current = Some(visibility);
            registry
                .visibility
                .iter()
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        trace!(?visibility, listeners = handlers.len(), "Dispatching visibility change");
        for handler in handlers {
            handler(visibility);
        }
    }

    /// Last visibility reported by the host, `Visible` if none yet.
    pub fn visibility(&self) -> Visibility {
        self.registry.lock().current.unwrap_or(Visibility::Visible)
    }

    /// Number of registered listeners of both kinds.
    pub fn listener_count(&self) -> usize {
        let registry = self.registry.lock();
        registry.activity.len() + registry.visibility.len()
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("SignalHub")
            .field("activity_listeners", &registry.activity.len())
            .field("visibility_listeners", &registry.visibility.len())
            .field("visibility", &registry.current)
            .finish()
    }
}
