//! Inactivity detection and session expiry.
//!
//! This crate provides the client-side session lifecycle:
//! - [`ActivityMonitor`]: listens for interaction signals on a [`SignalHub`]
//! - [`SessionTimer`]: warning/expiry schedule derived from last activity
//! - [`VisibilityReconciler`]: decides expiry vs. resumption when a hidden tab returns
//! - [`SessionOrchestrator`]: the composed unit the rest of the application uses
//!
//! Timers run on a [`Scheduler`]: [`TokioScheduler`] in production and
//! `ManualScheduler` (behind the `testing` feature) for virtual-time tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiosk_session::{SessionOrchestrator, SignalHub, TimerConfig, TokioScheduler};
//!
//! let hub = Arc::new(SignalHub::new());
//! let session = SessionOrchestrator::new(clock, Arc::new(TokioScheduler::current()?), hub);
//! session.enable(TimerConfig::default());
//! ```

mod activity;
mod config;
mod error;
mod orchestrator;
mod scheduler;
mod signals;
mod timer;
mod visibility;

pub use activity::ActivityMonitor;
pub use config::{DEFAULT_TIMEOUT_MS, DEFAULT_WARNING_MS, TimerConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    Session, SessionEvent, SessionOrchestrator, SessionStatus, SubscriptionId,
};
#[cfg(any(test, feature = "testing"))]
pub use scheduler::ManualScheduler;
pub use scheduler::{Scheduler, Task, TaskHandle, TokioScheduler};
pub use signals::{ActivitySignal, ListenerId, SignalHub, Visibility};
pub use timer::{SessionTimer, TimerState};
pub use visibility::{Reconciliation, VisibilityReconciler};
