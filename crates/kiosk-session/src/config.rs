//! Configuration for the session timer.

use std::time::Duration;

use crate::error::{Error, Result};

pub use kiosk_types::{DEFAULT_TIMEOUT_MS, DEFAULT_WARNING_MS};

/// Validated warning/expiry schedule.
///
/// The only way to build one is [`TimerConfig::new`], which enforces
/// `0 < warning_ms < timeout_ms`; an invalid schedule never reaches
/// `arm()` or `enable()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    timeout_ms: u64,
    warning_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            warning_ms: DEFAULT_WARNING_MS,
        }
    }
}

impl TimerConfig {
    /// Create a schedule from millisecond durations.
    pub fn new(timeout_ms: u64, warning_ms: u64) -> Result<Self> {
        if warning_ms == 0 {
            return Err(Error::InvalidConfig(
                "warning_ms must be positive".to_string(),
            ));
        }
        if warning_ms >= timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "warning_ms ({warning_ms}) must be less than timeout_ms ({timeout_ms})"
            )));
        }
        Ok(Self {
            timeout_ms,
            warning_ms,
        })
    }

    /// Idle time after which the session expires.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Lead time between the warning and expiry.
    pub fn warning_ms(&self) -> u64 {
        self.warning_ms
    }

    /// Delay from last activity until the warning fires.
    pub fn warning_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_ms - self.warning_ms)
    }

    /// Delay from last activity until expiry.
    pub fn expiry_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
