//! Time provider abstraction.
//!
//! Every timestamp the engine records (last activity, hidden-at, order
//! creation) is read from a [`Clock`], so tests can drive time by hand
//! while production code reads the system clock.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use parking_lot::Mutex;

/// A time provider for the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Returns the current time as a UTC datetime.
    fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.now_millis())
    }
}

/// Convert epoch milliseconds into a UTC datetime, clamping out-of-range
/// values to the epoch.
pub fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Test clock that only moves when told to.
///
/// ```rust,ignore
/// use kiosk_types::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(250);
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct ManualClock {
    millis: Mutex<u64>,
}

#[cfg(any(test, feature = "testing"))]
impl ManualClock {
    /// Create a clock frozen at the given time in milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Mutex::new(millis),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        *self.millis.lock() += ms;
    }

    /// Set the clock to a specific time in milliseconds.
    ///
    /// Time never runs backwards; earlier values are ignored.
    pub fn set(&self, ms: u64) {
        let mut millis = self.millis.lock();
        if ms > *millis {
            *millis = ms;
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        *self.millis.lock()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_never_runs_backwards() {
        let clock = ManualClock::new(5_000);
        clock.set(4_000);
        assert_eq!(clock.now_millis(), 5_000);
        clock.set(6_000);
        assert_eq!(clock.now_millis(), 6_000);
    }

    #[test]
    fn test_now_matches_millis() {
        let clock = ManualClock::default();
        assert_eq!(clock.now().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
