//! Default inactivity schedule shared by the config layer and the timer.

/// Default inactivity timeout (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Default warning lead time before expiry (30 seconds).
pub const DEFAULT_WARNING_MS: u64 = 30_000;
