//! Shared types for the kiosk session engine.
//!
//! - [`UserId`] and [`Principal`]: the authenticated identity
//! - [`Clock`]: the time source every timestamp in the engine comes from
//! - [`DEFAULT_TIMEOUT_MS`] and [`DEFAULT_WARNING_MS`]: the default schedule

pub mod clock;
pub mod error;
pub mod principal;
pub mod timing;

pub use clock::{Clock, SystemClock, millis_to_datetime};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use error::{Error, Result};
pub use principal::{Principal, UserId};
pub use timing::{DEFAULT_TIMEOUT_MS, DEFAULT_WARNING_MS};
