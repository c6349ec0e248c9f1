//! Error types for session timing operations.

/// Error type for session timing operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Timer durations violate `0 < warning < timeout`.
    #[error("Invalid timer config: {0}")]
    InvalidConfig(String),

    /// No tokio runtime is available to drive timers.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for session timing operations.
pub type Result<T> = std::result::Result<T, Error>;
