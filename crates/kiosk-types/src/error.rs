//! Error types shared across the kiosk crates.

use thiserror::Error;

/// Result type alias using the kiosk error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing shared types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
