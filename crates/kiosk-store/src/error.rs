//! Error types for per-user collection operations.

use std::path::PathBuf;

use kiosk_types::UserId;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write was attempted while no user is signed in.
    #[error("No active user (write intended for {expected})")]
    NoActiveUser { expected: UserId },

    /// A write was attempted on behalf of a user who is not the active one.
    #[error("Write for {expected} rejected: active user is {active}")]
    NotActiveUser { expected: UserId, active: UserId },

    /// Backend I/O failed.
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unknown order status: {0}")]
    InvalidStatus(String),

    #[error("Cart is empty")]
    EmptyCart,

    /// Checkout found a cart item with no known price.
    #[error("No price for item: {0}")]
    UnknownItem(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
