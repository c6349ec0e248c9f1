//! Error types for authentication.

use kiosk_store::StoreError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors surfaced by the user directory and the auth controller.
///
/// The `Display` text of the credential variants is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailAlreadyInUse,

    /// Registration input was rejected before reaching the directory.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already signed in")]
    AlreadyAuthenticated,

    #[error("Not signed in")]
    NotAuthenticated,

    /// A sign-in attempt is already in flight.
    #[error("Authentication already in progress")]
    Busy,

    /// The controller was disposed (or the attempt superseded) while the
    /// directory was answering.
    #[error("Authentication cancelled")]
    Cancelled,

    /// The directory has no such account.
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<kiosk_types::Error> for AuthError {
    fn from(e: kiosk_types::Error) -> Self {
        match e {
            kiosk_types::Error::InvalidInput(msg) => AuthError::InvalidInput(msg),
            kiosk_types::Error::Json(e) => AuthError::Json(e),
        }
    }
}
