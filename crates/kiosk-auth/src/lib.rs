//! Authentication for the kiosk session engine.
//!
//! # Components
//!
//! - [`directory`]: the [`UserDirectory`] collaborator and its stored,
//!   Argon2id-backed implementation
//! - [`controller`]: [`AuthSessionController`], which sequences sign-in and sign-out across the
//!   caches and the inactivity session

pub mod controller;
pub mod directory;
pub mod error;

pub use controller::{AuthEvent, AuthSessionController, AuthState, AuthStatus, LogoutReason};
pub use directory::{
    Credentials, DEFAULT_DELAY, Registration, StoredUserDirectory, UserDirectory,
};
pub use error::{AuthError, Result};
