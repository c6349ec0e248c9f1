//! Per-user durable storage.
//!
//! [`UserScopedStore`] is the only place that composes durable keys and
//! talks to a [`KeyValueStore`]. It never raises: unreadable values load as
//! the collection's default and failed writes are logged and dropped.

use std::fmt;
use std::sync::Arc;

use kiosk_types::UserId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::KeyValueStore;

/// Durable key of the persisted principal.
pub const PRINCIPAL_KEY: &str = "user";

/// Durable key of the user directory's account records.
pub const USERS_KEY: &str = "users";

/// A per-user collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKey {
    Cart,
    Orders,
}

impl CollectionKey {
    pub const ALL: [CollectionKey; 2] = [CollectionKey::Cart, CollectionKey::Orders];

    pub fn prefix(&self) -> &'static str {
        match self {
            CollectionKey::Cart => "cart",
            CollectionKey::Orders => "orders",
        }
    }

    /// Durable key for this collection and user: `{prefix}_{userId}`.
    pub fn durable_key(&self, user: &UserId) -> String {
        format!("{}_{}", self.prefix(), user)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// JSON persistence keyed by `(collection, user)`.
#[derive(Debug, Clone)]
pub struct UserScopedStore {
    backend: Arc<dyn KeyValueStore>,
}

impl UserScopedStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Load a user's collection, or its default when absent or unreadable.
    pub fn load<T>(&self, user: &UserId, key: CollectionKey) -> T
    where
        T: DeserializeOwned + Default,
    {
        let durable_key = key.durable_key(user);
        let raw = match self.backend.get(&durable_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(key = %durable_key, error = %e, "Failed to read stored collection");
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %durable_key, "Loaded stored collection");
                value
            }
            Err(e) => {
                warn!(key = %durable_key, error = %e, "Discarding unreadable stored collection");
                T::default()
            }
        }
    }

    /// Persist a user's collection. Best-effort.
    pub fn save<T>(&self, user: &UserId, key: CollectionKey, value: &T)
    where
        T: Serialize,
    {
        let durable_key = key.durable_key(user);
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %durable_key, error = %e, "Failed to serialize collection");
                return;
            }
        };
        if let Err(e) = self.backend.set(&durable_key, &json) {
            warn!(key = %durable_key, error = %e, "Failed to persist collection");
        }
    }

    /// Delete a user's durable collection. Only account deletion calls this;
    /// logout leaves durable state in place.
    pub fn clear_durable(&self, user: &UserId, key: CollectionKey) {
        let durable_key = key.durable_key(user);
        match self.backend.remove(&durable_key) {
            Ok(()) => debug!(key = %durable_key, "Cleared stored collection"),
            Err(e) => warn!(key = %durable_key, error = %e, "Failed to clear stored collection"),
        }
    }
}
