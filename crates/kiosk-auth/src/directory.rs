//! User directory: the collaborator that verifies credentials.
//!
//! The controller only ever sees a [`Principal`]; password material stays in
//! here. [`StoredUserDirectory`] simulates a remote account service on top of
//! the same key-value backend as the rest of the client, answering each
//! request after a configurable delay.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiosk_store::{KeyValueStore, USERS_KEY};
use kiosk_types::{Clock, Principal, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AuthError, Result};

/// Default simulated network delay.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account service consulted on sign-in and sign-up.
#[async_trait]
pub trait UserDirectory: Send + Sync + Debug {
    /// Verify credentials. Fails with [`AuthError::InvalidCredentials`].
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal>;

    /// Create an account. Fails with [`AuthError::EmailAlreadyInUse`].
    async fn register(&self, registration: &Registration) -> Result<Principal>;

    /// Delete an account.
    async fn remove(&self, id: &UserId) -> Result<()>;
}

/// Stored account, including the password hash. Never leaves the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    id: UserId,
    email: String,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    avatar: Option<String>,
}

impl UserRecord {
    fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            created_at: self.created_at,
        }
    }
}

/// Directory keeping [`UserRecord`]s as a JSON array under the `users` key.
#[derive(Debug)]
pub struct StoredUserDirectory {
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    delay: Duration,
    hash_params: Params,
    /// Serializes read-modify-write of the record list.
    records: Mutex<()>,
}

impl StoredUserDirectory {
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            delay: DEFAULT_DELAY,
            hash_params: Params::default(),
            records: Mutex::new(()),
        }
    }

    /// Set the simulated network delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Use custom Argon2id cost parameters for new hashes.
    pub fn with_hash_params(mut self, params: Params) -> Self {
        self.hash_params = params;
        self
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Read the record list. Unreadable data is an error, never an empty
    /// directory, so a later write cannot clobber existing accounts.
    fn load_records(&self) -> Result<Vec<UserRecord>> {
        let Some(raw) = self.backend.get(USERS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|e| {
            warn!(error = %e, "User records are unreadable");
            AuthError::Json(e)
        })
    }

    fn save_records(&self, records: &[UserRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.backend.set(USERS_KEY, &json)?;
        Ok(())
    }

    /// Hash on the blocking pool.
    async fn hash_password(&self, password: &str) -> Result<String> {
        let params = self.hash_params.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut rand_core::OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
    }
}

async fn verify_password(password: &str, hash: &str) -> Result<()> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash).map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
}

#[async_trait]
impl UserDirectory for StoredUserDirectory {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal> {
        self.simulate_latency().await;

        let email = normalize_email(&credentials.email);
        let records = {
            let _guard = self.records.lock();
            self.load_records()?
        };
        let Some(record) = records.iter().find(|r| r.email == email) else {
            debug!(email = %email, "Unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(&credentials.password, &record.password_hash).await?;

        debug!(user = %record.id, "Credentials verified");
        Ok(record.principal())
    }

    async fn register(&self, registration: &Registration) -> Result<Principal> {
        self.simulate_latency().await;

        let name = registration.name.trim();
        let email = normalize_email(&registration.email);
        if name.is_empty() {
            return Err(AuthError::InvalidInput("name must not be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidInput(format!("not an email address: {email}")));
        }
        if registration.password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }

        let password_hash = self.hash_password(&registration.password).await?;

        let _guard = self.records.lock();
        let mut records = self.load_records()?;
        if records.iter().any(|r| r.email == email) {
            return Err(AuthError::EmailAlreadyInUse);
        }

        let record = UserRecord {
            id: UserId::new(Uuid::new_v4().to_string())?,
            email,
            name: name.to_string(),
            password_hash,
            created_at: self.clock.now(),
            avatar: Some(initials(name)),
        };
        records.push(record.clone());
        self.save_records(&records)?;

        info!(user = %record.id, "Account registered");
        Ok(record.principal())
    }

    async fn remove(&self, id: &UserId) -> Result<()> {
        self.simulate_latency().await;

        let _guard = self.records.lock();
        let mut records = self.load_records()?;
        let before = records.len();
        records.retain(|r| r.id != *id);
        if records.len() == before {
            return Err(AuthError::UserNotFound(id.to_string()));
        }
        self.save_records(&records)?;

        info!(user = %id, "Account removed");
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Up to two uppercase initials, used as the default avatar.
fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}
