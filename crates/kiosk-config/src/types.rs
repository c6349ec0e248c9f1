//! Configuration types.
//!
//! ```toml
//! [session]
//! timeout_ms = 300000
//! warning_ms = 30000
//!
//! [storage]
//! data_dir = "/var/lib/kiosk"
//!
//! [auth]
//! simulated_delay_ms = 1000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use kiosk_types::{DEFAULT_TIMEOUT_MS, DEFAULT_WARNING_MS};

use crate::error::{ConfigError, Result};

/// Default simulated network latency for login and registration.
pub const DEFAULT_AUTH_DELAY_MS: u64 = 1_000;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "KIOSK_DATA_DIR";

/// Root configuration, one optional section per concern.
///
/// Absent sections fall back to their defaults; when layering files, a
/// section present in a later file replaces the earlier one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KioskConfig {
    /// Inactivity timeout configuration.
    pub session: Option<SessionConfig>,

    /// Durable storage configuration.
    pub storage: Option<StorageConfig>,

    /// Authentication collaborator configuration.
    pub auth: Option<AuthConfig>,
}

impl KioskConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: KioskConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.storage.is_some() {
            self.storage = other.storage;
        }

        if other.auth.is_some() {
            self.auth = other.auth;
        }
    }

    /// Effective session section (defaults when absent).
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Effective storage section (defaults when absent).
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Effective auth section (defaults when absent).
    pub fn auth(&self) -> AuthConfig {
        self.auth.clone().unwrap_or_default()
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        self.session().validate()
    }

    /// A fully populated config, suitable for `kiosk config init`.
    pub fn with_defaults() -> Self {
        Self {
            session: Some(SessionConfig::default()),
            storage: Some(StorageConfig::default()),
            auth: Some(AuthConfig::default()),
        }
    }
}

/// Inactivity timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which the session expires (default: 300000).
    pub timeout_ms: u64,
    /// How long before expiry the warning fires (default: 30000).
    pub warning_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            warning_ms: DEFAULT_WARNING_MS,
        }
    }
}

impl SessionConfig {
    /// Reject timings that violate `0 < warning_ms < timeout_ms`.
    pub fn validate(&self) -> Result<()> {
        if self.warning_ms == 0 {
            return Err(ConfigError::InvalidSession(
                "warning_ms must be positive".to_string(),
            ));
        }
        if self.warning_ms >= self.timeout_ms {
            return Err(ConfigError::InvalidSession(format!(
                "warning_ms ({}) must be less than timeout_ms ({})",
                self.warning_ms, self.timeout_ms
            )));
        }
        Ok(())
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one file per storage key.
    /// Default: platform data dir + `kiosk` (e.g. `~/.local/share/kiosk`).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Get the effective data directory, checking the environment first.
    ///
    /// Resolution order:
    /// 1. `KIOSK_DATA_DIR` environment variable
    /// 2. Configured `data_dir` value
    /// 3. Platform data directory joined with `kiosk`
    pub fn effective_data_dir(&self) -> PathBuf {
        if let Ok(env_path) = std::env::var(DATA_DIR_ENV)
            && !env_path.is_empty()
        {
            return PathBuf::from(env_path);
        }

        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiosk")
        })
    }
}

/// Authentication collaborator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Latency the user directory simulates before answering (default: 1000).
    pub simulated_delay_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            simulated_delay_ms: DEFAULT_AUTH_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KioskConfig::new();
        assert_eq!(config.session().timeout_ms, 300_000);
        assert_eq!(config.session().warning_ms, 30_000);
        assert_eq!(config.auth().simulated_delay_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_section() {
        let config = KioskConfig::from_toml(
            r#"
[session]
timeout_ms = 60000
"#,
        )
        .unwrap();

        let session = config.session();
        assert_eq!(session.timeout_ms, 60_000);
        assert_eq!(session.warning_ms, DEFAULT_WARNING_MS);
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_validate_rejects_warning_not_below_timeout() {
        let config = KioskConfig::from_toml(
            r#"
[session]
timeout_ms = 30000
warning_ms = 30000
"#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSession(_)));
    }

    #[test]
    fn test_validate_rejects_zero_warning() {
        let session = SessionConfig {
            timeout_ms: 1_000,
            warning_ms: 0,
        };
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_merge_replaces_present_sections() {
        let mut base = KioskConfig::with_defaults();
        let overlay = KioskConfig {
            auth: Some(AuthConfig {
                simulated_delay_ms: 0,
            }),
            ..Default::default()
        };

        base.merge(overlay);

        assert_eq!(base.auth().simulated_delay_ms, 0);
        assert_eq!(base.session(), SessionConfig::default());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = KioskConfig::with_defaults();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[session]"));
        assert_eq!(KioskConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_configured_data_dir_used_without_env() {
        let storage = StorageConfig {
            data_dir: Some(PathBuf::from("/tmp/kiosk-data")),
        };
        if std::env::var(DATA_DIR_ENV).is_err() {
            assert_eq!(storage.effective_data_dir(), PathBuf::from("/tmp/kiosk-data"));
        }
    }
}
