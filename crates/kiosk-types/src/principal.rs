//! Authenticated identity types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a user account.
///
/// Always non-empty: "no user" is expressed as `Option<UserId>`, never as an
/// empty string, so every per-user storage key is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a user id, rejecting empty or whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The authenticated user's public identity. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// Serialize for durable storage under the `user` key.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a principal previously written by [`Principal::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert_eq!(UserId::new("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_principal_uses_camel_case_fields() {
        let principal = Principal {
            id: UserId::new("u1").unwrap(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            avatar: None,
            created_at: DateTime::UNIX_EPOCH,
        };

        let json = principal.to_json().unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"id\":\"u1\""));
        assert_eq!(Principal::from_json(&json).unwrap(), principal);
    }

    #[test]
    fn test_principal_with_empty_id_fails_to_parse() {
        let json = r#"{"id":"","email":"a@b.c","name":"A","createdAt":"2024-01-01T00:00:00Z"}"#;
        assert!(Principal::from_json(json).is_err());
    }
}
