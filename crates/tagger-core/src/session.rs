//! Session: an unauthenticated visitor identity.
//!
//! Sessions never expire in the core; idle ones simply stop generating
//! activity. Every engine call takes the session id explicitly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ValidationError;

/// Opaque, non-blank session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
  pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
    let id = id.into();
    if id.trim().is_empty() {
      return Err(ValidationError::Blank("session_id"));
    }
    Ok(Self(id))
  }

  /// Mint a fresh random identifier (UUID v4, unhyphenated).
  pub fn generate() -> Self { Self(Uuid::new_v4().simple().to_string()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for SessionId {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<SessionId> for String {
  fn from(id: SessionId) -> Self { id.0 }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub session_id:  SessionId,
  pub created_at:  DateTime<Utc>,
  /// Refreshed every time the session is ensured.
  pub last_active: DateTime<Utc>,
}
