//! Image: the taggable item and its lifecycle.
//!
//! Images enter the catalog through ingestion and are never physically
//! removed. Their only state transition is `Active → Deleted` (retirement).
//! The counters carried on an image are a cache over the view and bias-tag
//! ledgers; the store recomputes them, nothing increments them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Opaque, non-blank image identifier supplied by the ingestion source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
  pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
    let id = id.into();
    if id.trim().is_empty() {
      return Err(ValidationError::Blank("image_id"));
    }
    Ok(Self(id))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for ImageId {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<ImageId> for String {
  fn from(id: ImageId) -> Self { id.0 }
}

impl fmt::Display for ImageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// Whether an image is still in rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
  #[default]
  Active,
  /// Retired from rotation. Terminal.
  Deleted,
}

impl ImageStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// Cached per-image counters, always recomputed from the ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageCounters {
  pub view_count:     u64,
  /// Number of distinct sessions with a view of the image.
  pub unique_viewers: u64,
  /// Number of distinct bias categories applied to the image.
  pub bias_tag_count: u64,
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A catalog entry as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
  pub id:         ImageId,
  /// Remote URL or local path.
  pub url:        String,
  pub prompt:     String,
  pub tags:       Vec<String>,
  /// The system the image originated from.
  pub source:     String,
  pub status:     ImageStatus,
  pub created_at: DateTime<Utc>,
  pub deleted_at: Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub counters:   ImageCounters,
}

impl Image {
  pub fn is_active(&self) -> bool { self.status.is_active() }
}

/// A validated candidate for insertion into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
  pub id:     ImageId,
  pub url:    String,
  pub prompt: String,
  pub tags:   Vec<String>,
  pub source: String,
}
