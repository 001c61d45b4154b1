//! Ingestion record shape and validation.
//!
//! Producers (scrapers, bulk loaders, the `/images` endpoint) hand over loosely
//! shaped JSON records. Each record is validated on its own; a malformed
//! record is rejected without affecting the rest of the batch.

use serde::{Deserialize, Serialize};

use crate::{
  ValidationError,
  image::{ImageId, NewImage},
};

pub const DEFAULT_SOURCE: &str = "unknown";

/// A candidate image as produced by an ingestion source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestRecord {
  pub id:     Option<String>,
  pub url:    Option<String>,
  pub prompt: Option<String>,
  pub tags:   Vec<String>,
  pub source: Option<String>,
}

impl IngestRecord {
  /// Check required fields and normalise optional ones.
  ///
  /// Tags are de-duplicated keeping the first occurrence; blank tags are
  /// dropped.
  pub fn validate(self) -> Result<NewImage, ValidationError> {
    let id = self.id.ok_or(ValidationError::MissingField("id"))?;
    let id = ImageId::new(id)?;

    let url = self.url.ok_or(ValidationError::MissingField("url"))?;
    if url.trim().is_empty() {
      return Err(ValidationError::Blank("url"));
    }

    let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
    for tag in self.tags {
      let tag = tag.trim();
      if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_owned());
      }
    }

    let source = self
      .source
      .filter(|s| !s.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_SOURCE.to_owned());

    Ok(NewImage {
      id,
      url,
      prompt: self.prompt.unwrap_or_default(),
      tags,
      source,
    })
  }
}

/// Parse a JSON array of records, as written by the ingestion scripts.
pub fn parse_batch(json: &str) -> serde_json::Result<Vec<IngestRecord>> {
  serde_json::from_str(json)
}

/// A record that failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
  /// Position of the record in the submitted batch.
  pub index:  usize,
  pub id:     Option<String>,
  pub reason: String,
}

/// Outcome of an ingestion batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
  /// Images actually inserted.
  pub inserted:   usize,
  /// Records whose id was already in the catalog.
  pub duplicates: usize,
  pub rejected:   Vec<Rejection>,
}
