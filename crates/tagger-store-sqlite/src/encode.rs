//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision) so they sort lexically. Tag lists are compact JSON arrays.

use chrono::{DateTime, SecondsFormat, Utc};
use tagger_core::{
  image::{Image, ImageCounters, ImageId, ImageStatus},
  ledger::BiasTag,
  session::{Session, SessionId},
  stats::TaggedImage,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ImageStatus ─────────────────────────────────────────────────────────────

pub fn encode_status(s: ImageStatus) -> &'static str {
  match s {
    ImageStatus::Active => "active",
    ImageStatus::Deleted => "deleted",
  }
}

pub fn decode_status(s: &str) -> Result<ImageStatus> {
  match s {
    "active" => Ok(ImageStatus::Active),
    "deleted" => Ok(ImageStatus::Deleted),
    other => Err(Error::UnknownStatus(other.to_owned())),
  }
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

/// SQLite integers are signed; counts are never negative.
pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawImage::from_row`].
pub const IMAGE_COLUMNS: &str = "image_id, url, prompt, tags, source, \
   view_count, unique_viewers, bias_tag_count, status, created_at, deleted_at";

/// Raw values read directly from an `images` row.
pub struct RawImage {
  pub image_id:       String,
  pub url:            String,
  pub prompt:         String,
  pub tags:           String,
  pub source:         String,
  pub view_count:     i64,
  pub unique_viewers: i64,
  pub bias_tag_count: i64,
  pub status:         String,
  pub created_at:     String,
  pub deleted_at:     Option<String>,
}

impl RawImage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      image_id:       row.get(0)?,
      url:            row.get(1)?,
      prompt:         row.get(2)?,
      tags:           row.get(3)?,
      source:         row.get(4)?,
      view_count:     row.get(5)?,
      unique_viewers: row.get(6)?,
      bias_tag_count: row.get(7)?,
      status:         row.get(8)?,
      created_at:     row.get(9)?,
      deleted_at:     row.get(10)?,
    })
  }

  pub fn into_image(self) -> Result<Image> {
    Ok(Image {
      id:         ImageId::new(self.image_id)?,
      url:        self.url,
      prompt:     self.prompt,
      tags:       decode_tags(&self.tags)?,
      source:     self.source,
      status:     decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      deleted_at: self.deleted_at.as_deref().map(decode_dt).transpose()?,
      counters:   ImageCounters {
        view_count:     decode_count(self.view_count),
        unique_viewers: decode_count(self.unique_viewers),
        bias_tag_count: decode_count(self.bias_tag_count),
      },
    })
  }
}

/// Raw strings read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:  String,
  pub created_at:  String,
  pub last_active: String,
}

impl RawSession {
  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      session_id:  SessionId::new(self.session_id)?,
      created_at:  decode_dt(&self.created_at)?,
      last_active: decode_dt(&self.last_active)?,
    })
  }
}

/// Raw strings read directly from a `bias_tags` row.
pub struct RawBiasTag {
  pub image_id:   String,
  pub session_id: String,
  pub bias_type:  String,
  pub notes:      String,
  pub created_at: String,
}

impl RawBiasTag {
  pub fn into_tag(self) -> Result<BiasTag> {
    Ok(BiasTag {
      image_id:   ImageId::new(self.image_id)?,
      session_id: SessionId::new(self.session_id)?,
      bias_type:  self.bias_type,
      notes:      self.notes,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// An `images` row joined with the JSON array of its distinct bias types.
pub struct RawTaggedImage {
  pub image_id:   String,
  pub url:        String,
  pub prompt:     String,
  pub bias_types: String,
  pub tag_count:  i64,
}

impl RawTaggedImage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      image_id:   row.get(0)?,
      url:        row.get(1)?,
      prompt:     row.get(2)?,
      bias_types: row.get(3)?,
      tag_count:  row.get(4)?,
    })
  }

  pub fn into_tagged(self) -> Result<TaggedImage> {
    let mut bias_types = decode_tags(&self.bias_types)?;
    bias_types.sort();
    Ok(TaggedImage {
      id: ImageId::new(self.image_id)?,
      url: self.url,
      prompt: self.prompt,
      bias_types,
      tag_count: decode_count(self.tag_count),
    })
  }
}
