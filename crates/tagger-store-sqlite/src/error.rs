//! Error type for `tagger-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored identifier no longer passes validation.
  #[error("invalid stored value: {0}")]
  Invalid(#[from] tagger_core::ValidationError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown image status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
