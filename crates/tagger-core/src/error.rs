//! Error types for `tagger-core`.

use thiserror::Error;

use crate::image::ImageId;

/// A required field was missing or blank. Rejected locally; never aborts a
/// batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("field {0} must not be blank")]
  Blank(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("image not found: {0}")]
  ImageNotFound(ImageId),

  /// The backing store failed for infrastructure reasons.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
