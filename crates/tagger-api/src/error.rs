//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tagger_core::ValidationError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<tagger_core::Error> for ApiError {
  fn from(e: tagger_core::Error) -> Self {
    match e {
      tagger_core::Error::Validation(v) => ApiError::BadRequest(v.to_string()),
      tagger_core::Error::ImageNotFound(id) => {
        ApiError::NotFound(format!("image {id} not found"))
      }
      tagger_core::Error::Store(inner) => ApiError::Store(inner),
    }
  }
}

impl From<ValidationError> for ApiError {
  fn from(e: ValidationError) -> Self { ApiError::BadRequest(e.to_string()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

/// Turn an optional request field into a validated id.
pub(crate) fn required<T>(value: Option<String>, field: &'static str) -> Result<T, ApiError>
where
  T: TryFrom<String, Error = ValidationError>,
{
  let value = value.ok_or(ValidationError::MissingField(field))?;
  Ok(T::try_from(value)?)
}
