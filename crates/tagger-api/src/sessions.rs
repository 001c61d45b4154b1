//! Handler for `POST /sessions`.
//!
//! Issues a fresh anonymous session id. Front ends that mint their own ids
//! may skip this; every other endpoint registers unknown sessions on first
//! use.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tagger_core::store::TaggerStore;

use crate::{ApiState, error::ApiError};

/// `POST /sessions`: returns 201 and the registered session.
pub async fn create<S>(State(state): State<ApiState<S>>) -> Result<impl IntoResponse, ApiError>
where
  S: TaggerStore + 'static,
{
  let session = state.engine.issue_session().await?;
  Ok((StatusCode::CREATED, Json(session)))
}
