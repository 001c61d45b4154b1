//! Handlers for the tagging loop.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/next-image` | `?session_id` required; `image: null, has_more: false` once exhausted |
//! | `POST` | `/submit-tags` | Body: [`SubmitTagsBody`]; 500 with per-tag detail on partial failure |
//! | `POST` | `/skip-image` | Body: [`SkipBody`]; acknowledgement only |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tagger_core::{
  image::{Image, ImageId},
  rotation::SubmitOutcome,
  session::SessionId,
  store::TaggerStore,
};

use crate::{
  ApiState,
  error::{ApiError, required},
};

// ─── Next image ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NextImageParams {
  pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextImageResponse {
  pub image:    Option<Image>,
  pub has_more: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message:  Option<String>,
}

/// `GET /next-image?session_id=<id>`
pub async fn next_image<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<NextImageParams>,
) -> Result<Json<NextImageResponse>, ApiError>
where
  S: TaggerStore + 'static,
{
  let session_id: SessionId = required(params.session_id, "session_id")?;

  let response = match state.engine.select_next(session_id).await? {
    Some(image) => NextImageResponse { image: Some(image), has_more: true, message: None },
    None => NextImageResponse {
      image:    None,
      has_more: false,
      message:  Some("No more images available".into()),
    },
  };
  Ok(Json(response))
}

// ─── Submit tags ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitTagsBody {
  pub session_id: Option<String>,
  pub image_id:   Option<String>,
  #[serde(default)]
  pub bias_tags:  Vec<String>,
  #[serde(default)]
  pub notes:      String,
}

#[derive(Debug, Serialize)]
pub struct SubmitTagsResponse {
  pub success: bool,
  pub message: String,
  #[serde(flatten)]
  pub outcome: SubmitOutcome,
}

/// `POST /submit-tags`
pub async fn submit_tags<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<SubmitTagsBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TaggerStore + 'static,
{
  let session_id: SessionId = required(body.session_id, "session_id")?;
  let image_id: ImageId = required(body.image_id, "image_id")?;

  let outcome = state
    .engine
    .submit_tags(image_id, session_id, body.bias_tags, body.notes)
    .await?;

  let (status, message) = if outcome.success() {
    (StatusCode::OK, "Tags submitted successfully")
  } else {
    (StatusCode::INTERNAL_SERVER_ERROR, "Error submitting some tags")
  };
  Ok((
    status,
    Json(SubmitTagsResponse {
      success: outcome.success(),
      message: message.to_owned(),
      outcome,
    }),
  ))
}

// ─── Skip ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SkipBody {
  pub session_id: Option<String>,
  pub image_id:   Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
  pub success: bool,
  pub message: String,
}

/// `POST /skip-image`. The view was recorded at selection time; nothing is
/// written here.
pub async fn skip_image<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<SkipBody>,
) -> Result<Json<Ack>, ApiError>
where
  S: TaggerStore + 'static,
{
  let session_id: SessionId = required(body.session_id, "session_id")?;
  let image_id: ImageId = required(body.image_id, "image_id")?;

  state.engine.skip_image(&session_id, &image_id);
  Ok(Json(Ack { success: true, message: "Image skipped".into() }))
}
