//! Handlers for `/images` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/images` | Body: JSON array of ingestion records; returns an ingest report |
//! | `GET`  | `/images/:id` | Image with per-category tag counts; 404 if not found |

use axum::{
  Json,
  extract::{Path, State},
};
use tagger_core::{
  image::ImageId,
  ingest::{IngestRecord, IngestReport},
  stats::ImageDetails,
  store::TaggerStore,
};

use crate::{ApiState, error::ApiError};

/// `POST /images`: insert-if-absent for each record.
pub async fn ingest<S>(
  State(state): State<ApiState<S>>,
  Json(records): Json<Vec<IngestRecord>>,
) -> Result<Json<IngestReport>, ApiError>
where
  S: TaggerStore + 'static,
{
  let report = state.engine.ingest(records).await?;
  Ok(Json(report))
}

/// `GET /images/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
) -> Result<Json<ImageDetails>, ApiError>
where
  S: TaggerStore + 'static,
{
  let id = ImageId::new(id)?;
  let details = state.engine.image_details(id).await?;
  Ok(Json(details))
}
