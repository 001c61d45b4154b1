//! Handler for `GET /statistics`.

use axum::{Json, extract::State};
use tagger_core::{stats::Statistics, store::TaggerStore};

use crate::{ApiState, error::ApiError};

/// `GET /statistics`: read-only aggregate over the whole store.
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Statistics>, ApiError>
where
  S: TaggerStore + 'static,
{
  let stats = state.engine.statistics(state.recent_tagged_limit).await?;
  Ok(Json(stats))
}
