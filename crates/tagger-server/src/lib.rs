//! Server assembly for the bias tagger: configuration, seed loading and the
//! top-level router.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use axum::Router;
use serde::Deserialize;
use tagger_core::{
  ingest::{IngestReport, parse_batch},
  rotation::RotationEngine,
  store::TaggerStore,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TAGGER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  /// JSON array of ingestion records loaded when the catalog has no active
  /// images at startup.
  pub seed_path:            Option<PathBuf>,
  /// Directory served under `/images` for catalog entries with local paths.
  pub images_dir:           PathBuf,
  pub retirement_threshold: u64,
  pub recent_tagged_limit:  usize,
}

impl ServerConfig {
  /// Layer defaults, the optional TOML file at `path`, and the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("host", "0.0.0.0")?
      .set_default("port", 5000)?
      .set_default("store_path", "data/bias_tagger.db")?
      .set_default("images_dir", "images")?
      .set_default("retirement_threshold", 5)?
      .set_default("recent_tagged_limit", 10)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("TAGGER"))
      .build()?
      .try_deserialize()
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Ingestion helpers ────────────────────────────────────────────────────────

/// Ingest a JSON file of records.
pub async fn ingest_file<S>(engine: &RotationEngine<S>, path: &Path) -> anyhow::Result<IngestReport>
where
  S: TaggerStore,
{
  let json = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {path:?}"))?;
  let records = parse_batch(&json).with_context(|| format!("failed to parse {path:?}"))?;
  let report = engine.ingest(records).await?;
  Ok(report)
}

/// Load `seed_path` when no active image exists. Returns `None` when the
/// catalog already had active images.
pub async fn seed_if_empty<S>(
  engine: &RotationEngine<S>,
  seed_path: &Path,
) -> anyhow::Result<Option<IngestReport>>
where
  S: TaggerStore,
{
  if engine.count_active().await? > 0 {
    return Ok(None);
  }
  tracing::info!("catalog is empty; loading seed images from {seed_path:?}");
  ingest_file(engine, seed_path).await.map(Some)
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API nested under `/api` and local image files under `/images`, open
/// to cross-origin front ends, with request tracing.
pub fn router<S>(engine: RotationEngine<S>, config: &ServerConfig) -> Router
where
  S: TaggerStore + 'static,
{
  Router::new()
    .nest("/api", tagger_api::api_router(engine, config.recent_tagged_limit))
    .nest_service("/images", ServeDir::new(expand_tilde(&config.images_dir)))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}
