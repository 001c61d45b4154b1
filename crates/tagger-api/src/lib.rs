//! JSON REST API for the bias tagger.
//!
//! Exposes an axum [`Router`] backed by a [`RotationEngine`] over any
//! [`TaggerStore`]. Sessions are passed explicitly in every request; cookies,
//! page rendering and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tagger_api::api_router(engine, 10))
//! ```

pub mod error;
pub mod images;
pub mod rotation;
pub mod sessions;
pub mod statistics;

use axum::{
  Router,
  routing::{get, post},
};
use tagger_core::{rotation::RotationEngine, store::TaggerStore};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub engine:              RotationEngine<S>,
  /// Bound on `recent_tagged` in `/statistics`.
  pub recent_tagged_limit: usize,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      engine:              self.engine.clone(),
      recent_tagged_limit: self.recent_tagged_limit,
    }
  }
}

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: RotationEngine<S>, recent_tagged_limit: usize) -> Router<()>
where
  S: TaggerStore + 'static,
{
  Router::new()
    // Sessions
    .route("/sessions", post(sessions::create::<S>))
    // Rotation
    .route("/next-image", get(rotation::next_image::<S>))
    .route("/submit-tags", post(rotation::submit_tags::<S>))
    .route("/skip-image", post(rotation::skip_image::<S>))
    // Catalog
    .route("/images", post(images::ingest::<S>))
    .route("/images/{id}", get(images::get_one::<S>))
    // Statistics
    .route("/statistics", get(statistics::handler::<S>))
    .with_state(ApiState { engine, recent_tagged_limit })
}
