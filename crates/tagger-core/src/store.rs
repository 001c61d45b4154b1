//! The `TaggerStore` trait.
//!
//! Implemented by storage backends (e.g. `tagger-store-sqlite`). The
//! [`RotationEngine`](crate::rotation::RotationEngine) and the API layer depend
//! on this abstraction, not on any concrete backend.
//!
//! Backends must enforce the ledger uniqueness constraints themselves and must
//! make each method atomic with respect to concurrent calls touching the same
//! image.

use std::{collections::HashSet, future::Future};

use crate::{
  image::{Image, ImageCounters, ImageId, NewImage},
  ledger::{BiasTag, Exposure, NewBiasTag},
  rotation::RetirementPolicy,
  session::{Session, SessionId},
  stats::{ImageDetails, Statistics},
};

/// Abstraction over a bias tagger storage backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait TaggerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Insert an image unless its id is already present. Returns `true` if a
  /// row was inserted; an existing image is never overwritten.
  fn insert_image(
    &self,
    image: NewImage,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_image(
    &self,
    id: ImageId,
  ) -> impl Future<Output = Result<Option<Image>, Self::Error>> + Send + '_;

  /// Ids of active images the session has not viewed, in no particular order.
  fn active_candidates(
    &self,
    session_id: SessionId,
  ) -> impl Future<Output = Result<Vec<ImageId>, Self::Error>> + Send + '_;

  fn count_active(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Transition an image to deleted, stamping the deletion time. Returns
  /// `true` only for the call that performed the transition.
  fn retire(
    &self,
    id: ImageId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Recompute and persist the cached counters from the ledgers. Never
  /// touches the lifecycle status. Returns `None` for an unknown image.
  fn recompute_counters(
    &self,
    id: ImageId,
  ) -> impl Future<Output = Result<Option<ImageCounters>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Create the session if absent, otherwise refresh its last-active time.
  fn ensure_session(
    &self,
    id: SessionId,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  // ── View ledger ───────────────────────────────────────────────────────

  /// Record that `session_id` was shown `image_id`. Returns `false` when the
  /// pair already existed.
  fn record_view(
    &self,
    image_id: ImageId,
    session_id: SessionId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn viewed_images(
    &self,
    session_id: SessionId,
  ) -> impl Future<Output = Result<HashSet<ImageId>, Self::Error>> + Send + '_;

  fn distinct_viewer_count(
    &self,
    image_id: ImageId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Record a view, recompute the image's counters and apply `policy`, as
  /// one atomic unit. Returns `None` without writing anything when the image
  /// is not active at that point (retired by a concurrent exposure, or
  /// unknown).
  fn record_exposure(
    &self,
    image_id: ImageId,
    session_id: SessionId,
    policy: RetirementPolicy,
  ) -> impl Future<Output = Result<Option<Exposure>, Self::Error>> + Send + '_;

  // ── Bias tag ledger ───────────────────────────────────────────────────

  /// Record a judgment. Returns `false` when the
  /// `(image, session, bias_type)` triple already existed.
  fn record_tag(
    &self,
    tag: NewBiasTag,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_tags(
    &self,
    image_id: ImageId,
  ) -> impl Future<Output = Result<Vec<BiasTag>, Self::Error>> + Send + '_;

  fn distinct_category_count(
    &self,
    image_id: ImageId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn image_details(
    &self,
    id: ImageId,
  ) -> impl Future<Output = Result<Option<ImageDetails>, Self::Error>> + Send + '_;

  /// Aggregate statistics; `recent_limit` bounds
  /// [`Statistics::recent_tagged`].
  fn statistics(
    &self,
    recent_limit: usize,
  ) -> impl Future<Output = Result<Statistics, Self::Error>> + Send + '_;
}
