//! The rotation engine: per-session selection of unseen images, exposure
//! accounting, tag submission and the retirement policy.
//!
//! Selection flow: ensure session → candidates (active, not yet viewed by the
//! session) → uniform random pick → exposure (view + counter recompute +
//! retirement check) → return the image. The exposure is recorded before the
//! image is handed back, so fetching without ever submitting still counts.

use std::sync::Arc;

use rand::seq::IndexedRandom as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result, ValidationError,
  image::{Image, ImageCounters, ImageId},
  ingest::{IngestRecord, IngestReport, Rejection},
  ledger::{Exposure, NewBiasTag},
  session::{Session, SessionId},
  stats::{ImageDetails, Statistics},
  store::TaggerStore,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Moderation rule: an image seen by enough distinct sessions without a
/// single bias category is presumed unproblematic and leaves rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementPolicy {
  pub min_distinct_viewers: u64,
}

impl RetirementPolicy {
  pub const DEFAULT_MIN_DISTINCT_VIEWERS: u64 = 5;

  pub fn new(min_distinct_viewers: u64) -> Self { Self { min_distinct_viewers } }

  pub fn should_retire(&self, counters: &ImageCounters) -> bool {
    counters.unique_viewers >= self.min_distinct_viewers
      && counters.bias_tag_count == 0
  }
}

impl Default for RetirementPolicy {
  fn default() -> Self { Self::new(Self::DEFAULT_MIN_DISTINCT_VIEWERS) }
}

// ─── Tag submission outcome ──────────────────────────────────────────────────

/// A bias type that could not be recorded; the client may retry it alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFailure {
  pub bias_type: String,
  pub reason:    String,
}

/// Per-category result of [`RotationEngine::submit_tags`]. Recorded tags are
/// kept even when others fail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitOutcome {
  pub recorded:      Vec<String>,
  /// Categories this session had already applied to the image.
  pub duplicates:    Vec<String>,
  pub failed:        Vec<TagFailure>,
  /// Set when the tags were written but the image's counters could not be
  /// refreshed.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub recount_error: Option<String>,
}

impl SubmitOutcome {
  pub fn success(&self) -> bool { self.failed.is_empty() && self.recount_error.is_none() }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Orchestrates the catalog, session registry and ledgers of a
/// [`TaggerStore`].
pub struct RotationEngine<S> {
  store:  Arc<S>,
  policy: RetirementPolicy,
}

impl<S> Clone for RotationEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), policy: self.policy }
  }
}

impl<S: TaggerStore> RotationEngine<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, policy: RetirementPolicy::default() }
  }

  pub fn with_policy(mut self, policy: RetirementPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> RetirementPolicy { self.policy }

  pub fn store(&self) -> &S { &self.store }

  // ── Sessions ──────────────────────────────────────────────────────────

  pub async fn ensure_session(&self, session_id: SessionId) -> Result<Session> {
    self.store.ensure_session(session_id).await.map_err(Error::store)
  }

  /// Mint and register a new session id.
  pub async fn issue_session(&self) -> Result<Session> {
    self.ensure_session(SessionId::generate()).await
  }

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Validate and insert a batch. Malformed records are rejected one by one;
  /// ids already in the catalog are skipped. A store failure aborts the
  /// remainder of the batch, keeping what was already inserted.
  pub async fn ingest(&self, records: Vec<IngestRecord>) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for (index, record) in records.into_iter().enumerate() {
      let id = record.id.clone();
      let image = match record.validate() {
        Ok(image) => image,
        Err(e) => {
          warn!(index, id = ?id, error = %e, "rejected ingestion record");
          report.rejected.push(Rejection { index, id, reason: e.to_string() });
          continue;
        }
      };

      if self.store.insert_image(image).await.map_err(Error::store)? {
        report.inserted += 1;
      } else {
        report.duplicates += 1;
      }
    }

    info!(
      inserted = report.inserted,
      duplicates = report.duplicates,
      rejected = report.rejected.len(),
      "ingested image batch"
    );
    Ok(report)
  }

  // ── Rotation ──────────────────────────────────────────────────────────

  /// Pick an active image `session_id` has never been shown, record the
  /// exposure and return the image. `None` means the session has exhausted
  /// the pool.
  ///
  /// A candidate retired by another session between listing and exposure is
  /// dropped and the pick is repeated over the remaining candidates.
  pub async fn select_next(&self, session_id: SessionId) -> Result<Option<Image>> {
    self.ensure_session(session_id.clone()).await?;

    let mut candidates = self
      .store
      .active_candidates(session_id.clone())
      .await
      .map_err(Error::store)?;

    let image_id = loop {
      // Uniform over the candidate set; the store returns it unordered.
      let picked = {
        let mut rng = rand::rng();
        candidates.choose(&mut rng).cloned()
      };
      let Some(image_id) = picked else {
        debug!(session = %session_id, "no more images for session");
        return Ok(None);
      };

      if self.record_exposure(image_id.clone(), session_id.clone()).await?.is_some() {
        break image_id;
      }
      debug!(session = %session_id, image = %image_id, "candidate retired before exposure");
      candidates.retain(|id| id != &image_id);
    };

    let image = self
      .store
      .get_image(image_id.clone())
      .await
      .map_err(Error::store)?
      .ok_or(Error::ImageNotFound(image_id))?;

    debug!(session = %session_id, image = %image.id, "selected image");
    Ok(Some(image))
  }

  /// Record a view and refresh the image's counters, retiring it when the
  /// policy says so. A repeated view is tolerated and still refreshes.
  /// Returns `None` if the image is no longer active; nothing is written.
  pub async fn record_exposure(
    &self,
    image_id: ImageId,
    session_id: SessionId,
  ) -> Result<Option<Exposure>> {
    let Some(exposure) = self
      .store
      .record_exposure(image_id.clone(), session_id.clone(), self.policy)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    if !exposure.newly_recorded {
      debug!(session = %session_id, image = %image_id, "view already recorded");
    }
    if exposure.retired {
      info!(
        image = %image_id,
        unique_viewers = exposure.counters.unique_viewers,
        "image retired: viewed without any bias tags"
      );
    }
    Ok(Some(exposure))
  }

  /// Advisory only: the view was taken at selection time, nothing is written.
  pub fn skip_image(&self, session_id: &SessionId, image_id: &ImageId) {
    debug!(session = %session_id, image = %image_id, "image skipped");
  }

  // ── Tagging ───────────────────────────────────────────────────────────

  /// Record each distinct bias type as an independent unit, then recompute
  /// the image's counters. Failures are reported per bias type and do not
  /// roll back tags already recorded.
  pub async fn submit_tags(
    &self,
    image_id: ImageId,
    session_id: SessionId,
    bias_types: Vec<String>,
    notes: String,
  ) -> Result<SubmitOutcome> {
    if self
      .store
      .get_image(image_id.clone())
      .await
      .map_err(Error::store)?
      .is_none()
    {
      return Err(Error::ImageNotFound(image_id));
    }
    self.ensure_session(session_id.clone()).await?;

    let mut outcome = SubmitOutcome::default();
    let mut seen: Vec<String> = Vec::with_capacity(bias_types.len());

    for raw in bias_types {
      let bias_type = raw.trim().to_owned();
      if bias_type.is_empty() {
        outcome.failed.push(TagFailure {
          bias_type: raw,
          reason:    ValidationError::Blank("bias_type").to_string(),
        });
        continue;
      }
      if seen.contains(&bias_type) {
        continue;
      }
      seen.push(bias_type.clone());

      let tag = NewBiasTag {
        image_id:   image_id.clone(),
        session_id: session_id.clone(),
        bias_type:  bias_type.clone(),
        notes:      notes.clone(),
      };
      match self.store.record_tag(tag).await {
        Ok(true) => outcome.recorded.push(bias_type),
        Ok(false) => outcome.duplicates.push(bias_type),
        Err(e) => {
          warn!(
            image = %image_id, bias_type = %bias_type, error = %e,
            "failed to record bias tag"
          );
          outcome.failed.push(TagFailure { bias_type, reason: e.to_string() });
        }
      }
    }

    // The tags are already durable; a failed recount leaves stale counters
    // and is reported alongside the per-tag results.
    if let Err(e) = self.store.recompute_counters(image_id.clone()).await {
      warn!(image = %image_id, error = %e, "failed to recompute counters after tagging");
      outcome.recount_error = Some(e.to_string());
    }

    Ok(outcome)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn image_details(&self, image_id: ImageId) -> Result<ImageDetails> {
    self
      .store
      .image_details(image_id.clone())
      .await
      .map_err(Error::store)?
      .ok_or(Error::ImageNotFound(image_id))
  }

  pub async fn statistics(&self, recent_limit: usize) -> Result<Statistics> {
    self.store.statistics(recent_limit).await.map_err(Error::store)
  }

  pub async fn count_active(&self) -> Result<u64> {
    self.store.count_active().await.map_err(Error::store)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn counters(unique_viewers: u64, bias_tag_count: u64) -> ImageCounters {
    ImageCounters { view_count: unique_viewers, unique_viewers, bias_tag_count }
  }

  #[test]
  fn default_threshold_is_five() {
    assert_eq!(RetirementPolicy::default().min_distinct_viewers, 5);
  }

  #[test]
  fn retirement_boundary() {
    let policy = RetirementPolicy::default();
    assert!(!policy.should_retire(&counters(4, 0)));
    assert!(policy.should_retire(&counters(5, 0)));
    assert!(policy.should_retire(&counters(6, 0)));
    assert!(!policy.should_retire(&counters(5, 1)));
    assert!(!policy.should_retire(&counters(50, 3)));
  }

  #[test]
  fn submit_outcome_success_requires_no_failures() {
    let mut outcome = SubmitOutcome {
      recorded: vec!["gender".into()],
      ..Default::default()
    };
    assert!(outcome.success());
    outcome.failed.push(TagFailure { bias_type: "age".into(), reason: "disk".into() });
    assert!(!outcome.success());
  }

  #[test]
  fn submit_outcome_fails_on_stale_counters() {
    let outcome = SubmitOutcome {
      recorded: vec!["gender".into()],
      recount_error: Some("database is locked".into()),
      ..Default::default()
    };
    assert!(!outcome.success());
  }
}
