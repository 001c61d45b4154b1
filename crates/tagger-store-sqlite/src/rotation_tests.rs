//! End-to-end tests of `RotationEngine` over an in-memory `SqliteStore`.

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use tagger_core::{
  Error as CoreError,
  image::{Image, ImageCounters, ImageId, NewImage},
  ingest::IngestRecord,
  ledger::{BiasTag, Exposure, NewBiasTag},
  rotation::{RetirementPolicy, RotationEngine},
  session::{Session, SessionId},
  stats::{ImageDetails, Statistics},
  store::TaggerStore,
};

use crate::SqliteStore;

async fn engine() -> RotationEngine<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  RotationEngine::new(Arc::new(store))
}

fn image_id(id: &str) -> ImageId { ImageId::new(id).unwrap() }

fn session(id: &str) -> SessionId { SessionId::new(id).unwrap() }

fn record(id: &str) -> IngestRecord {
  IngestRecord {
    id: Some(id.into()),
    url: Some(format!("/images/{id}.jpg")),
    ..Default::default()
  }
}

async fn ingest<S: TaggerStore>(engine: &RotationEngine<S>, ids: &[&str]) {
  let report = engine
    .ingest(ids.iter().map(|id| record(id)).collect())
    .await
    .unwrap();
  assert_eq!(report.inserted, ids.len());
}

async fn status_of(engine: &RotationEngine<SqliteStore>, id: &str) -> Image {
  engine.store().get_image(image_id(id)).await.unwrap().unwrap()
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_reports_duplicates_and_rejections() {
  let e = engine().await;
  ingest(&e, &["img_A"]).await;

  let report = e
    .ingest(vec![
      record("img_A"),
      IngestRecord { url: Some("/images/x.jpg".into()), ..Default::default() },
      record("img_B"),
      IngestRecord { id: Some("img_C".into()), ..Default::default() },
    ])
    .await
    .unwrap();

  assert_eq!(report.inserted, 1);
  assert_eq!(report.duplicates, 1);
  assert_eq!(report.rejected.len(), 2);
  assert_eq!(report.rejected[0].index, 1);
  assert_eq!(report.rejected[1].index, 3);
  assert_eq!(report.rejected[1].id.as_deref(), Some("img_C"));
  assert_eq!(e.count_active().await.unwrap(), 2);
}

// ─── Selection ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_never_sees_an_image_twice() {
  let e = engine().await;
  let ids = ["img_1", "img_2", "img_3", "img_4", "img_5", "img_6"];
  ingest(&e, &ids).await;

  let mut seen = HashSet::new();
  for _ in 0..ids.len() {
    let image = e.select_next(session("s1")).await.unwrap().unwrap();
    assert!(seen.insert(image.id.clone()), "repeated {}", image.id);
  }
  assert_eq!(seen.len(), ids.len());

  for _ in 0..3 {
    assert!(e.select_next(session("s1")).await.unwrap().is_none());
  }
  assert_eq!(e.store().viewed_images(session("s1")).await.unwrap(), seen);
}

#[tokio::test]
async fn empty_catalog_yields_none_and_registers_session() {
  let e = engine().await;
  assert!(e.select_next(session("s1")).await.unwrap().is_none());
  // The session row exists, so ensuring it again keeps its creation time.
  let touched = e.ensure_session(session("s1")).await.unwrap();
  assert!(touched.last_active >= touched.created_at);
}

#[tokio::test]
async fn selection_is_uniform_across_candidates() {
  let e = engine().await.with_policy(RetirementPolicy::new(u64::MAX));
  ingest(&e, &["img_A", "img_B", "img_C"]).await;

  let mut counts = [0usize; 3];
  for n in 0..600 {
    let image = e
      .select_next(session(&format!("visitor-{n}")))
      .await
      .unwrap()
      .unwrap();
    match image.id.as_str() {
      "img_A" => counts[0] += 1,
      "img_B" => counts[1] += 1,
      _ => counts[2] += 1,
    }
  }
  // Expected 200 each; 120 is about seven standard deviations away.
  assert!(counts.iter().all(|&c| c > 120), "skewed selection: {counts:?}");
}

// ─── Retirement ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn five_untagged_viewers_retire_the_only_image() {
  let e = engine().await;
  ingest(&e, &["img_A"]).await;

  for n in 1..=4 {
    let image = e.select_next(session(&format!("s{n}"))).await.unwrap().unwrap();
    assert_eq!(image.id, image_id("img_A"));
    assert!(image.is_active(), "retired after {n} viewers");
  }

  let fifth = e.select_next(session("s5")).await.unwrap().unwrap();
  assert_eq!(fifth.id, image_id("img_A"));
  assert!(!fifth.is_active());
  assert_eq!(fifth.counters.unique_viewers, 5);

  assert!(e.select_next(session("s6")).await.unwrap().is_none());
}

#[tokio::test]
async fn tagged_image_survives_fifth_viewer() {
  let e = engine().await;
  ingest(&e, &["img_B"]).await;

  e.select_next(session("s1")).await.unwrap().unwrap();
  let outcome = e
    .submit_tags(image_id("img_B"), session("s1"), vec!["gender".into()], String::new())
    .await
    .unwrap();
  assert!(outcome.success());

  for n in 2..=8 {
    let image = e.select_next(session(&format!("s{n}"))).await.unwrap().unwrap();
    assert_eq!(image.id, image_id("img_B"));
  }

  let image = status_of(&e, "img_B").await;
  assert!(image.is_active());
  assert_eq!(image.counters.unique_viewers, 8);
  assert_eq!(image.counters.bias_tag_count, 1);
}

#[tokio::test]
async fn retired_image_stays_out_of_rotation() {
  let e = engine().await;
  ingest(&e, &["img_A"]).await;
  for n in 1..=5 {
    e.select_next(session(&format!("s{n}"))).await.unwrap();
  }

  // A late tag plus a recount does not bring it back.
  e.submit_tags(image_id("img_A"), session("s1"), vec!["age".into()], String::new())
    .await
    .unwrap();
  e.store().recompute_counters(image_id("img_A")).await.unwrap();

  assert!(!status_of(&e, "img_A").await.is_active());
  assert!(e.select_next(session("late")).await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_exposure_keeps_counters_consistent() {
  let e = engine().await;
  ingest(&e, &["img_A"]).await;

  e.select_next(session("s1")).await.unwrap().unwrap();
  let again = e
    .record_exposure(image_id("img_A"), session("s1"))
    .await
    .unwrap()
    .unwrap();
  assert!(!again.newly_recorded);
  assert_eq!(again.counters.unique_viewers, 1);
  assert_eq!(
    e.store().distinct_viewer_count(image_id("img_A")).await.unwrap(),
    1
  );
}

#[tokio::test]
async fn skip_writes_nothing() {
  let e = engine().await;
  ingest(&e, &["img_A", "img_B"]).await;

  let image = e.select_next(session("s1")).await.unwrap().unwrap();
  e.skip_image(&session("s1"), &image.id);

  let after = status_of(&e, image.id.as_str()).await;
  assert_eq!(after.counters.view_count, 1);
  assert_eq!(e.store().viewed_images(session("s1")).await.unwrap().len(), 1);
}

// ─── Tag submission ──────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_collapses_duplicates_and_reports_blanks() {
  let e = engine().await;
  ingest(&e, &["img_A"]).await;

  let outcome = e
    .submit_tags(
      image_id("img_A"),
      session("s1"),
      vec!["gender".into(), "race".into(), "gender".into(), "  ".into()],
      "all men in suits".into(),
    )
    .await
    .unwrap();

  assert_eq!(outcome.recorded, ["gender", "race"]);
  assert!(outcome.duplicates.is_empty());
  assert_eq!(outcome.failed.len(), 1);
  assert!(!outcome.success());

  let resubmit = e
    .submit_tags(image_id("img_A"), session("s1"), vec!["gender".into()], String::new())
    .await
    .unwrap();
  assert!(resubmit.success());
  assert_eq!(resubmit.duplicates, ["gender"]);

  let tags = e.store().list_tags(image_id("img_A")).await.unwrap();
  assert_eq!(tags.len(), 2);
  assert_eq!(status_of(&e, "img_A").await.counters.bias_tag_count, 2);
}

#[tokio::test]
async fn submit_for_unknown_image_is_not_found() {
  let e = engine().await;
  let err = e
    .submit_tags(image_id("ghost"), session("s1"), vec!["gender".into()], String::new())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::ImageNotFound(ref id) if id.as_str() == "ghost"));
}

// ─── Injected faults ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error(transparent)]
  Inner(#[from] crate::Error),
  #[error("injected write failure")]
  Injected,
}

/// What a [`FlakyStore`] does differently from the store it wraps.
#[derive(Default)]
struct Faults {
  /// Fail every tag write of this category.
  tag_category:         Option<&'static str>,
  /// Fail every counter recount.
  recount:              bool,
  /// Right after the first candidate listing, retire this image by exposing
  /// it to enough other sessions.
  retire_after_listing: Option<&'static str>,
}

/// Delegates to `SqliteStore`, injecting [`Faults`].
struct FlakyStore {
  inner:  SqliteStore,
  faults: Faults,
  raced:  AtomicBool,
}

async fn flaky_engine(faults: Faults) -> RotationEngine<FlakyStore> {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  RotationEngine::new(Arc::new(FlakyStore { inner, faults, raced: AtomicBool::new(false) }))
}

impl FlakyStore {
  async fn retire_behind_the_scenes(&self, target: &str) -> Result<(), FlakyError> {
    let policy = RetirementPolicy::default();
    for n in 0..policy.min_distinct_viewers {
      let rival = SessionId::new(format!("rival-{n}")).map_err(crate::Error::from)?;
      let image = ImageId::new(target).map_err(crate::Error::from)?;
      self.inner.ensure_session(rival.clone()).await?;
      self.inner.record_exposure(image, rival, policy).await?;
    }
    Ok(())
  }
}

impl TaggerStore for FlakyStore {
  type Error = FlakyError;

  async fn insert_image(&self, image: NewImage) -> Result<bool, FlakyError> {
    Ok(self.inner.insert_image(image).await?)
  }

  async fn get_image(&self, id: ImageId) -> Result<Option<Image>, FlakyError> {
    Ok(self.inner.get_image(id).await?)
  }

  async fn active_candidates(&self, session_id: SessionId) -> Result<Vec<ImageId>, FlakyError> {
    let candidates = self.inner.active_candidates(session_id).await?;
    if let Some(target) = self.faults.retire_after_listing
      && !self.raced.swap(true, Ordering::SeqCst)
    {
      self.retire_behind_the_scenes(target).await?;
    }
    Ok(candidates)
  }

  async fn count_active(&self) -> Result<u64, FlakyError> {
    Ok(self.inner.count_active().await?)
  }

  async fn retire(&self, id: ImageId) -> Result<bool, FlakyError> {
    Ok(self.inner.retire(id).await?)
  }

  async fn recompute_counters(&self, id: ImageId) -> Result<Option<ImageCounters>, FlakyError> {
    if self.faults.recount {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.recompute_counters(id).await?)
  }

  async fn ensure_session(&self, id: SessionId) -> Result<Session, FlakyError> {
    Ok(self.inner.ensure_session(id).await?)
  }

  async fn record_view(&self, image_id: ImageId, session_id: SessionId) -> Result<bool, FlakyError> {
    Ok(self.inner.record_view(image_id, session_id).await?)
  }

  async fn viewed_images(&self, session_id: SessionId) -> Result<HashSet<ImageId>, FlakyError> {
    Ok(self.inner.viewed_images(session_id).await?)
  }

  async fn distinct_viewer_count(&self, image_id: ImageId) -> Result<u64, FlakyError> {
    Ok(self.inner.distinct_viewer_count(image_id).await?)
  }

  async fn record_exposure(
    &self,
    image_id: ImageId,
    session_id: SessionId,
    policy: RetirementPolicy,
  ) -> Result<Option<Exposure>, FlakyError> {
    Ok(self.inner.record_exposure(image_id, session_id, policy).await?)
  }

  async fn record_tag(&self, tag: NewBiasTag) -> Result<bool, FlakyError> {
    if self.faults.tag_category == Some(tag.bias_type.as_str()) {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.record_tag(tag).await?)
  }

  async fn list_tags(&self, image_id: ImageId) -> Result<Vec<BiasTag>, FlakyError> {
    Ok(self.inner.list_tags(image_id).await?)
  }

  async fn distinct_category_count(&self, image_id: ImageId) -> Result<u64, FlakyError> {
    Ok(self.inner.distinct_category_count(image_id).await?)
  }

  async fn image_details(&self, id: ImageId) -> Result<Option<ImageDetails>, FlakyError> {
    Ok(self.inner.image_details(id).await?)
  }

  async fn statistics(&self, recent_limit: usize) -> Result<Statistics, FlakyError> {
    Ok(self.inner.statistics(recent_limit).await?)
  }
}

#[tokio::test]
async fn image_retired_during_selection_is_not_served() {
  let e = flaky_engine(Faults {
    retire_after_listing: Some("img_A"),
    ..Default::default()
  })
  .await;
  ingest(&e, &["img_A"]).await;

  assert!(e.select_next(session("late")).await.unwrap().is_none());

  let image = e.store().get_image(image_id("img_A")).await.unwrap().unwrap();
  assert!(!image.is_active());
  assert_eq!(image.counters.unique_viewers, 5);
  assert!(e.store().viewed_images(session("late")).await.unwrap().is_empty());
}

#[tokio::test]
async fn selection_falls_back_when_candidate_is_retired() {
  let e = flaky_engine(Faults {
    retire_after_listing: Some("img_A"),
    ..Default::default()
  })
  .await;
  ingest(&e, &["img_A", "img_B"]).await;

  let image = e.select_next(session("late")).await.unwrap().unwrap();
  assert_eq!(image.id, image_id("img_B"));
  assert!(image.is_active());

  let viewed = e.store().viewed_images(session("late")).await.unwrap();
  assert_eq!(viewed, HashSet::from([image_id("img_B")]));
}

#[tokio::test]
async fn failed_tag_does_not_roll_back_the_others() {
  let e = flaky_engine(Faults { tag_category: Some("age"), ..Default::default() }).await;
  ingest(&e, &["img_A"]).await;

  let outcome = e
    .submit_tags(
      image_id("img_A"),
      session("s1"),
      vec!["gender".into(), "age".into(), "race".into()],
      String::new(),
    )
    .await
    .unwrap();

  assert!(!outcome.success());
  assert_eq!(outcome.recorded, ["gender", "race"]);
  assert_eq!(outcome.failed.len(), 1);
  assert_eq!(outcome.failed[0].bias_type, "age");
  assert_eq!(outcome.failed[0].reason, "injected write failure");

  let image = e.store().get_image(image_id("img_A")).await.unwrap().unwrap();
  assert_eq!(image.counters.bias_tag_count, 2);
}

#[tokio::test]
async fn failed_recount_keeps_the_tag_outcome() {
  let e = flaky_engine(Faults { recount: true, ..Default::default() }).await;
  ingest(&e, &["img_A"]).await;

  let outcome = e
    .submit_tags(
      image_id("img_A"),
      session("s1"),
      vec!["gender".into(), "race".into()],
      String::new(),
    )
    .await
    .unwrap();

  assert!(!outcome.success());
  assert_eq!(outcome.recorded, ["gender", "race"]);
  assert!(outcome.failed.is_empty());
  assert_eq!(outcome.recount_error.as_deref(), Some("injected write failure"));
  assert_eq!(e.store().list_tags(image_id("img_A")).await.unwrap().len(), 2);
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issued_sessions_are_registered_and_distinct() {
  let e = engine().await;
  let a = e.issue_session().await.unwrap();
  let b = e.issue_session().await.unwrap();
  assert_ne!(a.session_id, b.session_id);

  let again = e.ensure_session(a.session_id.clone()).await.unwrap();
  assert_eq!(again.created_at, a.created_at);
}
