//! View and bias-tag ledgers.
//!
//! Both ledgers are append-only. Uniqueness is enforced by the store itself:
//! one view per `(image, session)` and one tag per
//! `(image, session, bias_type)`. A duplicate write is absorbed, not reported
//! as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  image::{ImageCounters, ImageId},
  session::SessionId,
};

/// "Session S judged image I as exhibiting bias category B."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasTag {
  pub image_id:   ImageId,
  pub session_id: SessionId,
  pub bias_type:  String,
  pub notes:      String,
  pub created_at: DateTime<Utc>,
}

/// Input for [`TaggerStore::record_tag`](crate::store::TaggerStore::record_tag).
#[derive(Debug, Clone)]
pub struct NewBiasTag {
  pub image_id:   ImageId,
  pub session_id: SessionId,
  pub bias_type:  String,
  pub notes:      String,
}

/// Result of an exposure: the view write, the refreshed counters, and whether
/// this exposure retired the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
  /// `false` when the session had already viewed the image.
  pub newly_recorded: bool,
  pub counters:       ImageCounters,
  pub retired:        bool,
}
