//! Read-only aggregates over the catalog and ledgers.

use serde::{Deserialize, Serialize};

use crate::image::{Image, ImageId};

/// Number of submissions recorded for one bias category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasTypeCount {
  pub bias_type: String,
  pub count:     u64,
}

/// An image summarised by the bias categories applied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedImage {
  pub id:         ImageId,
  pub url:        String,
  pub prompt:     String,
  /// Distinct categories, alphabetical.
  pub bias_types: Vec<String>,
  pub tag_count:  u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
  pub active_images: u64,
  pub total_views:   u64,
  /// Images with at least one bias category.
  pub tagged_images: u64,
  /// Ordered by count, most frequent first.
  pub bias_types:    Vec<BiasTypeCount>,
  /// Most recently tagged first.
  pub recent_tagged: Vec<TaggedImage>,
  pub most_tagged:   Option<TaggedImage>,
}

/// An image together with its per-category submission counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDetails {
  pub image:     Image,
  pub bias_tags: Vec<BiasTypeCount>,
}
