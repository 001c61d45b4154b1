//! [`SqliteStore`]: the SQLite implementation of [`TaggerStore`].

use std::{collections::HashSet, path::Path};

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use tagger_core::{
  image::{Image, ImageCounters, ImageId, ImageStatus, NewImage},
  ledger::{BiasTag, Exposure, NewBiasTag},
  rotation::RetirementPolicy,
  session::{Session, SessionId},
  stats::{BiasTypeCount, ImageDetails, Statistics},
  store::TaggerStore,
};

use crate::{
  Result,
  encode::{
    IMAGE_COLUMNS, RawBiasTag, RawImage, RawSession, RawTaggedImage, decode_count,
    encode_dt, encode_status, encode_tags,
  },
  schema::SCHEMA,
};

// ─── Statement helpers ───────────────────────────────────────────────────────
//
// Shared by the single-purpose trait methods and by `record_exposure`, which
// runs several of them inside one transaction.

/// `INSERT ... ON CONFLICT DO NOTHING`; `true` if a row was written.
fn insert_view(
  conn: &rusqlite::Connection,
  image_id: &str,
  session_id: &str,
  at: &str,
) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "INSERT INTO views (image_id, session_id, viewed_at) VALUES (?1, ?2, ?3)
     ON CONFLICT (image_id, session_id) DO NOTHING",
    rusqlite::params![image_id, session_id, at],
  )?;
  Ok(changed == 1)
}

/// Rewrite the cached counters of one image from the ledgers.
fn recompute(
  conn: &rusqlite::Connection,
  image_id: &str,
) -> rusqlite::Result<Option<ImageCounters>> {
  let changed = conn.execute(
    "UPDATE images SET
       view_count     = (SELECT COUNT(*) FROM views WHERE image_id = ?1),
       unique_viewers = (SELECT COUNT(DISTINCT session_id) FROM views WHERE image_id = ?1),
       bias_tag_count = (SELECT COUNT(DISTINCT bias_type) FROM bias_tags WHERE image_id = ?1)
     WHERE image_id = ?1",
    rusqlite::params![image_id],
  )?;
  if changed == 0 {
    return Ok(None);
  }

  conn.query_row(
    "SELECT view_count, unique_viewers, bias_tag_count FROM images WHERE image_id = ?1",
    rusqlite::params![image_id],
    |row| {
      let (views, viewers, tags): (i64, i64, i64) =
        (row.get(0)?, row.get(1)?, row.get(2)?);
      Ok(ImageCounters {
        view_count:     decode_count(views),
        unique_viewers: decode_count(viewers),
        bias_tag_count: decode_count(tags),
      })
    },
  )
  .optional()
}

/// Flip an active image to deleted; `false` if it was not active.
fn retire_row(
  conn: &rusqlite::Connection,
  image_id: &str,
  at: &str,
) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "UPDATE images SET status = ?2, deleted_at = ?3
     WHERE image_id = ?1 AND status = ?4",
    rusqlite::params![
      image_id,
      encode_status(ImageStatus::Deleted),
      at,
      encode_status(ImageStatus::Active),
    ],
  )?;
  Ok(changed == 1)
}

fn count_where(
  conn: &rusqlite::Connection,
  sql: &str,
  param: &str,
) -> rusqlite::Result<u64> {
  let n: i64 = conn.query_row(sql, rusqlite::params![param], |r| r.get(0))?;
  Ok(decode_count(n))
}

fn bias_type_counts(
  conn: &rusqlite::Connection,
  image_id: Option<&str>,
) -> rusqlite::Result<Vec<BiasTypeCount>> {
  let mut stmt = conn.prepare(
    "SELECT bias_type, COUNT(*) AS n
     FROM bias_tags
     WHERE ?1 IS NULL OR image_id = ?1
     GROUP BY bias_type
     ORDER BY n DESC, bias_type ASC",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![image_id], |row| {
      let n: i64 = row.get(1)?;
      Ok(BiasTypeCount { bias_type: row.get(0)?, count: decode_count(n) })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A bias tagger store backed by a single SQLite file.
///
/// Clones share the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Delete every row from every table, keeping the schema.
  pub async fn clear(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(
          "DELETE FROM views;
           DELETE FROM bias_tags;
           DELETE FROM images;
           DELETE FROM sessions;",
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TaggerStore impl ────────────────────────────────────────────────────────

impl TaggerStore for SqliteStore {
  type Error = crate::Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn insert_image(&self, image: NewImage) -> Result<bool> {
    let id_str   = String::from(image.id);
    let tags_str = encode_tags(&image.tags)?;
    let at_str   = encode_dt(Utc::now());
    let status   = encode_status(ImageStatus::Active);

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO images (image_id, url, prompt, tags, source, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (image_id) DO NOTHING",
          rusqlite::params![
            id_str,
            image.url,
            image.prompt,
            tags_str,
            image.source,
            status,
            at_str,
          ],
        )?;
        Ok(changed == 1)
      })
      .await?;

    Ok(inserted)
  }

  async fn get_image(&self, id: ImageId) -> Result<Option<Image>> {
    let id_str = String::from(id);

    let raw: Option<RawImage> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE image_id = ?1"),
            rusqlite::params![id_str],
            RawImage::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawImage::into_image).transpose()
  }

  async fn active_candidates(&self, session_id: SessionId) -> Result<Vec<ImageId>> {
    let session_str = String::from(session_id);
    let status      = encode_status(ImageStatus::Active);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT i.image_id FROM images i
           WHERE i.status = ?1
             AND NOT EXISTS (
               SELECT 1 FROM views v
               WHERE v.session_id = ?2 AND v.image_id = i.image_id
             )",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![status, session_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(ids.into_iter().map(ImageId::new).collect::<Result<_, _>>()?)
  }

  async fn count_active(&self) -> Result<u64> {
    let status = encode_status(ImageStatus::Active);
    let n = self
      .conn
      .call(move |conn| {
        Ok(count_where(conn, "SELECT COUNT(*) FROM images WHERE status = ?1", status)?)
      })
      .await?;
    Ok(n)
  }

  async fn retire(&self, id: ImageId) -> Result<bool> {
    let id_str = String::from(id);
    let at_str = encode_dt(Utc::now());

    let retired = self
      .conn
      .call(move |conn| Ok(retire_row(conn, &id_str, &at_str)?))
      .await?;
    Ok(retired)
  }

  async fn recompute_counters(&self, id: ImageId) -> Result<Option<ImageCounters>> {
    let id_str = String::from(id);

    let counters = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let counters = recompute(&tx, &id_str)?;
        tx.commit()?;
        Ok(counters)
      })
      .await?;
    Ok(counters)
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn ensure_session(&self, id: SessionId) -> Result<Session> {
    let id_str = String::from(id);
    let at_str = encode_dt(Utc::now());

    let raw: RawSession = self
      .conn
      .call(move |conn| {
        // Upsert: concurrent first touches of one id converge on one row.
        Ok(conn.query_row(
          "INSERT INTO sessions (session_id, created_at, last_active)
           VALUES (?1, ?2, ?2)
           ON CONFLICT (session_id) DO UPDATE SET last_active = excluded.last_active
           RETURNING session_id, created_at, last_active",
          rusqlite::params![id_str, at_str],
          |row| {
            Ok(RawSession {
              session_id:  row.get(0)?,
              created_at:  row.get(1)?,
              last_active: row.get(2)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_session()
  }

  // ── View ledger ───────────────────────────────────────────────────────────

  async fn record_view(&self, image_id: ImageId, session_id: SessionId) -> Result<bool> {
    let image_str   = String::from(image_id);
    let session_str = String::from(session_id);
    let at_str      = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| Ok(insert_view(conn, &image_str, &session_str, &at_str)?))
      .await?;
    Ok(inserted)
  }

  async fn viewed_images(&self, session_id: SessionId) -> Result<HashSet<ImageId>> {
    let session_str = String::from(session_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT image_id FROM views WHERE session_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![session_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(ids.into_iter().map(ImageId::new).collect::<Result<_, _>>()?)
  }

  async fn distinct_viewer_count(&self, image_id: ImageId) -> Result<u64> {
    let image_str = String::from(image_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(count_where(
          conn,
          "SELECT COUNT(DISTINCT session_id) FROM views WHERE image_id = ?1",
          &image_str,
        )?)
      })
      .await?;
    Ok(n)
  }

  async fn record_exposure(
    &self,
    image_id:   ImageId,
    session_id: SessionId,
    policy:     RetirementPolicy,
  ) -> Result<Option<Exposure>> {
    let image_str   = String::from(image_id);
    let session_str = String::from(session_id);
    let at_str      = encode_dt(Utc::now());
    let active      = encode_status(ImageStatus::Active);

    let exposure = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Candidates are listed outside this transaction; the image may have
        // been retired since.
        let still_active = tx
          .query_row(
            "SELECT 1 FROM images WHERE image_id = ?1 AND status = ?2",
            rusqlite::params![image_str, active],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !still_active {
          return Ok(None);
        }

        let newly_recorded = insert_view(&tx, &image_str, &session_str, &at_str)?;
        let counters = recompute(&tx, &image_str)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let retired = policy.should_retire(&counters)
          && retire_row(&tx, &image_str, &at_str)?;

        tx.commit()?;
        Ok(Some(Exposure { newly_recorded, counters, retired }))
      })
      .await?;

    Ok(exposure)
  }

  // ── Bias tag ledger ───────────────────────────────────────────────────────

  async fn record_tag(&self, tag: NewBiasTag) -> Result<bool> {
    let image_str   = String::from(tag.image_id);
    let session_str = String::from(tag.session_id);
    let at_str      = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO bias_tags (image_id, session_id, bias_type, notes, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (image_id, session_id, bias_type) DO NOTHING",
          rusqlite::params![image_str, session_str, tag.bias_type, tag.notes, at_str],
        )?;
        Ok(changed == 1)
      })
      .await?;
    Ok(inserted)
  }

  async fn list_tags(&self, image_id: ImageId) -> Result<Vec<BiasTag>> {
    let image_str = String::from(image_id);

    let raws: Vec<RawBiasTag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT image_id, session_id, bias_type, notes, created_at
           FROM bias_tags WHERE image_id = ?1
           ORDER BY tag_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![image_str], |row| {
            Ok(RawBiasTag {
              image_id:   row.get(0)?,
              session_id: row.get(1)?,
              bias_type:  row.get(2)?,
              notes:      row.get(3)?,
              created_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBiasTag::into_tag).collect()
  }

  async fn distinct_category_count(&self, image_id: ImageId) -> Result<u64> {
    let image_str = String::from(image_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(count_where(
          conn,
          "SELECT COUNT(DISTINCT bias_type) FROM bias_tags WHERE image_id = ?1",
          &image_str,
        )?)
      })
      .await?;
    Ok(n)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn image_details(&self, id: ImageId) -> Result<Option<ImageDetails>> {
    let id_str = String::from(id);

    let found: Option<(RawImage, Vec<BiasTypeCount>)> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE image_id = ?1"),
            rusqlite::params![id_str],
            RawImage::from_row,
          )
          .optional()?;
        let Some(raw) = raw else { return Ok(None) };
        let counts = bias_type_counts(conn, Some(id_str.as_str()))?;
        Ok(Some((raw, counts)))
      })
      .await?;

    found
      .map(|(raw, bias_tags)| Ok(ImageDetails { image: raw.into_image()?, bias_tags }))
      .transpose()
  }

  async fn statistics(&self, recent_limit: usize) -> Result<Statistics> {
    let active    = encode_status(ImageStatus::Active);
    let limit_val = i64::try_from(recent_limit).unwrap_or(i64::MAX);

    let (active_images, total_views, tagged_images, bias_types, recent, most) = self
      .conn
      .call(move |conn| {
        let active_images =
          count_where(conn, "SELECT COUNT(*) FROM images WHERE status = ?1", active)?;

        let total_views: i64 = conn.query_row(
          "SELECT COALESCE(SUM(view_count), 0) FROM images",
          [],
          |r| r.get(0),
        )?;

        let tagged_images: i64 = conn.query_row(
          "SELECT COUNT(*) FROM images WHERE bias_tag_count > 0",
          [],
          |r| r.get(0),
        )?;

        let bias_types = bias_type_counts(conn, None)?;

        // Recency follows insertion order of the tag rows.
        let mut stmt = conn.prepare(
          "SELECT i.image_id, i.url, i.prompt,
                  json_group_array(DISTINCT bt.bias_type), i.bias_tag_count
           FROM images i
           JOIN bias_tags bt ON bt.image_id = i.image_id
           GROUP BY i.image_id
           ORDER BY MAX(bt.tag_id) DESC
           LIMIT ?1",
        )?;
        let recent = stmt
          .query_map(rusqlite::params![limit_val], RawTaggedImage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let most = conn
          .query_row(
            "SELECT i.image_id, i.url, i.prompt,
                    json_group_array(DISTINCT bt.bias_type), i.bias_tag_count
             FROM images i
             JOIN bias_tags bt ON bt.image_id = i.image_id
             WHERE i.bias_tag_count > 0
             GROUP BY i.image_id
             ORDER BY i.bias_tag_count DESC, i.image_id ASC
             LIMIT 1",
            [],
            RawTaggedImage::from_row,
          )
          .optional()?;

        Ok((active_images, total_views, tagged_images, bias_types, recent, most))
      })
      .await?;

    Ok(Statistics {
      active_images,
      total_views: decode_count(total_views),
      tagged_images: decode_count(tagged_images),
      bias_types,
      recent_tagged: recent
        .into_iter()
        .map(RawTaggedImage::into_tagged)
        .collect::<Result<_>>()?,
      most_tagged: most.map(RawTaggedImage::into_tagged).transpose()?,
    })
  }
}
