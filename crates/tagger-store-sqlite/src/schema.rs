//! SQL schema for the bias tagger SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Rows are never deleted by normal operation; retirement flips `status`.
-- The three counters are a cache over `views` and `bias_tags`.
CREATE TABLE IF NOT EXISTS images (
    image_id        TEXT PRIMARY KEY,
    url             TEXT NOT NULL,
    prompt          TEXT NOT NULL DEFAULT '',
    tags            TEXT NOT NULL DEFAULT '[]',      -- JSON array of strings
    source          TEXT NOT NULL DEFAULT 'unknown',
    view_count      INTEGER NOT NULL DEFAULT 0,
    unique_viewers  INTEGER NOT NULL DEFAULT 0,
    bias_tag_count  INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'active',
    created_at      TEXT NOT NULL,
    deleted_at      TEXT,
    CHECK (status IN ('active', 'deleted'))
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id   TEXT PRIMARY KEY,
    created_at   TEXT NOT NULL,
    last_active  TEXT NOT NULL
);

-- Append-only. One row per (image, session).
CREATE TABLE IF NOT EXISTS views (
    view_id     INTEGER PRIMARY KEY,
    image_id    TEXT NOT NULL REFERENCES images(image_id),
    session_id  TEXT NOT NULL REFERENCES sessions(session_id),
    viewed_at   TEXT NOT NULL,
    UNIQUE (image_id, session_id)
);

-- Append-only. One row per (image, session, bias_type).
CREATE TABLE IF NOT EXISTS bias_tags (
    tag_id      INTEGER PRIMARY KEY,
    image_id    TEXT NOT NULL REFERENCES images(image_id),
    session_id  TEXT NOT NULL REFERENCES sessions(session_id),
    bias_type   TEXT NOT NULL,
    notes       TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    UNIQUE (image_id, session_id, bias_type)
);

CREATE INDEX IF NOT EXISTS images_status_idx     ON images(status);
CREATE INDEX IF NOT EXISTS views_session_idx     ON views(session_id, image_id);
CREATE INDEX IF NOT EXISTS bias_tags_type_idx    ON bias_tags(bias_type);

PRAGMA user_version = 1;
";
