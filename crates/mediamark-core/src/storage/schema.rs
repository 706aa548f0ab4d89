//! SQLite schema for the relational store
//!
//! Two schema versions exist:
//!
//! - **v1**: `files`, `annotations`, `bookmarks`
//! - **v2**: adds `workspaces`, `sessions`, `session_files`,
//!   `window_layouts` and `session_bookmark_diffs`
//!
//! v2 only adds tables and indexes, it never touches v1 tables, so moving a
//! database forward is a matter of running the missing steps in order.
//! The version lives in `schema_info` under the `version` key.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::error::{StoreError, StoreResult};

/// Schema versions understood by this build
///
/// Serialized as its number (`schema_version = 1` in config files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SchemaVersion {
    /// Files, annotations and bookmarks
    V1 = 1,
    /// Adds workspace sessions
    V2 = 2,
}

impl SchemaVersion {
    /// The newest schema
    pub const LATEST: SchemaVersion = SchemaVersion::V2;

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(SchemaVersion::V1),
            2 => Some(SchemaVersion::V2),
            _ => None,
        }
    }

    /// Whether session entities exist at this version
    pub fn supports_sessions(self) -> bool {
        self >= SchemaVersion::V2
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::LATEST
    }
}

impl TryFrom<i32> for SchemaVersion {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_i32(value).ok_or_else(|| format!("unknown schema version {value}"))
    }
}

impl From<SchemaVersion> for i32 {
    fn from(version: SchemaVersion) -> Self {
        version.as_i32()
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.as_i32())
    }
}

const V1_SCHEMA: &str = r#"
    -- Schema version tracking
    CREATE TABLE IF NOT EXISTS schema_info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- One row per canonical file location
    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS annotations (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        note TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    -- At most one bookmark per (file, node)
    CREATE TABLE IF NOT EXISTS bookmarks (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (file_id, node_id),
        FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_annotations_file_created
        ON annotations(file_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_bookmarks_file_created
        ON bookmarks(file_id, created_at);
"#;

const V2_SCHEMA: &str = r#"
    -- Singleton workspace row
    CREATE TABLE IF NOT EXISTS workspaces (
        id TEXT PRIMARY KEY,
        app_version TEXT,
        last_opened INTEGER NOT NULL,
        schema_version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        last_scene_identifier TEXT,
        is_current INTEGER NOT NULL DEFAULT 0,
        focused_file_url TEXT,
        FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
    );

    -- Child rows carry the snapshot's id plus a surrogate key, so two
    -- sessions may hold entries with the same snapshot id
    CREATE TABLE IF NOT EXISTS session_files (
        row_id INTEGER PRIMARY KEY,
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        file_id TEXT NOT NULL,
        order_index INTEGER NOT NULL,
        last_selection_node_id INTEGER,
        scroll_offset_x REAL,
        scroll_offset_y REAL,
        is_pinned INTEGER NOT NULL DEFAULT 0,
        display_name TEXT NOT NULL,
        last_opened INTEGER NOT NULL,
        bookmark_data BLOB,
        bookmark_identifier TEXT,
        recent_bookmark_identifier TEXT,
        UNIQUE (session_id, id),
        FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE,
        FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS window_layouts (
        row_id INTEGER PRIMARY KEY,
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        scene_identifier TEXT NOT NULL,
        serialized_layout BLOB NOT NULL,
        is_floating_inspector INTEGER NOT NULL DEFAULT 0,
        UNIQUE (session_id, id),
        FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS session_bookmark_diffs (
        row_id INTEGER PRIMARY KEY,
        id TEXT NOT NULL,
        session_file_row INTEGER NOT NULL,
        bookmark_id TEXT,
        is_removed INTEGER NOT NULL DEFAULT 0,
        note_delta TEXT,
        FOREIGN KEY (session_file_row) REFERENCES session_files(row_id) ON DELETE CASCADE,
        FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE SET NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_is_current ON sessions(is_current);
    CREATE INDEX IF NOT EXISTS idx_session_files_file ON session_files(file_id);
    CREATE INDEX IF NOT EXISTS idx_session_bookmark_diffs_file
        ON session_bookmark_diffs(session_file_row);
    CREATE INDEX IF NOT EXISTS idx_session_bookmark_diffs_bookmark
        ON session_bookmark_diffs(bookmark_id);
"#;

/// DDL that brings a database from the previous version to `version`
fn step_sql(version: SchemaVersion) -> &'static str {
    match version {
        SchemaVersion::V1 => V1_SCHEMA,
        SchemaVersion::V2 => V2_SCHEMA,
    }
}

/// Open the schema at `requested`, creating or migrating as needed
///
/// Returns the effective version. A database already at a newer version
/// than requested is left as is; one newer than this build is rejected.
pub fn open_schema(conn: &mut Connection, requested: SchemaVersion) -> StoreResult<SchemaVersion> {
    let stored = if has_schema_info(conn)? {
        get_schema_version(conn)?
    } else {
        None
    };

    let current = match stored {
        None => None,
        Some(v) => Some(SchemaVersion::from_i32(v).ok_or_else(|| StoreError::Migration {
            from: v,
            to: SchemaVersion::LATEST.as_i32(),
            details: "database was written by a newer build".to_string(),
        })?),
    };

    let target = current.map_or(requested, |c| c.max(requested));
    if current == Some(target) {
        return Ok(target);
    }

    migrate(conn, current, target)?;
    Ok(target)
}

/// Run every step after `from` up to and including `to` in one transaction
fn migrate(
    conn: &mut Connection,
    from: Option<SchemaVersion>,
    to: SchemaVersion,
) -> StoreResult<()> {
    let from_i32 = from.map_or(0, SchemaVersion::as_i32);
    let wrap = |e: rusqlite::Error| StoreError::Migration {
        from: from_i32,
        to: to.as_i32(),
        details: e.to_string(),
    };

    let tx = conn.transaction().map_err(wrap)?;
    for step in [SchemaVersion::V1, SchemaVersion::V2] {
        if Some(step) <= from || step > to {
            continue;
        }
        tx.execute_batch(step_sql(step)).map_err(wrap)?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [to.as_i32().to_string()],
    )
    .map_err(wrap)?;
    tx.commit().map_err(wrap)?;

    match from {
        None => info!(version = %to, "Initialized schema"),
        Some(from) => info!(from = %from, to = %to, "Migrated schema"),
    }
    Ok(())
}

fn has_schema_info(conn: &Connection) -> rusqlite::Result<bool> {
    conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")?
        .exists([])
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<Option<i32>> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.and_then(|v| v.parse().ok()))
}
