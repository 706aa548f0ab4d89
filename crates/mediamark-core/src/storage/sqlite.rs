//! SQLite store
//!
//! Normalized relational backend: one `files` row per canonical file key,
//! annotations and bookmarks hang off it, and (schema v2) a singleton
//! workspace owns sessions with their files, window layouts and bookmark
//! diffs.
//!
//! ## Writes
//!
//! Every public method runs in a single transaction on one connection
//! guarded by a mutex, so concurrent callers are serialized and nothing is
//! ever partially applied. Child mutations end with an explicit
//! [`touch_file`] that bumps the owning file's `updated_at`.
//!
//! Foreign keys declare the delete rules, and the store also runs the
//! cascade/nullify statements itself before deleting a parent.
//!
//! ## Sessions
//!
//! Saving a session replaces all of its children with the incoming
//! snapshot. At most one session is flagged current.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{stamp, system_clock, Clock};
use crate::identity::{canonical_key, CanonicalFile};
use crate::models::{
    AnnotationRecord, BookmarkRecord, RecentDocument, ScrollOffset, SessionBookmarkDiff,
    SessionFileSnapshot, WindowLayoutSnapshot, WorkspaceSessionSnapshot,
};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{open_schema, SchemaVersion};
use crate::store::{AnnotationBookmarkStoring, WorkspaceSessionStoring};

/// Relational store backed by one SQLite database file
pub struct SqliteStore {
    conn: Mutex<Connection>,
    version: SchemaVersion,
    clock: Clock,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path, version: SchemaVersion) -> StoreResult<Self> {
        Self::open_with_clock(path, version, system_clock())
    }

    /// Open or create the database at `path` with an explicit clock
    ///
    /// A database written at an older schema is migrated forward to
    /// `version`; one at a newer schema keeps its own version.
    pub fn open_with_clock(path: &Path, version: SchemaVersion, clock: Clock) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, version, clock)?;
        info!(path = ?path, version = %store.version, "Opened SQLite store");
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(version: SchemaVersion) -> StoreResult<Self> {
        Self::open_in_memory_with_clock(version, system_clock())
    }

    /// Open an in-memory database with an explicit clock
    pub fn open_in_memory_with_clock(version: SchemaVersion, clock: Clock) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, version, clock)
    }

    fn from_connection(
        mut conn: Connection,
        version: SchemaVersion,
        clock: Clock,
    ) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version = open_schema(&mut conn, version)?;
        Ok(Self {
            conn: Mutex::new(conn),
            version,
            clock,
        })
    }

    /// Effective schema version of the open database
    pub fn schema_version(&self) -> SchemaVersion {
        self.version
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_sessions(&self, operation: &'static str) -> StoreResult<()> {
        if self.version.supports_sessions() {
            Ok(())
        } else {
            Err(StoreError::unsupported(operation))
        }
    }
}

impl AnnotationBookmarkStoring for SqliteStore {
    fn annotations(&self, file: &Path) -> StoreResult<Vec<AnnotationRecord>> {
        let canonical = CanonicalFile::resolve(file)?;
        let conn = self.lock();
        match find_file(&conn, canonical.key())? {
            Some(file_id) => query_annotations(&conn, &file_id),
            None => Ok(Vec::new()),
        }
    }

    fn bookmarks(&self, file: &Path) -> StoreResult<Vec<BookmarkRecord>> {
        let canonical = CanonicalFile::resolve(file)?;
        let conn = self.lock();
        match find_file(&conn, canonical.key())? {
            Some(file_id) => query_bookmarks(&conn, &file_id),
            None => Ok(Vec::new()),
        }
    }

    fn create_annotation(
        &self,
        file: &Path,
        node_id: i64,
        note: &str,
    ) -> StoreResult<AnnotationRecord> {
        let canonical = CanonicalFile::resolve(file)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = stamp(&self.clock);

        let file_id = find_or_create_file(&tx, canonical.key(), now)?;
        let record = AnnotationRecord::new(node_id, note, now);
        tx.execute(
            r#"
            INSERT INTO annotations (id, file_id, node_id, note, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id.to_string(),
                file_id,
                record.node_id,
                record.note,
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )?;
        touch_file(&tx, &file_id, now)?;
        tx.commit()?;

        debug!(file = canonical.key(), node_id, id = %record.id, "Created annotation");
        Ok(record)
    }

    fn update_annotation(&self, file: &Path, id: Uuid, note: &str) -> StoreResult<AnnotationRecord> {
        let canonical = CanonicalFile::resolve(file)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = stamp(&self.clock);

        let file_id =
            find_file(&tx, canonical.key())?.ok_or(StoreError::AnnotationNotFound { id })?;
        let mut record =
            find_annotation(&tx, &file_id, id)?.ok_or(StoreError::AnnotationNotFound { id })?;

        record.set_note(note, now);
        tx.execute(
            "UPDATE annotations SET note = ?, updated_at = ? WHERE id = ?",
            params![record.note, now.timestamp_millis(), id.to_string()],
        )?;
        touch_file(&tx, &file_id, now)?;
        tx.commit()?;

        debug!(file = canonical.key(), %id, "Updated annotation");
        Ok(record)
    }

    fn delete_annotation(&self, file: &Path, id: Uuid) -> StoreResult<()> {
        let canonical = CanonicalFile::resolve(file)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = stamp(&self.clock);

        let file_id =
            find_file(&tx, canonical.key())?.ok_or(StoreError::AnnotationNotFound { id })?;
        let deleted = tx.execute(
            "DELETE FROM annotations WHERE id = ? AND file_id = ?",
            params![id.to_string(), file_id],
        )?;
        if deleted == 0 {
            return Err(StoreError::AnnotationNotFound { id });
        }
        touch_file(&tx, &file_id, now)?;
        tx.commit()?;

        debug!(file = canonical.key(), %id, "Deleted annotation");
        Ok(())
    }

    fn set_bookmark(&self, file: &Path, node_id: i64, is_bookmarked: bool) -> StoreResult<()> {
        let canonical = CanonicalFile::resolve(file)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = stamp(&self.clock);

        // Looked up without creating: clearing must never materialize a file
        let existing_file = find_file(&tx, canonical.key())?;
        let existing_bookmark = match &existing_file {
            Some(file_id) => find_bookmark(&tx, file_id, node_id)?,
            None => None,
        };

        match (is_bookmarked, existing_bookmark) {
            (true, Some(_)) | (false, None) => return Ok(()),
            (true, None) => {
                let file_id = match existing_file {
                    Some(file_id) => file_id,
                    None => find_or_create_file(&tx, canonical.key(), now)?,
                };
                let record = BookmarkRecord::new(node_id, now);
                tx.execute(
                    "INSERT INTO bookmarks (id, file_id, node_id, created_at) VALUES (?, ?, ?, ?)",
                    params![
                        record.id.to_string(),
                        file_id,
                        record.node_id,
                        record.created_at.timestamp_millis(),
                    ],
                )?;
                touch_file(&tx, &file_id, now)?;
                debug!(file = canonical.key(), node_id, id = %record.id, "Set bookmark");
            }
            (false, Some(bookmark_id)) => {
                if self.version.supports_sessions() {
                    detach_bookmark_diffs(&tx, &bookmark_id)?;
                }
                tx.execute("DELETE FROM bookmarks WHERE id = ?", params![bookmark_id])?;
                if let Some(file_id) = &existing_file {
                    touch_file(&tx, file_id, now)?;
                }
                debug!(file = canonical.key(), node_id, "Cleared bookmark");
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl WorkspaceSessionStoring for SqliteStore {
    fn load_current_session(&self) -> StoreResult<Option<WorkspaceSessionSnapshot>> {
        self.require_sessions("load_current_session")?;
        let conn = self.lock();

        let current = current_sessions(&conn)?;
        if current.len() > 1 {
            warn!(count = current.len(), "More than one current session, using the newest");
        }
        let Some(row) = current.into_iter().next() else {
            return Ok(None);
        };

        let app_version: Option<String> = conn
            .query_row(
                "SELECT app_version FROM workspaces WHERE id = ?",
                params![row.workspace_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        let snapshot = WorkspaceSessionSnapshot {
            id: parse_uuid(&row.id)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            app_version,
            files: query_session_files(&conn, &row.id)?,
            focused_file: row.focused_file_url.map(Into::into),
            last_scene_identifier: row.last_scene_identifier,
            window_layouts: query_window_layouts(&conn, &row.id)?,
        };

        debug!(session = %snapshot.id, files = snapshot.files.len(), "Loaded current session");
        Ok(Some(snapshot))
    }

    fn save_current_session(&self, snapshot: &WorkspaceSessionSnapshot) -> StoreResult<()> {
        self.require_sessions("save_current_session")?;
        snapshot.check_unique_ids()?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = stamp(&self.clock);
        let session_id = snapshot.id.to_string();

        // Workspace singleton
        let workspace_id = find_or_create_workspace(&tx, now, self.version)?;
        tx.execute(
            r#"
            UPDATE workspaces
            SET app_version = COALESCE(?, app_version), last_opened = ?, schema_version = ?
            WHERE id = ?
            "#,
            params![
                snapshot.app_version,
                now.timestamp_millis(),
                self.version.as_i32(),
                workspace_id
            ],
        )?;

        // Session row
        let focused_file = snapshot
            .focused_file
            .as_deref()
            .map(canonical_key)
            .transpose()?;
        tx.execute(
            r#"
            INSERT INTO sessions (id, workspace_id, created_at, updated_at,
                                  last_scene_identifier, is_current, focused_file_url)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            ON CONFLICT(id) DO UPDATE SET
                workspace_id = ?2,
                created_at = ?3,
                updated_at = ?4,
                last_scene_identifier = ?5,
                is_current = 1,
                focused_file_url = ?6
            "#,
            params![
                session_id,
                workspace_id,
                snapshot.created_at.timestamp_millis(),
                snapshot.updated_at.timestamp_millis(),
                snapshot.last_scene_identifier,
                focused_file,
            ],
        )?;

        // Singleton current session
        let demoted = tx.execute(
            "UPDATE sessions SET is_current = 0 WHERE is_current = 1 AND id != ?",
            params![session_id],
        )?;

        // Replace-all children
        delete_session_children(&tx, &session_id)?;
        for file in &snapshot.files {
            insert_session_file(&tx, &session_id, file, now)?;
        }
        for layout in &snapshot.window_layouts {
            tx.execute(
                r#"
                INSERT INTO window_layouts (id, session_id, scene_identifier,
                                            serialized_layout, is_floating_inspector)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    layout.id.to_string(),
                    session_id,
                    layout.scene_identifier,
                    layout.serialized_layout,
                    layout.is_floating_inspector,
                ],
            )?;
        }

        tx.commit()?;

        info!(
            session = %snapshot.id,
            files = snapshot.files.len(),
            layouts = snapshot.window_layouts.len(),
            demoted,
            "Saved current session"
        );
        Ok(())
    }

    fn clear_current_session(&self) -> StoreResult<()> {
        self.require_sessions("clear_current_session")?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let ids: Vec<String> = current_sessions(&tx)?.into_iter().map(|r| r.id).collect();
        for id in &ids {
            delete_session_children(&tx, id)?;
            tx.execute(
                r#"
                UPDATE sessions
                SET is_current = 0, focused_file_url = NULL, last_scene_identifier = NULL
                WHERE id = ?
                "#,
                params![id],
            )?;
        }
        tx.commit()?;

        if !ids.is_empty() {
            info!(count = ids.len(), "Cleared current session");
        }
        Ok(())
    }
}

// ==================== Internal structs ====================

struct AnnotationRow {
    id: String,
    node_id: i64,
    note: String,
    created_at: i64,
    updated_at: i64,
}

impl AnnotationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_id: row.get(1)?,
            note: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_record(self) -> StoreResult<AnnotationRecord> {
        Ok(AnnotationRecord {
            id: parse_uuid(&self.id)?,
            node_id: self.node_id,
            note: self.note,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

struct SessionRow {
    id: String,
    workspace_id: String,
    created_at: i64,
    updated_at: i64,
    last_scene_identifier: Option<String>,
    focused_file_url: Option<String>,
}

struct SessionFileRow {
    row_id: i64,
    id: String,
    url: String,
    order_index: i64,
    last_selection_node_id: Option<i64>,
    scroll_offset_x: Option<f64>,
    scroll_offset_y: Option<f64>,
    is_pinned: bool,
    display_name: String,
    last_opened: i64,
    bookmark_data: Option<Vec<u8>>,
    bookmark_identifier: Option<String>,
    recent_bookmark_identifier: Option<String>,
}

// ==================== Conversions ====================

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::InvalidRecord {
        details: format!("invalid UUID '{}': {}", value, e),
    })
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::InvalidRecord {
        details: format!("timestamp out of range: {}", millis),
    })
}

// ==================== Files ====================

fn find_file(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row("SELECT id FROM files WHERE url = ?", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Get or lazily create the file row for a canonical key
fn find_or_create_file(conn: &Connection, key: &str, now: DateTime<Utc>) -> StoreResult<String> {
    if let Some(id) = find_file(conn, key)? {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO files (id, url, created_at, updated_at) VALUES (?, ?, ?, ?)",
        params![id, key, now.timestamp_millis(), now.timestamp_millis()],
    )?;
    debug!(file = key, "Created file record");
    Ok(id)
}

/// Bump a file's `updated_at` after one of its children changed
fn touch_file(conn: &Connection, file_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
    conn.execute(
        "UPDATE files SET updated_at = ? WHERE id = ?",
        params![now.timestamp_millis(), file_id],
    )?;
    Ok(())
}

// ==================== Annotations & bookmarks ====================

fn query_annotations(conn: &Connection, file_id: &str) -> StoreResult<Vec<AnnotationRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, node_id, note, created_at, updated_at
        FROM annotations WHERE file_id = ?
        ORDER BY created_at, rowid
        "#,
    )?;

    let rows = stmt
        .query_map(params![file_id], AnnotationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(AnnotationRow::into_record).collect()
}

fn find_annotation(
    conn: &Connection,
    file_id: &str,
    id: Uuid,
) -> StoreResult<Option<AnnotationRecord>> {
    conn.query_row(
        r#"
        SELECT id, node_id, note, created_at, updated_at
        FROM annotations WHERE id = ? AND file_id = ?
        "#,
        params![id.to_string(), file_id],
        AnnotationRow::from_row,
    )
    .optional()?
    .map(AnnotationRow::into_record)
    .transpose()
}

fn query_bookmarks(conn: &Connection, file_id: &str) -> StoreResult<Vec<BookmarkRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, node_id, created_at FROM bookmarks WHERE file_id = ? ORDER BY created_at, rowid",
    )?;

    let rows = stmt
        .query_map(params![file_id], |row| {
            let id: String = row.get(0)?;
            let node_id: i64 = row.get(1)?;
            let created_at: i64 = row.get(2)?;
            Ok((id, node_id, created_at))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, node_id, created_at)| {
            Ok(BookmarkRecord {
                id: parse_uuid(&id)?,
                node_id,
                created_at: from_millis(created_at)?,
            })
        })
        .collect()
}

fn find_bookmark(conn: &Connection, file_id: &str, node_id: i64) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM bookmarks WHERE file_id = ? AND node_id = ?",
            params![file_id, node_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Nullify diff references before their bookmark is deleted
fn detach_bookmark_diffs(conn: &Connection, bookmark_id: &str) -> StoreResult<()> {
    let detached = conn.execute(
        "UPDATE session_bookmark_diffs SET bookmark_id = NULL WHERE bookmark_id = ?",
        params![bookmark_id],
    )?;
    if detached > 0 {
        debug!(bookmark = bookmark_id, detached, "Detached session bookmark diffs");
    }
    Ok(())
}

// ==================== Sessions ====================

fn find_or_create_workspace(
    conn: &Connection,
    now: DateTime<Utc>,
    version: SchemaVersion,
) -> StoreResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM workspaces ORDER BY rowid LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO workspaces (id, app_version, last_opened, schema_version) VALUES (?, NULL, ?, ?)",
        params![id, now.timestamp_millis(), version.as_i32()],
    )?;
    Ok(id)
}

/// Sessions flagged current, newest first
fn current_sessions(conn: &Connection) -> StoreResult<Vec<SessionRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, workspace_id, created_at, updated_at, last_scene_identifier, focused_file_url
        FROM sessions WHERE is_current = 1
        ORDER BY updated_at DESC, id
        "#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SessionRow {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                last_scene_identifier: row.get(4)?,
                focused_file_url: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a session's files (with their diffs) and window layouts
fn delete_session_children(tx: &Transaction, session_id: &str) -> StoreResult<()> {
    tx.execute(
        r#"
        DELETE FROM session_bookmark_diffs WHERE session_file_row IN
            (SELECT row_id FROM session_files WHERE session_id = ?)
        "#,
        params![session_id],
    )?;
    tx.execute(
        "DELETE FROM session_files WHERE session_id = ?",
        params![session_id],
    )?;
    tx.execute(
        "DELETE FROM window_layouts WHERE session_id = ?",
        params![session_id],
    )?;
    Ok(())
}

fn insert_session_file(
    tx: &Transaction,
    session_id: &str,
    file: &SessionFileSnapshot,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let canonical = CanonicalFile::resolve(&file.recent.url)?;
    let file_id = find_or_create_file(tx, canonical.key(), now)?;

    tx.execute(
        r#"
        INSERT INTO session_files (id, session_id, file_id, order_index, last_selection_node_id,
                                   scroll_offset_x, scroll_offset_y, is_pinned, display_name,
                                   last_opened, bookmark_data, bookmark_identifier,
                                   recent_bookmark_identifier)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            file.id.to_string(),
            session_id,
            file_id,
            file.order_index,
            file.last_selection_node_id,
            file.scroll_offset.map(|o| o.x),
            file.scroll_offset.map(|o| o.y),
            file.is_pinned,
            file.recent.display_name,
            file.recent.last_opened.timestamp_millis(),
            file.recent.bookmark_data,
            file.bookmark_identifier.map(|id| id.to_string()),
            file.recent.bookmark_identifier.map(|id| id.to_string()),
        ],
    )?;
    let session_file_row = tx.last_insert_rowid();
    touch_file(tx, &file_id, now)?;

    for diff in &file.bookmark_diffs {
        let bookmark_id = match diff.bookmark_id {
            Some(id) => resolve_bookmark_id(tx, id)?,
            None => None,
        };
        tx.execute(
            r#"
            INSERT INTO session_bookmark_diffs (id, session_file_row, bookmark_id, is_removed, note_delta)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                diff.id.to_string(),
                session_file_row,
                bookmark_id,
                diff.is_removed,
                diff.note_delta,
            ],
        )?;
    }

    Ok(())
}

/// The stored id of an existing bookmark, or `None` if it has vanished
fn resolve_bookmark_id(conn: &Connection, id: Uuid) -> StoreResult<Option<String>> {
    let id = id.to_string();
    let exists = conn
        .prepare("SELECT 1 FROM bookmarks WHERE id = ?")?
        .exists(params![id])?;
    if exists {
        Ok(Some(id))
    } else {
        warn!(bookmark = %id, "Session diff references a missing bookmark, storing without it");
        Ok(None)
    }
}

fn query_session_files(
    conn: &Connection,
    session_id: &str,
) -> StoreResult<Vec<SessionFileSnapshot>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT sf.row_id, sf.id, f.url, sf.order_index, sf.last_selection_node_id,
               sf.scroll_offset_x, sf.scroll_offset_y, sf.is_pinned, sf.display_name,
               sf.last_opened, sf.bookmark_data, sf.bookmark_identifier,
               sf.recent_bookmark_identifier
        FROM session_files sf
        JOIN files f ON f.id = sf.file_id
        WHERE sf.session_id = ?
        ORDER BY sf.order_index, sf.id
        "#,
    )?;

    let rows = stmt
        .query_map(params![session_id], |row| {
            Ok(SessionFileRow {
                row_id: row.get(0)?,
                id: row.get(1)?,
                url: row.get(2)?,
                order_index: row.get(3)?,
                last_selection_node_id: row.get(4)?,
                scroll_offset_x: row.get(5)?,
                scroll_offset_y: row.get(6)?,
                is_pinned: row.get(7)?,
                display_name: row.get(8)?,
                last_opened: row.get(9)?,
                bookmark_data: row.get(10)?,
                bookmark_identifier: row.get(11)?,
                recent_bookmark_identifier: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut files = Vec::with_capacity(rows.len());
    for row in rows {
        let bookmark_identifier = row
            .bookmark_identifier
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        let recent_bookmark_identifier = row
            .recent_bookmark_identifier
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        let scroll_offset = match (row.scroll_offset_x, row.scroll_offset_y) {
            (Some(x), Some(y)) => Some(ScrollOffset { x, y }),
            _ => None,
        };

        files.push(SessionFileSnapshot {
            id: parse_uuid(&row.id)?,
            recent: RecentDocument {
                url: row.url.into(),
                bookmark_identifier: recent_bookmark_identifier,
                bookmark_data: row.bookmark_data,
                display_name: row.display_name,
                last_opened: from_millis(row.last_opened)?,
            },
            order_index: row.order_index,
            last_selection_node_id: row.last_selection_node_id,
            is_pinned: row.is_pinned,
            scroll_offset,
            bookmark_identifier,
            bookmark_diffs: query_bookmark_diffs(conn, row.row_id)?,
        });
    }
    Ok(files)
}

fn query_bookmark_diffs(
    conn: &Connection,
    session_file_row: i64,
) -> StoreResult<Vec<SessionBookmarkDiff>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, bookmark_id, is_removed, note_delta
        FROM session_bookmark_diffs WHERE session_file_row = ?
        ORDER BY row_id
        "#,
    )?;

    let rows = stmt
        .query_map(params![session_file_row], |row| {
            let id: String = row.get(0)?;
            let bookmark_id: Option<String> = row.get(1)?;
            let is_removed: bool = row.get(2)?;
            let note_delta: Option<String> = row.get(3)?;
            Ok((id, bookmark_id, is_removed, note_delta))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, bookmark_id, is_removed, note_delta)| {
            Ok(SessionBookmarkDiff {
                id: parse_uuid(&id)?,
                bookmark_id: bookmark_id.as_deref().map(parse_uuid).transpose()?,
                is_removed,
                note_delta,
            })
        })
        .collect()
}

fn query_window_layouts(
    conn: &Connection,
    session_id: &str,
) -> StoreResult<Vec<WindowLayoutSnapshot>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, scene_identifier, serialized_layout, is_floating_inspector
        FROM window_layouts WHERE session_id = ?
        ORDER BY scene_identifier, id
        "#,
    )?;

    let rows = stmt
        .query_map(params![session_id], |row| {
            let id: String = row.get(0)?;
            let scene_identifier: String = row.get(1)?;
            let serialized_layout: Vec<u8> = row.get(2)?;
            let is_floating_inspector: bool = row.get(3)?;
            Ok((id, scene_identifier, serialized_layout, is_floating_inspector))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, scene_identifier, serialized_layout, is_floating_inspector)| {
                Ok(WindowLayoutSnapshot {
                    id: parse_uuid(&id)?,
                    scene_identifier,
                    serialized_layout,
                    is_floating_inspector,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_clock;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn reference_date() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory_with_clock(
            SchemaVersion::LATEST,
            fixed_clock(reference_date()),
        )
        .unwrap()
    }

    /// Store whose clock can be moved forward by the test
    fn stepping_store() -> (SqliteStore, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(reference_date()));
        let clock_now = Arc::clone(&now);
        let store = SqliteStore::open_in_memory_with_clock(
            SchemaVersion::LATEST,
            Arc::new(move || *clock_now.lock().unwrap()),
        )
        .unwrap();
        (store, now)
    }

    /// How a path comes back from the store
    fn stored(path: &str) -> PathBuf {
        PathBuf::from(canonical_key(Path::new(path)).unwrap())
    }

    fn count(store: &SqliteStore, sql: &str) -> i64 {
        store.lock().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn file_updated_at(store: &SqliteStore, file: &Path) -> i64 {
        let key = canonical_key(file).unwrap();
        store
            .lock()
            .query_row(
                "SELECT updated_at FROM files WHERE url = ?",
                params![key],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn session_file(path: &str, order_index: i64) -> SessionFileSnapshot {
        SessionFileSnapshot {
            id: Uuid::new_v4(),
            recent: RecentDocument {
                url: PathBuf::from(path),
                bookmark_identifier: None,
                bookmark_data: Some(vec![1, 2, 3]),
                display_name: path.rsplit('/').next().unwrap_or(path).to_string(),
                last_opened: reference_date(),
            },
            order_index,
            last_selection_node_id: Some(7),
            is_pinned: false,
            scroll_offset: Some(ScrollOffset { x: 0.0, y: 120.5 }),
            bookmark_identifier: None,
            bookmark_diffs: Vec::new(),
        }
    }

    fn snapshot(files: Vec<SessionFileSnapshot>) -> WorkspaceSessionSnapshot {
        let mut snapshot = WorkspaceSessionSnapshot::new(reference_date());
        snapshot.app_version = Some("1.0".to_string());
        snapshot.files = files;
        snapshot
    }

    #[test]
    fn test_annotation_crud() {
        let (store, now) = stepping_store();
        let file = Path::new("/tmp/sample.mp4");

        let created = store.create_annotation(file, 42, "Check major brand").unwrap();
        assert_eq!(store.annotations(file).unwrap(), vec![created.clone()]);

        *now.lock().unwrap() = reference_date() + Duration::seconds(60);
        let updated = store
            .update_annotation(file, created.id, "Revised note")
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.updated_at, reference_date() + Duration::seconds(60));
        assert_eq!(store.annotations(file).unwrap(), vec![updated]);

        store.delete_annotation(file, created.id).unwrap();
        assert!(store.annotations(file).unwrap().is_empty());
    }

    #[test]
    fn test_annotations_are_ordered_by_creation() {
        let (store, now) = stepping_store();
        let file = Path::new("/tmp/ordered.mp4");

        *now.lock().unwrap() = reference_date() + Duration::seconds(10);
        let later = store.create_annotation(file, 2, "later").unwrap();
        *now.lock().unwrap() = reference_date();
        let earlier = store.create_annotation(file, 1, "earlier").unwrap();

        assert_eq!(store.annotations(file).unwrap(), vec![earlier, later]);
    }

    #[test]
    fn test_mutations_touch_file() {
        let (store, now) = stepping_store();
        let file = Path::new("/tmp/touched.mp4");

        let created = store.create_annotation(file, 1, "a").unwrap();
        assert_eq!(
            file_updated_at(&store, file),
            reference_date().timestamp_millis()
        );

        let later = reference_date() + Duration::seconds(5);
        *now.lock().unwrap() = later;
        store.update_annotation(file, created.id, "b").unwrap();
        assert_eq!(file_updated_at(&store, file), later.timestamp_millis());

        let latest = later + Duration::seconds(5);
        *now.lock().unwrap() = latest;
        store.set_bookmark(file, 1, true).unwrap();
        assert_eq!(file_updated_at(&store, file), latest.timestamp_millis());

        // Re-bookmarking is a no-op and leaves the file alone
        *now.lock().unwrap() = latest + Duration::seconds(5);
        store.set_bookmark(file, 1, true).unwrap();
        assert_eq!(file_updated_at(&store, file), latest.timestamp_millis());
    }

    #[test]
    fn test_not_found_for_foreign_or_missing_ids() {
        let store = test_store();
        let file_a = Path::new("/tmp/a.mp4");
        let file_b = Path::new("/tmp/b.mp4");

        let err = store
            .update_annotation(file_a, Uuid::new_v4(), "nothing")
            .unwrap_err();
        assert!(err.is_not_found());

        // An id from another file is not found under this one
        let on_a = store.create_annotation(file_a, 1, "a").unwrap();
        store.create_annotation(file_b, 1, "b").unwrap();
        let err = store.delete_annotation(file_b, on_a.id).unwrap_err();
        assert!(matches!(err, StoreError::AnnotationNotFound { id } if id == on_a.id));
        assert_eq!(store.annotations(file_a).unwrap().len(), 1);
    }

    #[test]
    fn test_bookmark_idempotence() {
        let store = test_store();
        let file = Path::new("/tmp/bookmarks.mp4");

        store.set_bookmark(file, 256, true).unwrap();
        store.set_bookmark(file, 256, true).unwrap();
        assert_eq!(store.bookmarks(file).unwrap().len(), 1);

        store.set_bookmark(file, 256, false).unwrap();
        store.set_bookmark(file, 256, false).unwrap();
        assert!(store.bookmarks(file).unwrap().is_empty());
    }

    #[test]
    fn test_unbookmark_never_creates_file() {
        let store = test_store();

        store
            .set_bookmark(Path::new("/tmp/never-seen.mp4"), 9, false)
            .unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM files"), 0);
    }

    #[test]
    fn test_equivalent_paths_share_file_row() {
        let store = test_store();

        store
            .create_annotation(Path::new("/tmp/x/../same.mp4"), 1, "a")
            .unwrap();
        store
            .set_bookmark(Path::new("/tmp/./same.mp4"), 1, true)
            .unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM files"), 1);
        assert_eq!(
            store.annotations(Path::new("/tmp/same.mp4")).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_save_and_load_session() {
        let store = test_store();
        assert!(store.load_current_session().unwrap().is_none());

        let mut first = session_file("/tmp/a.mp4", 0);
        first.is_pinned = true;
        let mut snapshot = snapshot(vec![session_file("/tmp/b.mp4", 1), first]);
        snapshot.focused_file = Some(PathBuf::from("/tmp/a.mp4"));
        snapshot.last_scene_identifier = Some("main".to_string());
        snapshot.window_layouts = vec![
            WindowLayoutSnapshot {
                id: Uuid::new_v4(),
                scene_identifier: "z-scene".to_string(),
                serialized_layout: vec![9],
                is_floating_inspector: true,
            },
            WindowLayoutSnapshot {
                id: Uuid::new_v4(),
                scene_identifier: "a-scene".to_string(),
                serialized_layout: vec![0xAA, 0xBB],
                is_floating_inspector: false,
            },
        ];

        store.save_current_session(&snapshot).unwrap();
        let loaded = store.load_current_session().unwrap().unwrap();

        assert_eq!(loaded.id, snapshot.id);
        assert_eq!(loaded.app_version.as_deref(), Some("1.0"));
        assert_eq!(loaded.focused_file, Some(stored("/tmp/a.mp4")));
        assert_eq!(loaded.last_scene_identifier.as_deref(), Some("main"));

        assert_eq!(loaded.files.len(), 2);
        assert_eq!(loaded.files[0].recent.url, stored("/tmp/a.mp4"));
        assert!(loaded.files[0].is_pinned);
        assert_eq!(loaded.files[1].recent.url, stored("/tmp/b.mp4"));
        assert_eq!(loaded.files[1].recent.bookmark_data, Some(vec![1, 2, 3]));
        assert_eq!(
            loaded.files[1].scroll_offset,
            Some(ScrollOffset { x: 0.0, y: 120.5 })
        );
        assert_eq!(loaded.files[1].last_selection_node_id, Some(7));

        let scenes: Vec<&str> = loaded
            .window_layouts
            .iter()
            .map(|l| l.scene_identifier.as_str())
            .collect();
        assert_eq!(scenes, vec!["a-scene", "z-scene"]);
        assert_eq!(loaded.window_layouts[0].serialized_layout, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_save_replaces_all_children() {
        let store = test_store();
        let b = session_file("/tmp/b.mp4", 1);
        let mut snap = snapshot(vec![session_file("/tmp/a.mp4", 0), b.clone()]);
        store.save_current_session(&snap).unwrap();

        let mut b_first = b;
        b_first.order_index = 0;
        snap.files = vec![b_first];
        store.save_current_session(&snap).unwrap();

        let loaded = store.load_current_session().unwrap().unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].recent.url, stored("/tmp/b.mp4"));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM session_files"), 1);
    }

    #[test]
    fn test_only_one_current_session() {
        let store = test_store();
        let a = snapshot(vec![session_file("/tmp/a.mp4", 0)]);
        let b = snapshot(vec![session_file("/tmp/a.mp4", 0)]);

        store.save_current_session(&a).unwrap();
        store.save_current_session(&b).unwrap();

        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM sessions WHERE is_current = 1"),
            1
        );
        assert_eq!(count(&store, "SELECT COUNT(*) FROM workspaces"), 1);
        assert_eq!(store.load_current_session().unwrap().unwrap().id, b.id);

        // Saving A again flips it back
        store.save_current_session(&a).unwrap();
        assert_eq!(store.load_current_session().unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_sessions_may_share_child_ids() {
        let store = test_store();
        let shared = session_file("/tmp/a.mp4", 0);
        let a = snapshot(vec![shared.clone()]);
        let b = snapshot(vec![shared]);

        store.save_current_session(&a).unwrap();
        store.save_current_session(&b).unwrap();

        assert_eq!(store.load_current_session().unwrap().unwrap().files.len(), 1);
    }

    #[test]
    fn test_duplicate_child_ids_are_rejected() {
        let store = test_store();
        let entry = session_file("/tmp/a.mp4", 0);
        let good = snapshot(vec![session_file("/tmp/b.mp4", 0)]);
        store.save_current_session(&good).unwrap();

        let bad = snapshot(vec![entry.clone(), entry]);
        let err = store.save_current_session(&bad).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));

        // Previous session untouched
        assert_eq!(store.load_current_session().unwrap().unwrap().id, good.id);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM session_files"), 1);
    }

    #[test]
    fn test_bookmark_identifiers_load_back_separately() {
        let store = test_store();
        let recent_only = Uuid::new_v4();
        let own = Uuid::new_v4();

        let mut first = session_file("/tmp/a.mp4", 0);
        first.recent.bookmark_identifier = Some(recent_only);
        let mut second = session_file("/tmp/b.mp4", 1);
        second.bookmark_identifier = Some(own);
        store
            .save_current_session(&snapshot(vec![first, second]))
            .unwrap();

        let loaded = store.load_current_session().unwrap().unwrap();
        assert_eq!(loaded.files[0].recent.bookmark_identifier, Some(recent_only));
        assert_eq!(loaded.files[0].bookmark_identifier, None);
        assert_eq!(loaded.files[1].recent.bookmark_identifier, None);
        assert_eq!(loaded.files[1].bookmark_identifier, Some(own));
    }

    #[test]
    fn test_several_current_sessions_load_newest_and_clear_all() {
        let store = test_store();
        let mut older = snapshot(vec![session_file("/tmp/a.mp4", 0)]);
        older.updated_at = reference_date();
        let mut newer = snapshot(vec![session_file("/tmp/b.mp4", 0)]);
        newer.updated_at = reference_date() + Duration::minutes(5);
        store.save_current_session(&newer).unwrap();
        store.save_current_session(&older).unwrap();

        // Force a state a single save never leaves behind
        store
            .lock()
            .execute("UPDATE sessions SET is_current = 1", [])
            .unwrap();
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM sessions WHERE is_current = 1"),
            2
        );

        assert_eq!(store.load_current_session().unwrap().unwrap().id, newer.id);

        store.clear_current_session().unwrap();
        assert!(store.load_current_session().unwrap().is_none());
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM sessions WHERE is_current = 1"),
            0
        );
        assert_eq!(count(&store, "SELECT COUNT(*) FROM session_files"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM sessions"), 2);
    }

    #[test]
    fn test_bookmark_diffs_round_trip_and_nullify() {
        let store = test_store();
        let file = Path::new("/tmp/diffs.mp4");
        store.set_bookmark(file, 10, true).unwrap();
        let bookmark = store.bookmarks(file).unwrap().remove(0);

        let mut entry = session_file("/tmp/diffs.mp4", 0);
        entry.bookmark_diffs = vec![
            SessionBookmarkDiff {
                id: Uuid::new_v4(),
                bookmark_id: Some(bookmark.id),
                is_removed: true,
                note_delta: None,
            },
            SessionBookmarkDiff {
                id: Uuid::new_v4(),
                bookmark_id: Some(Uuid::new_v4()),
                is_removed: false,
                note_delta: Some("dangling".to_string()),
            },
        ];
        store.save_current_session(&snapshot(vec![entry])).unwrap();

        let loaded = store.load_current_session().unwrap().unwrap();
        let diffs = &loaded.files[0].bookmark_diffs;
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].bookmark_id, Some(bookmark.id));
        assert!(diffs[0].is_removed);
        // Unknown bookmark is stored without a reference
        assert_eq!(diffs[1].bookmark_id, None);
        assert_eq!(diffs[1].note_delta.as_deref(), Some("dangling"));

        // Deleting the bookmark keeps the diff but drops the reference
        store.set_bookmark(file, 10, false).unwrap();
        let loaded = store.load_current_session().unwrap().unwrap();
        assert_eq!(loaded.files[0].bookmark_diffs.len(), 2);
        assert_eq!(loaded.files[0].bookmark_diffs[0].bookmark_id, None);
    }

    #[test]
    fn test_clear_current_session() {
        let store = test_store();
        let mut snap = snapshot(vec![session_file("/tmp/a.mp4", 0)]);
        snap.focused_file = Some(PathBuf::from("/tmp/a.mp4"));
        store.save_current_session(&snap).unwrap();

        store.clear_current_session().unwrap();

        assert!(store.load_current_session().unwrap().is_none());
        assert_eq!(count(&store, "SELECT COUNT(*) FROM session_files"), 0);
        assert_eq!(
            count(
                &store,
                "SELECT COUNT(*) FROM sessions WHERE focused_file_url IS NOT NULL"
            ),
            0
        );

        // Nothing current: still fine
        store.clear_current_session().unwrap();
    }

    #[test]
    fn test_app_version_kept_when_omitted() {
        let store = test_store();
        store.save_current_session(&snapshot(Vec::new())).unwrap();

        let mut without_version = snapshot(Vec::new());
        without_version.app_version = None;
        store.save_current_session(&without_version).unwrap();

        let loaded = store.load_current_session().unwrap().unwrap();
        assert_eq!(loaded.app_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_v1_store_rejects_sessions() {
        let store = SqliteStore::open_in_memory(SchemaVersion::V1).unwrap();
        let file = Path::new("/tmp/v1.mp4");

        store.create_annotation(file, 1, "works").unwrap();
        store.set_bookmark(file, 1, true).unwrap();
        store.set_bookmark(file, 1, false).unwrap();

        assert!(store.load_current_session().unwrap_err().is_unsupported());
        assert!(store
            .save_current_session(&snapshot(Vec::new()))
            .unwrap_err()
            .is_unsupported());
        assert!(store.clear_current_session().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_reopen_file_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.sqlite");
        let file = Path::new("/tmp/persisted.mp4");

        let created = {
            let store =
                SqliteStore::open_with_clock(&path, SchemaVersion::LATEST, fixed_clock(reference_date()))
                    .unwrap();
            store.create_annotation(file, 3, "kept").unwrap()
        };

        let store = SqliteStore::open(&path, SchemaVersion::LATEST).unwrap();
        assert_eq!(store.annotations(file).unwrap(), vec![created]);
    }
}
