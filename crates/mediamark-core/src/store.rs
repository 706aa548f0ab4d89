//! Store contracts and the unified store handle
//!
//! Two capability traits decouple callers from the backend:
//!
//! - [`AnnotationBookmarkStoring`]: per-file annotations and bookmarks,
//!   implemented by every backend
//! - [`WorkspaceSessionStoring`]: the single current workspace session,
//!   implemented by the SQLite backend (v2 schema) and [`JsonSessionStore`]
//!
//! [`Store`] picks a backend from [`Config`] at startup and forwards both
//! contracts to it.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! let note = store.create_annotation(Path::new("movie.mp4"), 42, "Check brand")?;
//! store.set_bookmark(Path::new("movie.mp4"), 42, true)?;
//!
//! let session = store.load_current_session()?;
//! ```
//!
//! [`JsonSessionStore`]: crate::storage::JsonSessionStore

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

use crate::clock::{system_clock, Clock};
use crate::config::{Backend, Config};
use crate::models::{AnnotationRecord, BookmarkRecord, WorkspaceSessionSnapshot};
use crate::storage::error::StoreResult;
use crate::storage::{JsonAnnotationStore, SchemaVersion, SqliteStore};

/// Per-file annotation and bookmark persistence
///
/// Every method is one atomic unit of work. Implementations serialize
/// concurrent callers internally.
pub trait AnnotationBookmarkStoring: Send + Sync {
    /// Annotations for `file`, oldest first; empty if the file is unknown
    fn annotations(&self, file: &Path) -> StoreResult<Vec<AnnotationRecord>>;

    /// Bookmarks for `file`, oldest first; empty if the file is unknown
    fn bookmarks(&self, file: &Path) -> StoreResult<Vec<BookmarkRecord>>;

    /// Attach a new note to `node_id`
    fn create_annotation(&self, file: &Path, node_id: i64, note: &str)
        -> StoreResult<AnnotationRecord>;

    /// Replace the note text of an existing annotation
    ///
    /// Fails with `AnnotationNotFound` if `id` is not an annotation of `file`.
    fn update_annotation(&self, file: &Path, id: Uuid, note: &str)
        -> StoreResult<AnnotationRecord>;

    /// Remove an annotation
    ///
    /// Fails with `AnnotationNotFound` if `id` is not an annotation of `file`.
    fn delete_annotation(&self, file: &Path, id: Uuid) -> StoreResult<()>;

    /// Add or remove the bookmark on `node_id`; idempotent in both directions
    fn set_bookmark(&self, file: &Path, node_id: i64, is_bookmarked: bool) -> StoreResult<()>;
}

/// Persistence of the single current workspace session
pub trait WorkspaceSessionStoring: Send + Sync {
    /// The current session, if one has been saved and not cleared
    fn load_current_session(&self) -> StoreResult<Option<WorkspaceSessionSnapshot>>;

    /// Make `snapshot` the current session, replacing its previous contents
    fn save_current_session(&self, snapshot: &WorkspaceSessionSnapshot) -> StoreResult<()>;

    /// Forget the current session; a no-op when there is none
    fn clear_current_session(&self) -> StoreResult<()>;
}

/// A store opened on the configured backend
pub enum Store {
    Json(JsonAnnotationStore),
    Sqlite(SqliteStore),
}

impl Store {
    /// Open the store described by the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(&config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: &Config) -> Result<Self> {
        Self::open_with_clock(config, system_clock())
    }

    /// Open the store with a specific configuration and clock
    pub fn open_with_clock(config: &Config, clock: Clock) -> Result<Self> {
        config.ensure_data_dir()?;

        let store = match config.backend {
            Backend::Json => {
                Store::Json(JsonAnnotationStore::with_clock(config.annotations_dir(), clock))
            }
            Backend::Sqlite => Store::Sqlite(
                SqliteStore::open_with_clock(&config.sqlite_path(), config.schema_version, clock)
                    .with_context(|| {
                        format!("Failed to open database: {:?}", config.sqlite_path())
                    })?,
            ),
        };

        info!(backend = %config.backend, data_dir = ?config.data_dir, "Opened store");
        Ok(store)
    }

    /// Which backend this store uses
    pub fn backend(&self) -> Backend {
        match self {
            Store::Json(_) => Backend::Json,
            Store::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Effective schema version of a SQLite store
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        match self {
            Store::Json(_) => None,
            Store::Sqlite(store) => Some(store.schema_version()),
        }
    }

    fn annotations_backend(&self) -> &dyn AnnotationBookmarkStoring {
        match self {
            Store::Json(store) => store,
            Store::Sqlite(store) => store,
        }
    }

    fn session_backend(&self) -> &dyn WorkspaceSessionStoring {
        match self {
            Store::Json(store) => store,
            Store::Sqlite(store) => store,
        }
    }
}

impl AnnotationBookmarkStoring for Store {
    fn annotations(&self, file: &Path) -> StoreResult<Vec<AnnotationRecord>> {
        self.annotations_backend().annotations(file)
    }

    fn bookmarks(&self, file: &Path) -> StoreResult<Vec<BookmarkRecord>> {
        self.annotations_backend().bookmarks(file)
    }

    fn create_annotation(
        &self,
        file: &Path,
        node_id: i64,
        note: &str,
    ) -> StoreResult<AnnotationRecord> {
        self.annotations_backend()
            .create_annotation(file, node_id, note)
    }

    fn update_annotation(&self, file: &Path, id: Uuid, note: &str) -> StoreResult<AnnotationRecord> {
        self.annotations_backend().update_annotation(file, id, note)
    }

    fn delete_annotation(&self, file: &Path, id: Uuid) -> StoreResult<()> {
        self.annotations_backend().delete_annotation(file, id)
    }

    fn set_bookmark(&self, file: &Path, node_id: i64, is_bookmarked: bool) -> StoreResult<()> {
        self.annotations_backend()
            .set_bookmark(file, node_id, is_bookmarked)
    }
}

impl WorkspaceSessionStoring for Store {
    fn load_current_session(&self) -> StoreResult<Option<WorkspaceSessionSnapshot>> {
        self.session_backend().load_current_session()
    }

    fn save_current_session(&self, snapshot: &WorkspaceSessionSnapshot) -> StoreResult<()> {
        self.session_backend().save_current_session(snapshot)
    }

    fn clear_current_session(&self) -> StoreResult<()> {
        self.session_backend().clear_current_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_clock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir, backend: Backend) -> Config {
        Config {
            data_dir: temp_dir.path().join("data"),
            backend,
            schema_version: SchemaVersion::LATEST,
        }
    }

    fn clock() -> Clock {
        fixed_clock(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn test_open_json_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, Backend::Json);
        let store = Store::open_with_clock(&config, clock()).unwrap();

        assert_eq!(store.backend(), Backend::Json);
        assert!(store.schema_version().is_none());
        assert!(config.data_dir.exists());

        let file = Path::new("/tmp/sample.mp4");
        store.create_annotation(file, 1, "note").unwrap();
        assert!(config.annotations_dir().exists());
        assert!(store.load_current_session().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_open_sqlite_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, Backend::Sqlite);
        let store = Store::open_with_clock(&config, clock()).unwrap();

        assert_eq!(store.backend(), Backend::Sqlite);
        assert_eq!(store.schema_version(), Some(SchemaVersion::V2));
        assert!(config.sqlite_path().exists());
        assert!(store.load_current_session().unwrap().is_none());
    }

    #[test]
    fn test_backends_agree_on_annotation_contract() {
        let temp_dir = TempDir::new().unwrap();
        let file = Path::new("/tmp/contract.mp4");

        for backend in [Backend::Json, Backend::Sqlite] {
            let config = Config {
                data_dir: temp_dir.path().join(backend.to_string()),
                backend,
                schema_version: SchemaVersion::LATEST,
            };
            let store = Store::open_with_clock(&config, clock()).unwrap();

            let created = store.create_annotation(file, 5, "x").unwrap();
            let listed = store.annotations(file).unwrap();
            assert_eq!(listed, vec![created.clone()], "backend {backend}");

            store.set_bookmark(file, 5, true).unwrap();
            store.set_bookmark(file, 5, true).unwrap();
            assert_eq!(store.bookmarks(file).unwrap().len(), 1, "backend {backend}");

            let err = store.delete_annotation(file, Uuid::new_v4()).unwrap_err();
            assert!(err.is_not_found(), "backend {backend}");
        }
    }
}
