//! Flat-file annotation store
//!
//! One JSON document per inspected file, named after the file's canonical
//! key (see [`CanonicalFile::storage_name`]) inside a configured directory:
//!
//! ```text
//! { "annotations": [...], "bookmarks": [...] }
//! ```
//!
//! This backend only persists per-file annotations and bookmarks. Workspace
//! session operations report `Unsupported`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clock::{stamp, system_clock, Clock};
use crate::identity::CanonicalFile;
use crate::models::{AnnotationRecord, BookmarkRecord, WorkspaceSessionSnapshot};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::persistence::{load_json, save_json};
use crate::store::{AnnotationBookmarkStoring, WorkspaceSessionStoring};

/// On-disk shape of one file's annotations and bookmarks
#[derive(Debug, Default, Serialize, Deserialize)]
struct AnnotationDocument {
    #[serde(default)]
    annotations: Vec<AnnotationRecord>,
    #[serde(default)]
    bookmarks: Vec<BookmarkRecord>,
}

/// JSON-per-file annotation and bookmark store
pub struct JsonAnnotationStore {
    directory: PathBuf,
    clock: Clock,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonAnnotationStore {
    /// Create a store rooted at `directory` using the wall clock
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_clock(directory, system_clock())
    }

    /// Create a store with an explicit clock
    pub fn with_clock(directory: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            directory: directory.into(),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the documents
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the document that stores `file`'s records
    pub fn document_path(&self, file: &Path) -> StoreResult<PathBuf> {
        let canonical = CanonicalFile::resolve(file)?;
        self.document_path_for(&canonical)
    }

    fn document_path_for(&self, canonical: &CanonicalFile) -> StoreResult<PathBuf> {
        Ok(self
            .directory
            .join(format!("{}.json", canonical.storage_name()?)))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, canonical: &CanonicalFile) -> StoreResult<Option<AnnotationDocument>> {
        load_json(&self.document_path_for(canonical)?)
    }

    fn persist(&self, canonical: &CanonicalFile, doc: &AnnotationDocument) -> StoreResult<()> {
        save_json(&self.document_path_for(canonical)?, doc)
    }
}

impl AnnotationBookmarkStoring for JsonAnnotationStore {
    fn annotations(&self, file: &Path) -> StoreResult<Vec<AnnotationRecord>> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let mut annotations = self
            .load(&canonical)?
            .map(|doc| doc.annotations)
            .unwrap_or_default();
        annotations.sort_by_key(|a| a.created_at);
        Ok(annotations)
    }

    fn bookmarks(&self, file: &Path) -> StoreResult<Vec<BookmarkRecord>> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let mut bookmarks = self
            .load(&canonical)?
            .map(|doc| doc.bookmarks)
            .unwrap_or_default();
        bookmarks.sort_by_key(|b| b.created_at);
        Ok(bookmarks)
    }

    fn create_annotation(
        &self,
        file: &Path,
        node_id: i64,
        note: &str,
    ) -> StoreResult<AnnotationRecord> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let mut doc = self.load(&canonical)?.unwrap_or_default();

        let record = AnnotationRecord::new(node_id, note, stamp(&self.clock));
        doc.annotations.push(record.clone());
        self.persist(&canonical, &doc)?;

        debug!(file = canonical.key(), node_id, id = %record.id, "Created annotation");
        Ok(record)
    }

    fn update_annotation(&self, file: &Path, id: Uuid, note: &str) -> StoreResult<AnnotationRecord> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let mut doc = self
            .load(&canonical)?
            .ok_or(StoreError::AnnotationNotFound { id })?;

        let record = doc
            .annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::AnnotationNotFound { id })?;
        record.set_note(note, stamp(&self.clock));
        let updated = record.clone();

        self.persist(&canonical, &doc)?;

        debug!(file = canonical.key(), %id, "Updated annotation");
        Ok(updated)
    }

    fn delete_annotation(&self, file: &Path, id: Uuid) -> StoreResult<()> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let mut doc = self
            .load(&canonical)?
            .ok_or(StoreError::AnnotationNotFound { id })?;

        let before = doc.annotations.len();
        doc.annotations.retain(|a| a.id != id);
        if doc.annotations.len() == before {
            return Err(StoreError::AnnotationNotFound { id });
        }

        self.persist(&canonical, &doc)?;

        debug!(file = canonical.key(), %id, "Deleted annotation");
        Ok(())
    }

    fn set_bookmark(&self, file: &Path, node_id: i64, is_bookmarked: bool) -> StoreResult<()> {
        let canonical = CanonicalFile::resolve(file)?;
        let _guard = self.lock();
        let existing = self.load(&canonical)?;

        if is_bookmarked {
            let mut doc = existing.unwrap_or_default();
            if doc.bookmarks.iter().any(|b| b.node_id == node_id) {
                return Ok(());
            }
            doc.bookmarks
                .push(BookmarkRecord::new(node_id, stamp(&self.clock)));
            self.persist(&canonical, &doc)?;
            debug!(file = canonical.key(), node_id, "Set bookmark");
        } else {
            // Never materialize a document just to remove nothing from it
            let Some(mut doc) = existing else {
                return Ok(());
            };
            let before = doc.bookmarks.len();
            doc.bookmarks.retain(|b| b.node_id != node_id);
            if doc.bookmarks.len() == before {
                return Ok(());
            }
            self.persist(&canonical, &doc)?;
            debug!(file = canonical.key(), node_id, "Cleared bookmark");
        }

        Ok(())
    }
}

impl WorkspaceSessionStoring for JsonAnnotationStore {
    fn load_current_session(&self) -> StoreResult<Option<WorkspaceSessionSnapshot>> {
        Err(StoreError::unsupported("load_current_session"))
    }

    fn save_current_session(&self, _snapshot: &WorkspaceSessionSnapshot) -> StoreResult<()> {
        Err(StoreError::unsupported("save_current_session"))
    }

    fn clear_current_session(&self) -> StoreResult<()> {
        Err(StoreError::unsupported("clear_current_session"))
    }
}
