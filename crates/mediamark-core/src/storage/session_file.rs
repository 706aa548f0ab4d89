//! Workspace session as a single JSON document
//!
//! The whole [`WorkspaceSessionSnapshot`] is written to one file
//! (`WorkspaceSession.json` by default). Loading a missing file yields no
//! session; clearing deletes the file.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::models::{sort_session_files, WorkspaceSessionSnapshot};
use crate::storage::error::StoreResult;
use crate::storage::persistence::{load_json, remove_if_exists, save_json};
use crate::store::WorkspaceSessionStoring;

/// Default document name inside the data directory
pub const SESSION_FILE_NAME: &str = "WorkspaceSession.json";

/// Session store backed by one JSON file
pub struct JsonSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSessionStore {
    /// Store the session at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store the session as [`SESSION_FILE_NAME`] inside `directory`
    pub fn in_directory(directory: &Path) -> Self {
        Self::new(directory.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkspaceSessionStoring for JsonSessionStore {
    fn load_current_session(&self) -> StoreResult<Option<WorkspaceSessionSnapshot>> {
        let _guard = self.lock();
        let mut snapshot: Option<WorkspaceSessionSnapshot> = load_json(&self.path)?;
        if let Some(snapshot) = snapshot.as_mut() {
            sort_session_files(&mut snapshot.files);
            debug!(session = %snapshot.id, path = ?self.path, "Loaded session document");
        }
        Ok(snapshot)
    }

    fn save_current_session(&self, snapshot: &WorkspaceSessionSnapshot) -> StoreResult<()> {
        snapshot.check_unique_ids()?;
        let _guard = self.lock();
        save_json(&self.path, snapshot)?;
        info!(session = %snapshot.id, path = ?self.path, "Saved session document");
        Ok(())
    }

    fn clear_current_session(&self) -> StoreResult<()> {
        let _guard = self.lock();
        remove_if_exists(&self.path)?;
        info!(path = ?self.path, "Cleared session document");
        Ok(())
    }
}
