//! JSON document persistence
//!
//! Shared file plumbing for the flat-file stores: documents are read whole,
//! modified in memory and written back with an atomic write (temp file,
//! fsync, rename) so a crash never leaves a half-written document behind.
//!
//! Documents are pretty-printed with sorted keys so they diff cleanly.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::error::{StoreError, StoreResult};

/// Load a JSON document
///
/// Returns `None` if the file doesn't exist.
/// Returns an error if the file exists but can't be read or parsed.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => StoreError::from_io(e, path.to_path_buf()),
        _ => StoreError::ReadError {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    Ok(Some(value))
}

/// Save a JSON document atomically
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = to_sorted_pretty_json(value)?;
    atomic_write(path, &bytes)
}

/// Remove a document if it exists
pub fn remove_if_exists(path: &Path) -> StoreResult<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| StoreError::from_io(e, path.to_path_buf()))?;
    }
    Ok(())
}

/// Pretty-print with object keys sorted
///
/// Round-tripping through `serde_json::Value` sorts keys because its map
/// is a `BTreeMap` without the `preserve_order` feature.
fn to_sorted_pretty_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    // Same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StoreError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StoreError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        zeta: u32,
        alpha: String,
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let loaded: Option<Doc> = load_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");
        let doc = Doc {
            zeta: 1,
            alpha: "a".to_string(),
        };

        save_json(&path, &doc).unwrap();
        let loaded: Doc = load_json(&path).unwrap().unwrap();

        assert_eq!(loaded, doc);
        assert!(!temp_dir.path().join("doc.tmp").exists());
    }

    #[test]
    fn test_keys_are_sorted_and_pretty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");
        save_json(
            &path,
            &Doc {
                zeta: 1,
                alpha: "a".to_string(),
            },
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let alpha = text.find("\"alpha\"").unwrap();
        let zeta = text.find("\"zeta\"").unwrap();
        assert!(alpha < zeta);
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_invalid_document_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = load_json::<Doc>(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFormat { .. }));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("file.txt");

        atomic_write(&nested_path, b"test data").unwrap();

        assert!(nested_path.exists());
        let content = fs::read_to_string(&nested_path).unwrap();
        assert_eq!(content, "test data");
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");

        // Missing file is fine
        remove_if_exists(&path).unwrap();

        fs::write(&path, b"{}").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
