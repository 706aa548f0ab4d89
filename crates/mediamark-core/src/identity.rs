//! File identity resolution
//!
//! Every annotation, bookmark and session file is keyed by the inspected
//! file's canonical location. Two references to the same physical file
//! (relative vs absolute, `..` segments, symlinks) must produce the same
//! key, otherwise a store silently grows duplicate File rows.
//!
//! Resolution runs in three steps:
//! 1. Standardize: make the path absolute and fold `.` / `..` lexically
//! 2. Resolve symlinks on the longest prefix that exists on disk
//! 3. Serialize to an absolute UTF-8 string

use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::storage::error::{StoreError, StoreResult};

/// Longest storage name that still fits a 255-byte file name once a
/// `.json` extension is added
pub const MAX_STORAGE_NAME_LEN: usize = 250;

/// A file reference resolved to its stable storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalFile {
    path: PathBuf,
    key: String,
}

impl CanonicalFile {
    /// Resolve a file reference to its canonical form
    pub fn resolve(file: &Path) -> StoreResult<Self> {
        let standardized = standardize(file)?;
        let path = resolve_symlinks(&standardized);
        let key = path
            .to_str()
            .ok_or_else(|| StoreError::Encoding {
                path: file.to_path_buf(),
            })?
            .to_string();

        Ok(Self { path, key })
    }

    /// The canonical key used as the File entity's unique identifier
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The canonical path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filesystem-safe name derived from the key
    ///
    /// Base64 of the key with `/` mapped to `-`, `+` mapped to `_` and
    /// padding dropped, so it can be used as a single file name.
    /// Keys whose name would not fit in one path component are an
    /// `Encoding` error.
    pub fn storage_name(&self) -> StoreResult<String> {
        let name = STANDARD_NO_PAD
            .encode(self.key.as_bytes())
            .replace('/', "-")
            .replace('+', "_");

        if name.len() > MAX_STORAGE_NAME_LEN {
            return Err(StoreError::Encoding {
                path: self.path.clone(),
            });
        }
        Ok(name)
    }
}

/// Shorthand for `CanonicalFile::resolve(file)?.key()`
pub fn canonical_key(file: &Path) -> StoreResult<String> {
    CanonicalFile::resolve(file).map(|canonical| canonical.key)
}

/// Make a path absolute and fold `.` and `..` components
fn standardize(file: &Path) -> StoreResult<PathBuf> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| StoreError::from_io(e, file.to_path_buf()))?;
        cwd.join(file)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            // Popping past the root leaves the root in place
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    Ok(normalized)
}

/// Resolve symlinks in the longest existing prefix of an absolute path
///
/// The trailing components that do not exist yet are appended unchanged,
/// so files that have not been created still get a stable key.
fn resolve_symlinks(path: &Path) -> PathBuf {
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    let mut current = path;

    loop {
        if let Ok(resolved) = fs::canonicalize(current) {
            let mut out = resolved;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }

        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
