//! Mediamark Core Library
//!
//! Persistence for a media inspector: user annotations and bookmarks keyed
//! by inspected file, and the current workspace session (open files, view
//! state, window layouts, session-local bookmark overrides).
//!
//! # Architecture
//!
//! - **Store contracts**: `AnnotationBookmarkStoring` and
//!   `WorkspaceSessionStoring`, implemented by every backend
//! - **JSON backend**: one document per inspected file
//! - **SQLite backend**: normalized tables, schema v1/v2, sessions
//!
//! Files are identified by their canonical key (absolute, dot segments
//! folded, symlinks resolved), so equivalent paths share records.
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! let file = Path::new("capture.mp4");
//! let note = store.create_annotation(file, 42, "Check major brand")?;
//! store.set_bookmark(file, 42, true)?;
//!
//! let notes = store.annotations(file)?;
//! ```
//!
//! # Modules
//!
//! - `store`: Store contracts and the unified `Store` (main entry point)
//! - `models`: Annotation, bookmark and session snapshot records
//! - `identity`: Canonical file keys
//! - `storage`: Backends, schema and errors
//! - `clock`: Injectable time source
//! - `config`: Application configuration

pub mod clock;
pub mod config;
pub mod identity;
pub mod models;
pub mod storage;
pub mod store;

pub use clock::{fixed_clock, system_clock, Clock};
pub use config::{Backend, Config};
pub use identity::{canonical_key, CanonicalFile};
pub use models::{
    AnnotationRecord, BookmarkRecord, RecentDocument, ScrollOffset, SessionBookmarkDiff,
    SessionFileSnapshot, WindowLayoutSnapshot, WorkspaceSessionSnapshot,
};
pub use storage::{
    JsonAnnotationStore, JsonSessionStore, SchemaVersion, SqliteStore, StoreError, StoreResult,
};
pub use store::{AnnotationBookmarkStoring, Store, WorkspaceSessionStoring};
