//! Storage layer
//!
//! Backends behind the store contracts:
//!
//! - **json**: one JSON document per inspected file (annotations, bookmarks)
//! - **sqlite**: normalized SQLite database with versioned schema and
//!   workspace sessions
//! - **session_file**: the workspace session as a single JSON document

pub mod error;
pub mod json;
pub mod persistence;
pub mod schema;
pub mod session_file;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use json::JsonAnnotationStore;
pub use schema::SchemaVersion;
pub use session_file::JsonSessionStore;
pub use sqlite::SqliteStore;
