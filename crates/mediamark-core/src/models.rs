//! Data models for mediamark
//!
//! Defines the value records the stores hand out: annotations and bookmarks
//! attached to an inspected file, and the workspace session snapshot the
//! application saves on lifecycle transitions.
//!
//! JSON field names follow the on-disk format (`camelCase`, `nodeID`),
//! binary blobs are base64 strings.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::canonical_key;
use crate::storage::error::{StoreError, StoreResult};

/// A user note attached to a node of an inspected file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    /// Unique identifier
    pub id: Uuid,
    /// Opaque address of the annotated node
    #[serde(rename = "nodeID")]
    pub node_id: i64,
    /// The note text
    pub note: String,
    /// When this annotation was created
    pub created_at: DateTime<Utc>,
    /// When the note text last changed
    pub updated_at: DateTime<Utc>,
}

impl AnnotationRecord {
    /// Create a new annotation stamped at `now`
    pub fn new(node_id: i64, note: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id,
            note: note.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the note text
    pub fn set_note(&mut self, note: impl Into<String>, now: DateTime<Utc>) {
        self.note = note.into();
        self.updated_at = now;
    }
}

/// A bookmarked node of an inspected file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    /// Unique identifier
    pub id: Uuid,
    /// Opaque address of the bookmarked node
    #[serde(rename = "nodeID")]
    pub node_id: i64,
    /// When the bookmark was set
    pub created_at: DateTime<Utc>,
}

impl BookmarkRecord {
    /// Create a new bookmark stamped at `now`
    pub fn new(node_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id,
            created_at: now,
        }
    }
}

/// A document the user had open, as remembered by the session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentDocument {
    /// Location of the inspected file
    pub url: PathBuf,
    /// Identifier of the security-scoped bookmark, if any
    #[serde(default)]
    pub bookmark_identifier: Option<Uuid>,
    /// Opaque platform bookmark blob used to reopen the file
    #[serde(default, with = "blob::option")]
    pub bookmark_data: Option<Vec<u8>>,
    /// Name shown in tabs and menus
    pub display_name: String,
    /// When the document was last opened
    pub last_opened: DateTime<Utc>,
}

/// Scroll position of a file's view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

/// A session-local override of a shared bookmark
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionBookmarkDiff {
    pub id: Uuid,
    /// The shared bookmark this diff applies to
    #[serde(default, rename = "bookmarkID")]
    pub bookmark_id: Option<Uuid>,
    /// Hide the bookmark within this session
    pub is_removed: bool,
    /// Extra note text shown only within this session
    #[serde(default)]
    pub note_delta: Option<String>,
}

impl SessionBookmarkDiff {
    /// True when the diff hides or annotates its bookmark
    pub fn is_override(&self) -> bool {
        self.is_removed || self.note_delta.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// Per-file view state inside a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionFileSnapshot {
    pub id: Uuid,
    pub recent: RecentDocument,
    /// Position in the session's file list
    pub order_index: i64,
    #[serde(default, rename = "lastSelectionNodeID")]
    pub last_selection_node_id: Option<i64>,
    pub is_pinned: bool,
    #[serde(default)]
    pub scroll_offset: Option<ScrollOffset>,
    /// Stored apart from `recent.bookmark_identifier`
    #[serde(default)]
    pub bookmark_identifier: Option<Uuid>,
    #[serde(default)]
    pub bookmark_diffs: Vec<SessionBookmarkDiff>,
}

/// Serialized state of one window scene
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowLayoutSnapshot {
    pub id: Uuid,
    pub scene_identifier: String,
    #[serde(with = "blob")]
    pub serialized_layout: Vec<u8>,
    pub is_floating_inspector: bool,
}

/// The complete, authoritative state of the current workspace session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSessionSnapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub files: Vec<SessionFileSnapshot>,
    #[serde(default, rename = "focusedFileURL")]
    pub focused_file: Option<PathBuf>,
    #[serde(default)]
    pub last_scene_identifier: Option<String>,
    #[serde(default)]
    pub window_layouts: Vec<WindowLayoutSnapshot>,
}

impl WorkspaceSessionSnapshot {
    /// Create an empty session stamped at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            app_version: None,
            files: Vec::new(),
            focused_file: None,
            last_scene_identifier: None,
            window_layouts: Vec::new(),
        }
    }

    /// Sort files by order index, then by id string
    pub fn sort_files(&mut self) {
        sort_session_files(&mut self.files);
    }

    /// Files in session order, without mutating the snapshot
    pub fn sorted_files(&self) -> Vec<&SessionFileSnapshot> {
        let mut files: Vec<&SessionFileSnapshot> = self.files.iter().collect();
        files.sort_by(|a, b| session_file_order(a, b));
        files
    }

    /// Find the session entry for a file, comparing canonical keys
    pub fn file_for(&self, file: &Path) -> StoreResult<Option<&SessionFileSnapshot>> {
        let wanted = canonical_key(file)?;
        for entry in &self.files {
            if canonical_key(&entry.recent.url)? == wanted {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Fail with `InvalidRecord` if two files or two window layouts share an id
    pub fn check_unique_ids(&self) -> StoreResult<()> {
        let mut file_ids = HashSet::new();
        if let Some(file) = self.files.iter().find(|f| !file_ids.insert(f.id)) {
            return Err(StoreError::InvalidRecord {
                details: format!("session {} lists file {} twice", self.id, file.id),
            });
        }

        let mut layout_ids = HashSet::new();
        if let Some(layout) = self
            .window_layouts
            .iter()
            .find(|l| !layout_ids.insert(l.id))
        {
            return Err(StoreError::InvalidRecord {
                details: format!("session {} lists window layout {} twice", self.id, layout.id),
            });
        }
        Ok(())
    }
}

/// Total order for session files: order index, ties broken by id string
fn session_file_order(a: &SessionFileSnapshot, b: &SessionFileSnapshot) -> Ordering {
    a.order_index
        .cmp(&b.order_index)
        .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
}

pub(crate) fn sort_session_files(files: &mut [SessionFileSnapshot]) {
    files.sort_by(session_file_order);
}

/// Base64 (de)serialization for binary blobs
pub(crate) mod blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded: Option<String> = Option::deserialize(deserializer)?;
            encoded
                .map(|e| STANDARD.decode(e.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn session_file(id: &str, order_index: i64) -> SessionFileSnapshot {
        SessionFileSnapshot {
            id: Uuid::parse_str(id).unwrap(),
            recent: RecentDocument {
                url: PathBuf::from("/tmp/sample.mp4"),
                bookmark_identifier: None,
                bookmark_data: None,
                display_name: "Sample".to_string(),
                last_opened: at(100),
            },
            order_index,
            last_selection_node_id: None,
            is_pinned: false,
            scroll_offset: None,
            bookmark_identifier: None,
            bookmark_diffs: Vec::new(),
        }
    }

    #[test]
    fn test_annotation_new() {
        let record = AnnotationRecord::new(42, "Check major brand", at(10));
        assert_eq!(record.node_id, 42);
        assert_eq!(record.note, "Check major brand");
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_annotation_set_note_keeps_identity() {
        let mut record = AnnotationRecord::new(7, "Initial", at(10));
        let id = record.id;
        record.set_note("Revised", at(70));

        assert_eq!(record.id, id);
        assert_eq!(record.created_at, at(10));
        assert_eq!(record.updated_at, at(70));
        assert_eq!(record.note, "Revised");
    }

    #[test]
    fn test_annotation_json_field_names() {
        let record = AnnotationRecord::new(5, "x", at(0));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["nodeID"], 5);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("node_id").is_none());
    }

    #[test]
    fn test_sorted_files_tie_breaks_on_id() {
        let mut snapshot = WorkspaceSessionSnapshot::new(at(0));
        snapshot.files = vec![
            session_file("00000000-0000-0000-0000-0000000000cc", 1),
            session_file("00000000-0000-0000-0000-0000000000bb", 1),
            session_file("00000000-0000-0000-0000-0000000000dd", 0),
        ];

        let order: Vec<i64> = snapshot.sorted_files().iter().map(|f| f.order_index).collect();
        assert_eq!(order, vec![0, 1, 1]);

        snapshot.sort_files();
        assert!(snapshot.files[1].id.to_string().ends_with("bb"));
        assert!(snapshot.files[2].id.to_string().ends_with("cc"));
    }

    #[test]
    fn test_check_unique_ids() {
        let mut snapshot = WorkspaceSessionSnapshot::new(at(0));
        snapshot.files = vec![
            session_file("00000000-0000-0000-0000-0000000000aa", 0),
            session_file("00000000-0000-0000-0000-0000000000bb", 1),
        ];
        assert!(snapshot.check_unique_ids().is_ok());

        snapshot
            .files
            .push(session_file("00000000-0000-0000-0000-0000000000aa", 2));
        let err = snapshot.check_unique_ids().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));

        snapshot.files.pop();
        let layout = WindowLayoutSnapshot {
            id: Uuid::new_v4(),
            scene_identifier: "main".to_string(),
            serialized_layout: Vec::new(),
            is_floating_inspector: false,
        };
        snapshot.window_layouts = vec![layout.clone(), layout];
        let err = snapshot.check_unique_ids().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
    }

    #[test]
    fn test_blobs_are_base64_in_json() {
        let layout = WindowLayoutSnapshot {
            id: Uuid::new_v4(),
            scene_identifier: "scene".to_string(),
            serialized_layout: vec![0xAA, 0xBB],
            is_floating_inspector: false,
        };

        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["serializedLayout"], "qrs=");

        let parsed: WindowLayoutSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, layout);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-0000000000aa",
            "createdAt": "2023-11-14T22:13:20Z",
            "updatedAt": "2023-11-14T22:13:20Z"
        }"#;

        let snapshot: WorkspaceSessionSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.files.is_empty());
        assert!(snapshot.window_layouts.is_empty());
        assert!(snapshot.focused_file.is_none());
    }

    #[test]
    fn test_diff_is_override() {
        let mut diff = SessionBookmarkDiff {
            id: Uuid::new_v4(),
            bookmark_id: None,
            is_removed: false,
            note_delta: None,
        };
        assert!(!diff.is_override());

        diff.note_delta = Some(String::new());
        assert!(!diff.is_override());

        diff.note_delta = Some("sync".to_string());
        assert!(diff.is_override());

        diff.note_delta = None;
        diff.is_removed = true;
        assert!(diff.is_override());
    }

    #[test]
    fn test_file_for_matches_equivalent_paths() {
        let mut snapshot = WorkspaceSessionSnapshot::new(at(0));
        snapshot.files = vec![session_file("00000000-0000-0000-0000-0000000000bb", 0)];

        let found = snapshot
            .file_for(Path::new("/tmp/./nested/../sample.mp4"))
            .unwrap();
        assert!(found.is_some());

        let missing = snapshot.file_for(Path::new("/tmp/other.mp4")).unwrap();
        assert!(missing.is_none());
    }
}
