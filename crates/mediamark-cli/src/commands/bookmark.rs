//! Bookmark command handlers

use std::path::Path;

use anyhow::{Context, Result};

use mediamark_core::{AnnotationBookmarkStoring, Store};

use crate::output::Output;

/// List bookmarked nodes of a file
pub fn list(store: &Store, file: &Path, output: &Output) -> Result<()> {
    let bookmarks = store
        .bookmarks(file)
        .with_context(|| format!("Failed to read bookmarks for {}", file.display()))?;
    output.print_bookmarks(&bookmarks);
    Ok(())
}

/// Bookmark or unbookmark a node; repeating either is harmless
pub fn set(
    store: &Store,
    file: &Path,
    node_id: i64,
    is_bookmarked: bool,
    output: &Output,
) -> Result<()> {
    store
        .set_bookmark(file, node_id, is_bookmarked)
        .context("Failed to update bookmark")?;

    let verb = if is_bookmarked { "Bookmarked" } else { "Unbookmarked" };
    output.success(&format!("{} node {} of {}", verb, node_id, file.display()));
    Ok(())
}
