//! Annotation command handlers
//!
//! Annotations are notes attached to a node of an inspected file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use mediamark_core::{AnnotationBookmarkStoring, AnnotationRecord, Store};

use crate::editor::{confirm, edit_note};
use crate::output::{short_id, Output, OutputFormat};

/// List annotations on a file
pub fn list(store: &Store, file: &Path, output: &Output) -> Result<()> {
    let annotations = store
        .annotations(file)
        .with_context(|| format!("Failed to read annotations for {}", file.display()))?;
    output.print_annotations(&annotations);
    Ok(())
}

/// Add an annotation, opening the editor when no note is given
pub fn add(
    store: &Store,
    file: &Path,
    node_id: i64,
    note: Option<String>,
    output: &Output,
) -> Result<()> {
    let note = match note {
        Some(note) => note,
        None => edit_note(
            &[format!("Annotating node {} of {}", node_id, file.display())],
            "",
        )?,
    };

    if note.trim().is_empty() {
        bail!("Annotation note cannot be empty");
    }

    let annotation = store
        .create_annotation(file, node_id, &note)
        .context("Failed to create annotation")?;

    match output.format {
        OutputFormat::Human => output.success(&format!(
            "Added annotation {} on node {}",
            short_id(&annotation.id.to_string()),
            node_id
        )),
        _ => output.print_annotation(&annotation),
    }
    Ok(())
}

/// Replace the note of an annotation
pub fn edit(
    store: &Store,
    file: &Path,
    id: &str,
    note: Option<String>,
    output: &Output,
) -> Result<()> {
    let existing = resolve_annotation(store, file, id)?;

    let note = match note {
        Some(note) => note,
        None => edit_note(
            &[format!(
                "Editing annotation {} on node {} of {}",
                short_id(&existing.id.to_string()),
                existing.node_id,
                file.display()
            )],
            &existing.note,
        )?,
    };

    if note.trim().is_empty() {
        bail!("Annotation note cannot be empty");
    }
    if note == existing.note {
        output.message("No changes made.");
        return Ok(());
    }

    let updated = store
        .update_annotation(file, existing.id, &note)
        .context("Failed to update annotation")?;

    output.success(&format!(
        "Updated annotation {}",
        short_id(&updated.id.to_string())
    ));
    Ok(())
}

/// Delete an annotation
pub fn delete(store: &Store, file: &Path, id: &str, force: bool, output: &Output) -> Result<()> {
    let existing = resolve_annotation(store, file, id)?;

    if !force && output.should_prompt() {
        println!(
            "Delete annotation: {} (node {}) - {}",
            short_id(&existing.id.to_string()),
            existing.node_id,
            existing.note.lines().next().unwrap_or("")
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .delete_annotation(file, existing.id)
        .context("Failed to delete annotation")?;

    output.success(&format!(
        "Deleted annotation {}",
        short_id(&existing.id.to_string())
    ));
    Ok(())
}

/// Find an annotation of `file` by full UUID or unique prefix
fn resolve_annotation(store: &Store, file: &Path, id: &str) -> Result<AnnotationRecord> {
    let annotations = store
        .annotations(file)
        .with_context(|| format!("Failed to read annotations for {}", file.display()))?;

    // Try full UUID first
    if let Ok(uuid) = Uuid::parse_str(id) {
        return annotations
            .into_iter()
            .find(|a| a.id == uuid)
            .with_context(|| format!("No annotation {} on {}", uuid, file.display()));
    }

    let prefix = id.to_ascii_lowercase();
    let mut matches: Vec<AnnotationRecord> = annotations
        .into_iter()
        .filter(|a| a.id.to_string().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => bail!("No annotation found matching: {}", id),
        1 => Ok(matches.remove(0)),
        _ => {
            eprintln!("Multiple annotations match '{}':", id);
            for annotation in &matches {
                eprintln!("  {} - node {}", annotation.id, annotation.node_id);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
