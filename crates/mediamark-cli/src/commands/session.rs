//! Workspace session command handlers

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use mediamark_core::{JsonSessionStore, Store, WorkspaceSessionStoring};

use crate::editor::confirm;
use crate::output::Output;

/// Show the current session
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let session = store
        .load_current_session()
        .context("Failed to load current session")?;
    output.print_session(session.as_ref());
    Ok(())
}

/// Forget the current session
pub fn clear(store: &Store, force: bool, output: &Output) -> Result<()> {
    let Some(session) = store
        .load_current_session()
        .context("Failed to load current session")?
    else {
        output.message("No current session.");
        return Ok(());
    };

    if !force && output.should_prompt() {
        println!(
            "Clear session {} ({} open file(s))",
            session.id,
            session.files.len()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .clear_current_session()
        .context("Failed to clear current session")?;
    output.success("Cleared current session");
    Ok(())
}

/// Write the current session to a standalone session document
pub fn export(store: &Store, path: &Path, output: &Output) -> Result<()> {
    let Some(session) = store
        .load_current_session()
        .context("Failed to load current session")?
    else {
        output.message("No current session to export.");
        return Ok(());
    };

    debug!(session = %session.id, path = ?path, "Exporting session");
    JsonSessionStore::new(path)
        .save_current_session(&session)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    output.success(&format!(
        "Exported session {} to {}",
        session.id,
        path.display()
    ));
    Ok(())
}

/// Make the session in a standalone document the current session
pub fn import(store: &Store, path: &Path, output: &Output) -> Result<()> {
    let session = JsonSessionStore::new(path)
        .load_current_session()
        .with_context(|| format!("Failed to read {}", path.display()))?
        .with_context(|| format!("No session document at {}", path.display()))?;

    debug!(session = %session.id, path = ?path, "Importing session");
    store
        .save_current_session(&session)
        .context("Failed to save session")?;
    output.success(&format!(
        "Imported session {} ({} file(s))",
        session.id,
        session.files.len()
    ));
    Ok(())
}
