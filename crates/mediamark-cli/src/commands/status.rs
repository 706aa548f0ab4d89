//! Status command handler

use anyhow::Result;

use mediamark_core::{Backend, Config, Store, WorkspaceSessionStoring};

use crate::output::{Output, OutputFormat};

/// Show backend, location and session state
pub fn show(store: &Store, config: &Config, output: &Output) -> Result<()> {
    let location = match store.backend() {
        Backend::Json => config.annotations_dir(),
        Backend::Sqlite => config.sqlite_path(),
    };
    let schema_version = store.schema_version().map(|v| v.as_i32());

    // Unsupported backends simply have no session to report
    let session = match store.load_current_session() {
        Ok(session) => session,
        Err(e) if e.is_unsupported() => None,
        Err(e) => return Err(e.into()),
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "backend": store.backend().to_string(),
                    "data_dir": config.data_dir,
                    "location": location,
                    "schema_version": schema_version,
                    "current_session": session.as_ref().map(|s| s.id),
                    "open_files": session.as_ref().map_or(0, |s| s.files.len()),
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", store.backend());
        }
        OutputFormat::Human => {
            println!("Mediamark Status");
            println!("================");
            println!();
            println!("Storage:");
            println!("  Backend:  {}", store.backend());
            println!("  Location: {}", location.display());
            if let Some(version) = schema_version {
                println!("  Schema:   v{}", version);
            }
            println!();
            println!("Session:");
            match session {
                Some(session) => {
                    println!("  Current: {}", session.id);
                    println!("  Files:   {}", session.files.len());
                }
                None => println!("  (none)"),
            }
        }
    }

    Ok(())
}
