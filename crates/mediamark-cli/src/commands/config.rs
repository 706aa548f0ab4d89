//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use mediamark_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "backend": config.backend.to_string(),
                    "schema_version": config.schema_version.as_i32(),
                    "annotations_dir": config.annotations_dir(),
                    "sqlite_path": config.sqlite_path(),
                    "session_path": config.session_path(),
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:       {}", config.data_dir.display());
            println!("  backend:        {}", config.backend);
            println!("  schema_version: {}", config.schema_version.as_i32());
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}
