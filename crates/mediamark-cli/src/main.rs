//! Mediamark CLI
//!
//! Command-line interface for mediamark annotation, bookmark and
//! workspace session stores.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mediamark_core::{Config, Store};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MEDIAMARK_LOG";

#[derive(Parser)]
#[command(name = "mediamark")]
#[command(about = "Mediamark - annotations, bookmarks and sessions for inspected media files")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage annotations on a file
    #[command(alias = "note")]
    Annotation {
        #[command(subcommand)]
        command: AnnotationCommands,
    },
    /// Manage bookmarks on a file
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
    /// Inspect or reset the current workspace session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (backend, location, session)
    Status,
}

#[derive(Subcommand)]
enum AnnotationCommands {
    /// List annotations on a file
    #[command(alias = "ls")]
    List {
        /// Inspected file
        file: PathBuf,
    },
    /// Annotate a node
    #[command(alias = "create")]
    Add {
        /// Inspected file
        file: PathBuf,
        /// Node identifier
        #[arg(allow_negative_numbers = true)]
        node: i64,
        /// Note text (opens editor if not provided)
        note: Option<String>,
    },
    /// Change the note of an annotation
    Edit {
        /// Inspected file
        file: PathBuf,
        /// Annotation ID (full UUID or prefix)
        id: String,
        /// New note text (opens editor if not provided)
        note: Option<String>,
    },
    /// Delete an annotation
    #[command(alias = "delete")]
    Rm {
        /// Inspected file
        file: PathBuf,
        /// Annotation ID (full UUID or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum BookmarkCommands {
    /// List bookmarked nodes of a file
    #[command(alias = "ls")]
    List {
        /// Inspected file
        file: PathBuf,
    },
    /// Bookmark a node
    Set {
        /// Inspected file
        file: PathBuf,
        /// Node identifier
        #[arg(allow_negative_numbers = true)]
        node: i64,
    },
    /// Remove a node's bookmark
    Unset {
        /// Inspected file
        file: PathBuf,
        /// Node identifier
        #[arg(allow_negative_numbers = true)]
        node: i64,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Show the current session
    Show,
    /// Forget the current session
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Write the current session to a session document
    Export {
        /// Destination file
        path: PathBuf,
    },
    /// Make a session document the current session
    Import {
        /// Source file
        path: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_deref();

    // Commands that don't need the store
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let store = Store::open_with_config(&config)?;
    debug!(
        backend = %store.backend(),
        schema = ?store.schema_version(),
        data_dir = ?config.data_dir,
        "Store ready"
    );

    match cli.command {
        Commands::Annotation { command } => handle_annotation_command(command, &store, &output),
        Commands::Bookmark { command } => handle_bookmark_command(command, &store, &output),
        Commands::Session { command } => handle_session_command(command, &store, &output),
        Commands::Config { .. } => Ok(()), // Handled above
        Commands::Status => commands::status::show(&store, &config, &output),
    }
}

fn handle_annotation_command(
    command: AnnotationCommands,
    store: &Store,
    output: &Output,
) -> Result<()> {
    match command {
        AnnotationCommands::List { file } => commands::annotation::list(store, &file, output),
        AnnotationCommands::Add { file, node, note } => {
            commands::annotation::add(store, &file, node, note, output)
        }
        AnnotationCommands::Edit { file, id, note } => {
            commands::annotation::edit(store, &file, &id, note, output)
        }
        AnnotationCommands::Rm { file, id, force } => {
            commands::annotation::delete(store, &file, &id, force, output)
        }
    }
}

fn handle_bookmark_command(command: BookmarkCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        BookmarkCommands::List { file } => commands::bookmark::list(store, &file, output),
        BookmarkCommands::Set { file, node } => {
            commands::bookmark::set(store, &file, node, true, output)
        }
        BookmarkCommands::Unset { file, node } => {
            commands::bookmark::set(store, &file, node, false, output)
        }
    }
}

fn handle_session_command(command: SessionCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        SessionCommands::Show => commands::session::show(store, output),
        SessionCommands::Clear { force } => commands::session::clear(store, force, output),
        SessionCommands::Export { path } => commands::session::export(store, &path, output),
        SessionCommands::Import { path } => commands::session::import(store, &path, output),
    }
}

/// Log to stderr, filtered by MEDIAMARK_LOG (default: warn)
fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
