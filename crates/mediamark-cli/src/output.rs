//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use mediamark_core::{AnnotationRecord, BookmarkRecord, WorkspaceSessionSnapshot};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode JSON output: {}", e),
        }
    }

    /// Print a single annotation
    pub fn print_annotation(&self, annotation: &AnnotationRecord) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", annotation.id);
                println!("Node:    {}", annotation.node_id);
                println!("Created: {}", annotation.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated: {}", annotation.updated_at.format("%Y-%m-%d %H:%M"));
                println!();
                println!("{}", annotation.note);
            }
            OutputFormat::Json => self.print_json(annotation),
            OutputFormat::Quiet => println!("{}", annotation.id),
        }
    }

    /// Print the annotations of one file
    pub fn print_annotations(&self, annotations: &[AnnotationRecord]) {
        match self.format {
            OutputFormat::Human => {
                if annotations.is_empty() {
                    println!("No annotations found.");
                    return;
                }
                for annotation in annotations {
                    println!(
                        "{} | node {:>8} | {} | {}",
                        short_id(&annotation.id.to_string()),
                        annotation.node_id,
                        annotation.updated_at.format("%Y-%m-%d %H:%M"),
                        truncate_line(&annotation.note, 50)
                    );
                }
                println!("\n{} annotation(s)", annotations.len());
            }
            OutputFormat::Json => self.print_json(annotations),
            OutputFormat::Quiet => {
                for annotation in annotations {
                    println!("{}", annotation.id);
                }
            }
        }
    }

    /// Print the bookmarks of one file
    pub fn print_bookmarks(&self, bookmarks: &[BookmarkRecord]) {
        match self.format {
            OutputFormat::Human => {
                if bookmarks.is_empty() {
                    println!("No bookmarks found.");
                    return;
                }
                for bookmark in bookmarks {
                    println!(
                        "node {:>8} | {}",
                        bookmark.node_id,
                        bookmark.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
                println!("\n{} bookmark(s)", bookmarks.len());
            }
            OutputFormat::Json => self.print_json(bookmarks),
            OutputFormat::Quiet => {
                for bookmark in bookmarks {
                    println!("{}", bookmark.node_id);
                }
            }
        }
    }

    /// Print the current session, or a note that there is none
    pub fn print_session(&self, session: Option<&WorkspaceSessionSnapshot>) {
        let Some(session) = session else {
            match self.format {
                OutputFormat::Human => println!("No current session."),
                OutputFormat::Json => println!("null"),
                OutputFormat::Quiet => {}
            }
            return;
        };

        match self.format {
            OutputFormat::Human => {
                println!("Session:  {}", session.id);
                if let Some(ref version) = session.app_version {
                    println!("App:      {}", version);
                }
                println!("Updated:  {}", session.updated_at.format("%Y-%m-%d %H:%M"));
                if let Some(ref focused) = session.focused_file {
                    println!("Focused:  {}", focused.display());
                }
                if let Some(ref scene) = session.last_scene_identifier {
                    println!("Scene:    {}", scene);
                }

                println!();
                println!("── Files ({}) ──", session.files.len());
                for file in session.sorted_files() {
                    let pin = if file.is_pinned { "*" } else { " " };
                    let overrides = file
                        .bookmark_diffs
                        .iter()
                        .filter(|d| d.is_override())
                        .count();
                    let overrides = if overrides == 0 {
                        String::new()
                    } else {
                        format!(" [{} override(s)]", overrides)
                    };
                    println!(
                        "{}{:>3} {}{} | {}",
                        pin,
                        file.order_index,
                        truncate(&file.recent.display_name, 30),
                        overrides,
                        file.recent.url.display()
                    );
                }

                if !session.window_layouts.is_empty() {
                    println!();
                    println!("── Windows ({}) ──", session.window_layouts.len());
                    for layout in &session.window_layouts {
                        let floating = if layout.is_floating_inspector {
                            " (floating inspector)"
                        } else {
                            ""
                        };
                        println!(
                            "{}{} | {} byte(s)",
                            layout.scene_identifier,
                            floating,
                            layout.serialized_layout.len()
                        );
                    }
                }
            }
            OutputFormat::Json => self.print_json(session),
            OutputFormat::Quiet => println!("{}", session.id),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
