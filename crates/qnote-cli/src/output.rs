//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use qnote_core::archive::{DecodeSummary, EncodeSummary, Header};
use qnote_core::{ArchiveError, Book, ImportReport, Note};

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

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single note in full
    pub fn print_note(&self, note: &Note) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", note.id);
                println!("Title:    {}", note.title);
                println!("Book:     {}", note.book.name);
                println!("Type:     {}", note.note_type);
                if !note.tags.is_empty() {
                    println!("Tags:     {}", tag_list(note));
                }
                println!("Created:  {}", note.created.format("%Y-%m-%d %H:%M"));
                println!("Modified: {}", note.modified.format("%Y-%m-%d %H:%M"));
                if !note.body.is_empty() {
                    println!();
                    println!("{}", note.body);
                }
            }
            OutputFormat::Json => print_json(note)?,
            OutputFormat::Quiet => println!("{}", note.id),
        }
        Ok(())
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[Note]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return Ok(());
                }
                for note in notes {
                    let tags = if note.tags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", tag_list(note))
                    };
                    println!(
                        "{:>5} | {} | {} | {}{}",
                        note.id,
                        note.created.format("%Y-%m-%d"),
                        truncate(note.book.name.as_str(), 12),
                        truncate(&note.title, 45),
                        tags
                    );
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(&notes)?,
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
        Ok(())
    }

    /// Print books with their note counts
    pub fn print_books(&self, books: &[(Book, usize)]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("No books found.");
                    return Ok(());
                }
                for (book, count) in books {
                    println!("{} ({})", book.name, count);
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => {
                let json_books: Vec<_> = books
                    .iter()
                    .map(|(book, count)| {
                        json!({
                            "id": book.id,
                            "name": book.name,
                            "created": book.created,
                            "count": count
                        })
                    })
                    .collect();
                print_json(&json_books)?;
            }
            OutputFormat::Quiet => {
                for (book, _) in books {
                    println!("{}", book.name);
                }
            }
        }
        Ok(())
    }

    /// Print a list of tags
    pub fn print_tags(&self, tags: &[(String, i64)]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return Ok(());
                }
                for (name, count) in tags {
                    println!("{} ({})", name, count);
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => {
                let json_tags: Vec<_> = tags
                    .iter()
                    .map(|(name, count)| json!({"name": name, "count": count}))
                    .collect();
                print_json(&json_tags)?;
            }
            OutputFormat::Quiet => {
                for (name, _) in tags {
                    println!("{}", name);
                }
            }
        }
        Ok(())
    }

    /// Print the result of an export
    pub fn print_export(&self, path: &Path, summary: &EncodeSummary) {
        match self.format {
            OutputFormat::Human => println!(
                "✓ Exported {} note(s), {} book(s), {} tag(s) to {} ({} bytes)",
                summary.notes,
                summary.books,
                summary.tags,
                path.display(),
                summary.bytes
            ),
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "status": "success",
                    "path": path,
                    "books": summary.books,
                    "tags": summary.tags,
                    "notes": summary.notes,
                    "bytes": summary.bytes
                })
            ),
            OutputFormat::Quiet => {}
        }
    }

    /// Print the result of an import
    pub fn print_import(&self, path: &Path, report: &ImportReport) {
        match self.format {
            OutputFormat::Human => {
                if let Some(header) = &report.header {
                    println!("Archive:  {} ({})", path.display(), describe_header(header));
                }
                println!(
                    "Imported: {} note(s), {} new book(s), {} new tag(s)",
                    report.notes_imported, report.books_created, report.tags_created
                );
                if let Some(err) = &report.error {
                    print_archive_error(err);
                    if report.rolled_back {
                        println!("Nothing was kept. Use --keep-partial to keep the notes read before the damage.");
                    } else {
                        println!("Notes read before the damage were kept.");
                    }
                }
            }
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "status": if report.is_complete() { "success" } else { "error" },
                    "path": path,
                    "version": report.header.map(|h| h.version),
                    "created": report.header.map(|h| h.created),
                    "books_created": report.books_created,
                    "tags_created": report.tags_created,
                    "notes_imported": report.notes_imported,
                    "rolled_back": report.rolled_back,
                    "error": report.error.as_ref().map(error_json)
                })
            ),
            OutputFormat::Quiet => {}
        }
    }

    /// Print what `inspect` found in an archive
    pub fn print_inspect(
        &self,
        path: &Path,
        header: Option<&Header>,
        summary: &DecodeSummary,
        error: Option<&ArchiveError>,
    ) {
        match self.format {
            OutputFormat::Human => {
                println!("Archive: {}", path.display());
                match header {
                    Some(header) => println!("Header:  {}", describe_header(header)),
                    None => println!("Header:  (unreadable)"),
                }
                println!("Books:   {}", summary.books);
                println!("Tags:    {}", summary.tags);
                println!("Notes:   {}", summary.notes);
                match error {
                    Some(err) => print_archive_error(err),
                    None => println!("Status:  intact"),
                }
            }
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "path": path,
                    "version": header.map(|h| h.version),
                    "created": header.map(|h| h.created),
                    "books": summary.books,
                    "tags": summary.tags,
                    "notes": summary.notes,
                    "intact": error.is_none(),
                    "error": error.map(error_json)
                })
            ),
            OutputFormat::Quiet => println!("{}", summary.notes),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_archive_error(err: &ArchiveError) {
    println!("Status:  damaged ({:?})", err.kind());
    println!("Error:   {}", err);
    if let Some(hint) = err.recovery_suggestion() {
        println!("Hint:    {}", hint);
    }
}

fn error_json(err: &ArchiveError) -> serde_json::Value {
    json!({
        "kind": format!("{:?}", err.kind()),
        "class": format!("{:?}", err.class()),
        "message": err.to_string(),
        "hint": err.recovery_suggestion()
    })
}

fn describe_header(header: &Header) -> String {
    format!(
        "version {}, created {}",
        header.version,
        header.created.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn tag_list(note: &Note) -> String {
    note.tags
        .iter()
        .map(|tag| tag.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
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
