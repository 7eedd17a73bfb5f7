//! Note command handlers
//!
//! Every note lives in exactly one book; books and tags named on the
//! command line are created when they do not exist yet.

use anyhow::{anyhow, bail, Result};

use qnote_core::{Note, NoteStore, Store};

use crate::editor::edit_body;
use crate::output::{Output, OutputFormat};

/// Add a new note
pub fn create(
    store: &mut Store,
    title: String,
    book: Option<String>,
    note_type: String,
    body: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    let book = book.unwrap_or_else(|| store.config().default_book.clone());

    let body = match body {
        Some(b) => b,
        None => {
            let edited = edit_body(&title, &book)?;
            if edited.is_empty() {
                bail!("Note body cannot be empty");
            }
            edited
        }
    };

    let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
    let note = store.add_note(&book, &note_type, &title, &body, &tags)?;

    match output.format {
        OutputFormat::Json | OutputFormat::Quiet => output.print_note(&note)?,
        OutputFormat::Human => output.success(&format!(
            "Added note {} to book '{}'",
            note.id, note.book.name
        )),
    }
    Ok(())
}

/// List notes, optionally filtered by book and tag
pub fn list(
    store: &Store,
    book: Option<String>,
    tag: Option<String>,
    output: &Output,
) -> Result<()> {
    let notes = filter_notes(store.notes()?, book.as_deref(), tag.as_deref());
    output.print_notes(&notes)
}

/// Show a single note
pub fn show(store: &Store, id: i64, output: &Output) -> Result<()> {
    let note = store
        .notes()?
        .into_iter()
        .find(|note| note.id == id)
        .ok_or_else(|| anyhow!("Note not found: {}", id))?;
    output.print_note(&note)
}

fn filter_notes(notes: Vec<Note>, book: Option<&str>, tag: Option<&str>) -> Vec<Note> {
    notes
        .into_iter()
        .filter(|note| book.map_or(true, |name| note.book.name == name))
        .filter(|note| tag.map_or(true, |name| note.tag_names().contains(name)))
        .collect()
}
