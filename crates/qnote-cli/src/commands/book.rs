//! Book command handlers

use std::collections::HashMap;

use anyhow::Result;

use qnote_core::{NoteStore, Store};

use crate::output::Output;

/// List all books with note counts
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for note in store.notes()? {
        *counts.entry(note.book.id).or_default() += 1;
    }

    let books: Vec<_> = store
        .books()?
        .into_iter()
        .map(|book| {
            let count = counts.get(&book.id).copied().unwrap_or(0);
            (book, count)
        })
        .collect();
    output.print_books(&books)
}
