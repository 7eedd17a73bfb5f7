//! Storage layer
//!
//! The archive codec talks to persistence only through [`NoteStore`]:
//! export reads every book, tag and note; import creates books and tags by
//! name when absent and inserts notes under fresh IDs.

pub mod schema;
pub mod sqlite;

use anyhow::Result;

use crate::models::{Book, Note, Tag};

pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteSession;

/// Persistence collaborator for export and import
pub trait NoteStore {
    /// All books, in ID order
    fn books(&self) -> Result<Vec<Book>>;

    /// All tags, in ID order
    fn tags(&self) -> Result<Vec<Tag>>;

    /// All notes with their book and tags resolved
    fn notes(&self) -> Result<Vec<Note>>;

    fn find_book(&self, name: &str) -> Result<Option<Book>>;

    fn find_tag(&self, name: &str) -> Result<Option<Tag>>;

    /// Store a book under a new ID, keeping its name and timestamps
    fn insert_book(&mut self, book: &Book) -> Result<Book>;

    /// Store a tag under a new ID, keeping its name and timestamps
    fn insert_tag(&mut self, tag: &Tag) -> Result<Tag>;

    /// Store a note under a new ID
    ///
    /// The note's book and tags must already be stored.
    fn insert_note(&mut self, note: &Note) -> Result<Note>;

    fn get_or_create_book(&mut self, name: &str) -> Result<Book> {
        match self.find_book(name)? {
            Some(book) => Ok(book),
            None => self.insert_book(&Book::new(name)?),
        }
    }

    fn get_or_create_tag(&mut self, name: &str) -> Result<Tag> {
        match self.find_tag(name)? {
            Some(tag) => Ok(tag),
            None => self.insert_tag(&Tag::new(name)?),
        }
    }
}
