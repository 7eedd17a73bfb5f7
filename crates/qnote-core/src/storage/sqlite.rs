//! SQLite-backed note store
//!
//! `SqliteSession` borrows a connection, so the same code runs against a
//! plain `Connection` or inside a `Transaction`.
//!
//! ## Tables
//!
//! - `books`, `tags` - unique, non-empty names
//! - `notes` - note records, one owning book each
//! - `note_tags` - note-to-tag junction

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::NoteStore;
use crate::models::{Book, Note, ShortText, Tag};

/// Store operations over a borrowed SQLite connection
pub struct SqliteSession<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSession<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Get tags with usage counts
    pub fn tags_with_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name, COUNT(nt.note_id) as count
            FROM tags t
            LEFT JOIN note_tags nt ON t.id = nt.tag_id
            GROUP BY t.id
            ORDER BY count DESC, t.name
            "#,
        )?;

        let tags = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;
        Ok(tags)
    }

    pub fn note_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ==================== Private helpers ====================

    fn query_entities(&self, table: &str) -> Result<Vec<EntityRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, created, modified, name FROM {} ORDER BY id",
            table
        ))?;

        let rows = stmt
            .query_map([], EntityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_entity(&self, table: &str, name: &str) -> Result<Option<EntityRow>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT id, created, modified, name FROM {} WHERE name = ?",
                    table
                ),
                params![name],
                EntityRow::from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    fn insert_entity(
        &self,
        table: &str,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        name: &str,
    ) -> Result<i64> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (created, modified, name) VALUES (?, ?, ?)",
                    table
                ),
                params![created.timestamp(), modified.timestamp(), name],
            )
            .with_context(|| format!("Failed to insert into {}: '{}'", table, name))?;
        Ok(self.conn.last_insert_rowid())
    }
}

impl NoteStore for SqliteSession<'_> {
    fn books(&self) -> Result<Vec<Book>> {
        self.query_entities("books")?
            .into_iter()
            .map(EntityRow::into_book)
            .collect()
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        self.query_entities("tags")?
            .into_iter()
            .map(EntityRow::into_tag)
            .collect()
    }

    fn notes(&self) -> Result<Vec<Note>> {
        let books: HashMap<i64, Book> = self.books()?.into_iter().map(|b| (b.id, b)).collect();
        let tags: HashMap<i64, Tag> = self.tags()?.into_iter().map(|t| (t.id, t)).collect();

        let mut note_tags: HashMap<i64, Vec<Tag>> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT note_id, tag_id FROM note_tags ORDER BY note_id, tag_id")?;
            let pairs = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            for (note_id, tag_id) in pairs {
                let tag = tags
                    .get(&tag_id)
                    .ok_or_else(|| anyhow!("Note {} references missing tag {}", note_id, tag_id))?;
                note_tags.entry(note_id).or_default().push(tag.clone());
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, created, modified, type, title, body, book_id FROM notes ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NoteRow {
                    id: row.get(0)?,
                    created: row.get(1)?,
                    modified: row.get(2)?,
                    note_type: row.get(3)?,
                    title: row.get(4)?,
                    body: row.get(5)?,
                    book_id: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let book = books
                    .get(&row.book_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("Note {} references missing book {}", row.id, row.book_id))?;
                Ok(Note {
                    id: row.id,
                    created: timestamp(row.created)?,
                    modified: timestamp(row.modified)?,
                    note_type: short_text(row.note_type)?,
                    title: row.title,
                    body: row.body,
                    book,
                    tags: note_tags.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn find_book(&self, name: &str) -> Result<Option<Book>> {
        self.find_entity("books", name)?
            .map(EntityRow::into_book)
            .transpose()
    }

    fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.find_entity("tags", name)?
            .map(EntityRow::into_tag)
            .transpose()
    }

    fn insert_book(&mut self, book: &Book) -> Result<Book> {
        let id = self.insert_entity("books", book.created, book.modified, book.name.as_str())?;
        Ok(Book { id, ..book.clone() })
    }

    fn insert_tag(&mut self, tag: &Tag) -> Result<Tag> {
        let id = self.insert_entity("tags", tag.created, tag.modified, tag.name.as_str())?;
        Ok(Tag { id, ..tag.clone() })
    }

    fn insert_note(&mut self, note: &Note) -> Result<Note> {
        self.conn
            .execute(
                r#"
                INSERT INTO notes (created, modified, type, title, body, book_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                params![
                    note.created.timestamp(),
                    note.modified.timestamp(),
                    note.note_type.as_str(),
                    note.title,
                    note.body,
                    note.book.id,
                ],
            )
            .with_context(|| format!("Failed to insert note '{}'", note.title))?;
        let id = self.conn.last_insert_rowid();

        for tag in &note.tags {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)",
                    params![id, tag.id],
                )
                .with_context(|| format!("Failed to tag note {} with '{}'", id, tag.name))?;
        }

        Ok(Note {
            id,
            ..note.clone()
        })
    }
}

// ==================== Internal structs ====================

struct EntityRow {
    id: i64,
    created: i64,
    modified: i64,
    name: String,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created: row.get(1)?,
            modified: row.get(2)?,
            name: row.get(3)?,
        })
    }

    fn into_book(self) -> Result<Book> {
        Ok(Book {
            id: self.id,
            created: timestamp(self.created)?,
            modified: timestamp(self.modified)?,
            name: short_text(self.name)?,
        })
    }

    fn into_tag(self) -> Result<Tag> {
        Ok(Tag {
            id: self.id,
            created: timestamp(self.created)?,
            modified: timestamp(self.modified)?,
            name: short_text(self.name)?,
        })
    }
}

struct NoteRow {
    id: i64,
    created: i64,
    modified: i64,
    note_type: String,
    title: String,
    body: String,
    book_id: i64,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Invalid timestamp in store: {}", secs))
}

fn short_text(text: String) -> Result<ShortText> {
    ShortText::new(text).context("Stored text exceeds the short text limit")
}
