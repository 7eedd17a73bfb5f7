//! Export and import between a [`NoteStore`] and an archive
//!
//! Export writes every book, then every tag, then every note, so each
//! note's references are interned before it. Import maps archived books
//! and tags onto store entities by name, creating the missing ones, and
//! inserts notes under fresh IDs. Books and tags no note refers to are
//! created too.
//!
//! Decode failures do not abort an import: they end it, and the report
//! says how far it got so the caller can keep or discard the partial
//! result. Store failures propagate as errors.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::archive::{
    ArchiveDecoder, ArchiveEncoder, ArchiveError, DecodeState, EncodeSummary, Header,
};
use crate::models::{Book, Note, Tag};
use crate::storage::NoteStore;

/// What to do with already-imported notes when an archive turns out damaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialImport {
    /// Keep everything imported before the failure
    Keep,
    /// Roll the whole import back
    #[default]
    Discard,
}

/// Outcome of an import
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Header of the archive, if it could be read
    pub header: Option<Header>,
    pub books_created: u64,
    pub tags_created: u64,
    pub notes_imported: u64,
    /// Error that ended decoding early
    pub error: Option<ArchiveError>,
    /// Whether the imported notes were discarded because of `error`
    pub rolled_back: bool,
}

impl ImportReport {
    /// True when the whole archive was read
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Write the whole collection held by `store` as an archive
pub fn export_collection<S, W>(store: &S, sink: W) -> Result<(W, EncodeSummary)>
where
    S: NoteStore + ?Sized,
    W: Write,
{
    export_collection_at(store, sink, Utc::now())
}

/// Like [`export_collection`] with an explicit archive timestamp
pub fn export_collection_at<S, W>(
    store: &S,
    sink: W,
    created: DateTime<Utc>,
) -> Result<(W, EncodeSummary)>
where
    S: NoteStore + ?Sized,
    W: Write,
{
    let mut encoder = ArchiveEncoder::new(sink);
    encoder.write_header_at(created)?;

    for book in store.books().context("Failed to load books")? {
        encoder
            .write_book(&book)
            .with_context(|| format!("Failed to export book '{}'", book.name))?;
    }
    for tag in store.tags().context("Failed to load tags")? {
        encoder
            .write_tag(&tag)
            .with_context(|| format!("Failed to export tag '{}'", tag.name))?;
    }
    for note in store.notes().context("Failed to load notes")? {
        encoder
            .write_note(&note)
            .with_context(|| format!("Failed to export note {} '{}'", note.id, note.title))?;
    }

    let (sink, summary) = encoder.finish().context("Failed to finish archive")?;
    Ok((sink, summary))
}

/// Read an archive into `store`
///
/// Parses the header if the decoder has not done so yet, then imports
/// notes until the archive ends or fails.
pub fn import_archive<S, R>(store: &mut S, decoder: &mut ArchiveDecoder<R>) -> Result<ImportReport>
where
    S: NoteStore + ?Sized,
    R: Read,
{
    let mut report = ImportReport::default();

    if decoder.state() == DecodeState::NotStarted {
        if let Err(err) = decoder.parse_header() {
            report.error = Some(err);
            return Ok(report);
        }
    }
    report.header = decoder.header().copied();

    let notes = match decoder.notes() {
        Ok(notes) => notes,
        Err(err) => {
            report.error = Some(err);
            return Ok(report);
        }
    };

    let mut importer = Importer::new(store);
    for item in notes {
        match item {
            Ok(note) => importer.import(&note, &mut report)?,
            Err(err) => {
                report.error = Some(err);
                break;
            }
        }
    }

    // Entities read before a failure are kept alongside the notes
    importer.absorb_unreferenced(decoder, &mut report)?;

    match &report.error {
        None => info!(
            notes = report.notes_imported,
            books = report.books_created,
            tags = report.tags_created,
            "Import complete"
        ),
        Some(err) => warn!(
            notes = report.notes_imported,
            "Import stopped early: {}",
            err
        ),
    }
    Ok(report)
}

/// Maps archived entity IDs onto stored entities
struct Importer<'s, S: ?Sized> {
    store: &'s mut S,
    books: HashMap<i64, Book>,
    tags: HashMap<i64, Tag>,
}

impl<'s, S: NoteStore + ?Sized> Importer<'s, S> {
    fn new(store: &'s mut S) -> Self {
        Self {
            store,
            books: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    fn import(&mut self, note: &Note, report: &mut ImportReport) -> Result<()> {
        let book = self.book(&note.book, report)?;
        let tags = note
            .tags
            .iter()
            .map(|tag| self.tag(tag, report))
            .collect::<Result<Vec<_>>>()?;

        let stored = self
            .store
            .insert_note(&Note {
                id: 0,
                book,
                tags,
                ..note.clone()
            })
            .with_context(|| format!("Failed to import note '{}'", note.title))?;
        report.notes_imported += 1;
        tracing::debug!(archived = note.id, stored = stored.id, "Imported note");
        Ok(())
    }

    /// Create the decoded books and tags that no imported note used
    fn absorb_unreferenced<R: Read>(
        &mut self,
        decoder: &ArchiveDecoder<R>,
        report: &mut ImportReport,
    ) -> Result<()> {
        let mut books: Vec<&Book> = decoder
            .books()
            .values()
            .filter(|book| !self.books.contains_key(&book.id))
            .collect();
        books.sort_by_key(|book| book.id);
        for book in books {
            self.book(book, report)?;
        }

        let mut tags: Vec<&Tag> = decoder
            .tags()
            .values()
            .filter(|tag| !self.tags.contains_key(&tag.id))
            .collect();
        tags.sort_by_key(|tag| tag.id);
        for tag in tags {
            self.tag(tag, report)?;
        }
        Ok(())
    }

    fn book(&mut self, archived: &Book, report: &mut ImportReport) -> Result<Book> {
        if let Some(book) = self.books.get(&archived.id) {
            return Ok(book.clone());
        }
        let book = match self.store.find_book(archived.name.as_str())? {
            Some(book) => book,
            None => {
                report.books_created += 1;
                self.store
                    .insert_book(archived)
                    .with_context(|| format!("Failed to create book '{}'", archived.name))?
            }
        };
        self.books.insert(archived.id, book.clone());
        Ok(book)
    }

    fn tag(&mut self, archived: &Tag, report: &mut ImportReport) -> Result<Tag> {
        if let Some(tag) = self.tags.get(&archived.id) {
            return Ok(tag.clone());
        }
        let tag = match self.store.find_tag(archived.name.as_str())? {
            Some(tag) => tag,
            None => {
                report.tags_created += 1;
                self.store
                    .insert_tag(archived)
                    .with_context(|| format!("Failed to create tag '{}'", archived.name))?
            }
        };
        self.tags.insert(archived.id, tag.clone());
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ErrorKind;
    use crate::models::ShortText;
    use crate::storage::{init_schema, SqliteSession};
    use rusqlite::Connection;
    use std::io::Cursor;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn seed(session: &mut SqliteSession<'_>) {
        let book = session.get_or_create_book("test").unwrap();
        let tags: Vec<Tag> = ["basic", "test", "parser"]
            .iter()
            .map(|name| session.get_or_create_tag(name).unwrap())
            .collect();

        for title in ["This is test 1 of the basic parser", "This is #test 2 of the #basic #parser"] {
            let mut note = Note::new(book.clone(), ShortText::new("basic").unwrap(), title);
            note.set_body("Lorem ipsum dolor sit amet");
            for tag in &tags {
                note.add_tag(tag.clone());
            }
            session.insert_note(&note).unwrap();
        }
    }

    #[test]
    fn test_export_then_import_into_empty_store() {
        let source = open();
        let mut source_session = SqliteSession::new(&source);
        seed(&mut source_session);

        let (bytes, summary) = export_collection(&source_session, Vec::new()).unwrap();
        assert_eq!((summary.books, summary.tags, summary.notes), (1, 3, 2));

        let target = open();
        let mut target_session = SqliteSession::new(&target);
        let mut decoder = ArchiveDecoder::new(Cursor::new(bytes));
        let report = import_archive(&mut target_session, &mut decoder).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.books_created, 1);
        assert_eq!(report.tags_created, 3);
        assert_eq!(report.notes_imported, 2);
        assert!(report.header.is_some());

        let exported = source_session.notes().unwrap();
        let imported = target_session.notes().unwrap();
        assert_eq!(exported.len(), imported.len());
        for (a, b) in exported.iter().zip(&imported) {
            assert!(a.content_eq(b));
        }
    }

    #[test]
    fn test_import_keeps_books_and_tags_without_notes() {
        let source = open();
        let mut source_session = SqliteSession::new(&source);
        let book = source_session.get_or_create_book("test").unwrap();
        let tag = source_session.get_or_create_tag("basic").unwrap();
        let mut note = Note::new(book, ShortText::new("basic").unwrap(), "Only note");
        note.add_tag(tag);
        source_session.insert_note(&note).unwrap();
        source_session.get_or_create_book("empty-book").unwrap();
        source_session.get_or_create_tag("lonely-tag").unwrap();

        let (bytes, summary) = export_collection(&source_session, Vec::new()).unwrap();
        assert_eq!((summary.books, summary.tags, summary.notes), (2, 2, 1));

        let target = open();
        let mut target_session = SqliteSession::new(&target);
        let mut decoder = ArchiveDecoder::new(Cursor::new(bytes));
        let report = import_archive(&mut target_session, &mut decoder).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.books_created, 2);
        assert_eq!(report.tags_created, 2);
        assert_eq!(report.notes_imported, 1);

        let books: Vec<String> = target_session
            .books()
            .unwrap()
            .into_iter()
            .map(|b| b.name.to_string())
            .collect();
        assert!(books.contains(&"empty-book".to_string()));
        assert!(books.contains(&"test".to_string()));
        let tags: Vec<String> = target_session
            .tags()
            .unwrap()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        assert!(tags.contains(&"lonely-tag".to_string()));
        assert!(tags.contains(&"basic".to_string()));
    }

    #[test]
    fn test_import_reuses_existing_books_and_tags() {
        let source = open();
        let mut source_session = SqliteSession::new(&source);
        seed(&mut source_session);
        let (bytes, _) = export_collection(&source_session, Vec::new()).unwrap();

        let target = open();
        let mut target_session = SqliteSession::new(&target);
        target_session.get_or_create_tag("unrelated").unwrap();
        let existing = target_session.get_or_create_tag("parser").unwrap();

        let mut decoder = ArchiveDecoder::new(Cursor::new(bytes));
        let report = import_archive(&mut target_session, &mut decoder).unwrap();
        assert_eq!(report.tags_created, 2);

        let notes = target_session.notes().unwrap();
        assert!(notes[0].tags.iter().any(|t| t.id == existing.id));
    }

    #[test]
    fn test_import_stops_at_damage() {
        let source = open();
        let mut source_session = SqliteSession::new(&source);
        seed(&mut source_session);
        source_session.get_or_create_book("empty-book").unwrap();
        let (bytes, _) = export_collection(&source_session, Vec::new()).unwrap();

        // Drop the end marker and part of the last note
        let cut = bytes.len() - 20;
        let target = open();
        let mut target_session = SqliteSession::new(&target);
        let mut decoder = ArchiveDecoder::new(Cursor::new(bytes[..cut].to_vec()));
        let report = import_archive(&mut target_session, &mut decoder).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.notes_imported, 1);
        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::TruncatedFrame)
        );
        assert_eq!(target_session.note_count().unwrap(), 1);
        // Every book frame precedes the damage
        assert_eq!(report.books_created, 2);
        assert_eq!(target_session.books().unwrap().len(), 2);
    }

    #[test]
    fn test_import_rejects_foreign_data() {
        let target = open();
        let mut target_session = SqliteSession::new(&target);
        let mut decoder = ArchiveDecoder::new(Cursor::new(b"PK\x03\x04 not an archive".to_vec()));
        let report = import_archive(&mut target_session, &mut decoder).unwrap();

        assert!(report.header.is_none());
        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::UnknownFormat)
        );
        assert!(target_session.books().unwrap().is_empty());
    }

    #[test]
    fn test_export_empty_store() {
        let conn = open();
        let session = SqliteSession::new(&conn);
        let (bytes, summary) = export_collection(&session, Vec::new()).unwrap();
        assert_eq!(summary.notes, 0);

        let mut decoder = ArchiveDecoder::new(Cursor::new(bytes));
        decoder.parse_header().unwrap();
        assert_eq!(decoder.notes().unwrap().count(), 0);
        assert_eq!(decoder.state(), DecodeState::Done);
    }
}
