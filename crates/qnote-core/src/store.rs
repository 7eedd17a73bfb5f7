//! Unified storage interface
//!
//! The `Store` owns the SQLite connection and is the entry point for the
//! CLI: adding and listing notes, and moving the whole collection in and
//! out of archive files.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! store.add_note("test", "basic", "First note", "Body", &["parser"])?;
//! store.export_to_path(Path::new("backup.qnote.zst"))?;
//! ```

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::archive::{create_archive, open_archive, ArchiveDecoder, EncodeSummary};
use crate::config::Config;
use crate::models::{Book, Note, ShortText, Tag};
use crate::storage::{init_schema, needs_init, NoteStore, SqliteSession};
use crate::transfer::{self, ImportReport, PartialImport};

/// Unified storage interface for qnote
pub struct Store {
    conn: Connection,
    config: Config,
}

impl Store {
    /// Open the store described by the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    ///
    /// Creates the database and its schema on first use.
    pub fn open_with_config(config: Config) -> Result<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        debug!(?path, "Opened note database");
        Self::from_connection(conn, config)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, Config::default())
    }

    fn from_connection(conn: Connection, config: Config) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize schema")?;
        }
        Ok(Self { conn, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store operations over the current connection
    pub fn session(&self) -> SqliteSession<'_> {
        SqliteSession::new(&self.conn)
    }

    // ==================== Note Operations ====================

    /// Add a note, creating its book and tags when absent
    pub fn add_note(
        &mut self,
        book: &str,
        note_type: &str,
        title: &str,
        body: &str,
        tags: &[&str],
    ) -> Result<Note> {
        let note_type = ShortText::new(note_type).context("Invalid note type")?;

        let tx = self.conn.transaction()?;
        let note = {
            let mut session = SqliteSession::new(&tx);
            let book = session
                .get_or_create_book(book)
                .with_context(|| format!("Failed to resolve book '{}'", book))?;

            let mut note = Note::new(book, note_type, title);
            note.set_body(body);
            for name in tags {
                let tag = session
                    .get_or_create_tag(name)
                    .with_context(|| format!("Failed to resolve tag '{}'", name))?;
                note.add_tag(tag);
            }
            session.insert_note(&note)?
        };
        tx.commit().context("Failed to commit note")?;

        debug!(id = note.id, book = %note.book.name, "Added note");
        Ok(note)
    }

    // ==================== Stats ====================

    /// Get tags with usage counts
    pub fn tags_with_counts(&self) -> Result<Vec<(String, i64)>> {
        self.session()
            .tags_with_counts()
            .context("Failed to get tag counts")
    }

    /// Get count of notes
    pub fn note_count(&self) -> Result<i64> {
        self.session().note_count().context("Failed to count notes")
    }

    // ==================== Archives ====================

    /// Write the whole collection to `sink`
    pub fn export_to<W: Write>(&self, sink: W) -> Result<(W, EncodeSummary)> {
        transfer::export_collection(self, sink)
    }

    /// Write the whole collection to an archive file
    ///
    /// A `.zst` extension compresses the archive. The file is removed
    /// again if the export fails.
    pub fn export_to_path(&self, path: &Path) -> Result<EncodeSummary> {
        let sink = create_archive(path, self.config.compression_level)?;
        let result = self.export_to(sink).and_then(|(sink, summary)| {
            sink.finish()?;
            Ok(summary)
        });

        match result {
            Ok(summary) => {
                info!(
                    ?path,
                    notes = summary.notes,
                    bytes = summary.bytes,
                    "Exported collection"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!(?path, "Failed to remove incomplete archive: {}", remove_err);
                }
                Err(e)
            }
        }
    }

    /// Import an archive inside one transaction
    ///
    /// When the archive is damaged, `policy` decides whether the notes read
    /// before the damage are kept. Store errors always roll back.
    pub fn import_from<R: Read>(
        &mut self,
        decoder: &mut ArchiveDecoder<R>,
        policy: PartialImport,
    ) -> Result<ImportReport> {
        let tx = self.conn.transaction()?;
        let mut report = {
            let mut session = SqliteSession::new(&tx);
            transfer::import_archive(&mut session, decoder)?
        };

        if report.error.is_some() && policy == PartialImport::Discard {
            tx.rollback().context("Failed to roll back import")?;
            report.rolled_back = true;
            info!(notes = report.notes_imported, "Discarded partial import");
        } else {
            tx.commit().context("Failed to commit import")?;
        }
        Ok(report)
    }

    /// Import an archive file, decompressing `.zst` archives
    pub fn import_from_path(&mut self, path: &Path, policy: PartialImport) -> Result<ImportReport> {
        let (source, len) = open_archive(path)?;
        let mut decoder = match len {
            Some(len) => ArchiveDecoder::with_len(source, len),
            None => ArchiveDecoder::new(source),
        };
        self.import_from(&mut decoder, policy)
            .with_context(|| format!("Failed to import {:?}", path))
    }
}

impl NoteStore for Store {
    fn books(&self) -> Result<Vec<Book>> {
        self.session().books().context("Failed to get books")
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        self.session().tags().context("Failed to get tags")
    }

    fn notes(&self) -> Result<Vec<Note>> {
        self.session().notes().context("Failed to get notes")
    }

    fn find_book(&self, name: &str) -> Result<Option<Book>> {
        self.session().find_book(name)
    }

    fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.session().find_tag(name)
    }

    fn insert_book(&mut self, book: &Book) -> Result<Book> {
        self.session().insert_book(book)
    }

    fn insert_tag(&mut self, tag: &Tag) -> Result<Tag> {
        self.session().insert_tag(tag)
    }

    fn insert_note(&mut self, note: &Note) -> Result<Note> {
        self.session().insert_note(note)
    }
}
