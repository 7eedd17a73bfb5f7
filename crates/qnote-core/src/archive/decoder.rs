//! Archive decoder
//!
//! Parses the header, then hands out notes one at a time. Book and tag
//! frames are absorbed into a lookup table owned by the decoder and are
//! never yielded; each note's references are resolved against that table
//! when the note is produced.
//!
//! ```text
//! NotStarted -> HeaderParsed -> Streaming -> Done
//!                                        \-> Failed
//! ```
//!
//! The first error ends the stream for good. Notes yielded before it are
//! complete and valid.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use tracing::{debug, info, warn};

use super::error::{ArchiveError, ArchiveResult, EntityKind, ErrorKind};
use super::frame::{Frame, FrameReader, Header, NoteRecord};
use crate::models::{Book, Note, Tag};

/// Where a decoder is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    NotStarted,
    HeaderParsed,
    Streaming,
    /// The end marker was read and matched
    Done,
    /// Decoding stopped on an error of this kind
    Failed(ErrorKind),
}

impl DecodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DecodeState::Done | DecodeState::Failed(_))
    }
}

/// Counts of what a decoder consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub books: u64,
    pub tags: u64,
    pub notes: u64,
    /// Bytes consumed from the source
    pub bytes: u64,
}

/// Streaming archive reader
pub struct ArchiveDecoder<R> {
    reader: FrameReader<R>,
    state: DecodeState,
    header: Option<Header>,
    books: HashMap<i64, Book>,
    tags: HashMap<i64, Tag>,
    summary: DecodeSummary,
}

impl<R: Read> ArchiveDecoder<R> {
    /// Decoder over a source of unknown length (pipe, decompressor)
    pub fn new(source: R) -> Self {
        Self::from_reader(FrameReader::new(source))
    }

    /// Decoder over a source of known length (file, buffer)
    pub fn with_len(source: R, len: u64) -> Self {
        Self::from_reader(FrameReader::with_len(source, len))
    }

    fn from_reader(reader: FrameReader<R>) -> Self {
        Self {
            reader,
            state: DecodeState::NotStarted,
            header: None,
            books: HashMap::new(),
            tags: HashMap::new(),
            summary: DecodeSummary::default(),
        }
    }

    /// Read and validate the header
    pub fn parse_header(&mut self) -> ArchiveResult<Header> {
        if self.state != DecodeState::NotStarted {
            return Err(ArchiveError::OutOfOrder("archive header already parsed"));
        }

        match self.reader.read_header() {
            Ok(header) => {
                info!(
                    version = header.version,
                    created = %header.created,
                    "Archive header parsed"
                );
                self.header = Some(header);
                self.state = DecodeState::HeaderParsed;
                Ok(header)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// The parsed header, if any
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Kind of the error that stopped decoding, if it failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.state {
            DecodeState::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn summary(&self) -> DecodeSummary {
        DecodeSummary {
            bytes: self.reader.position(),
            ..self.summary
        }
    }

    /// Books seen so far, keyed by archived ID
    pub fn books(&self) -> &HashMap<i64, Book> {
        &self.books
    }

    /// Tags seen so far, keyed by archived ID
    pub fn tags(&self) -> &HashMap<i64, Tag> {
        &self.tags
    }

    /// Start streaming notes
    ///
    /// Only valid right after [`parse_header`](Self::parse_header). The
    /// returned iterator yields each note once; after an error or the end
    /// marker it yields nothing more.
    pub fn notes(&mut self) -> ArchiveResult<Notes<'_, R>> {
        if self.state != DecodeState::HeaderParsed {
            return Err(ArchiveError::OutOfOrder(
                "notes can only be streamed once, after the header",
            ));
        }
        self.state = DecodeState::Streaming;
        Ok(Notes { decoder: self })
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Advance to the next note, absorbing book and tag frames on the way
    fn next_note(&mut self) -> Option<ArchiveResult<Note>> {
        if self.state != DecodeState::Streaming {
            return None;
        }

        loop {
            let frame = match self.reader.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    return Some(Err(self.fail(ArchiveError::TruncatedFrame {
                        context: "end marker",
                    })))
                }
                Err(err) => return Some(Err(self.fail(err))),
            };

            match frame {
                Frame::Book(book) => {
                    debug!(id = book.id, name = %book.name, "Absorbed book frame");
                    self.summary.books += 1;
                    self.books.insert(book.id, book);
                }
                Frame::Tag(tag) => {
                    debug!(id = tag.id, name = %tag.name, "Absorbed tag frame");
                    self.summary.tags += 1;
                    self.tags.insert(tag.id, tag);
                }
                Frame::Note(record) => {
                    return match self.resolve(record) {
                        Ok(note) => {
                            self.summary.notes += 1;
                            Some(Ok(note))
                        }
                        Err(err) => Some(Err(self.fail(err))),
                    };
                }
                Frame::End { note_count } => {
                    if note_count != self.summary.notes {
                        return Some(Err(self.fail(ArchiveError::TrailerMismatch {
                            expected: note_count,
                            found: self.summary.notes,
                        })));
                    }
                    self.state = DecodeState::Done;
                    info!(
                        books = self.summary.books,
                        tags = self.summary.tags,
                        notes = self.summary.notes,
                        "Archive fully decoded"
                    );
                    return None;
                }
            }
        }
    }

    fn resolve(&self, record: NoteRecord) -> ArchiveResult<Note> {
        let book = self
            .books
            .get(&record.book_id)
            .cloned()
            .ok_or(ArchiveError::UnresolvedReference {
                note_id: record.id,
                kind: EntityKind::Book,
                id: record.book_id,
            })?;

        // Tags are unique by ID; a repeated reference is dropped
        let mut seen = HashSet::new();
        let tags = record
            .tag_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|id| {
                self.tags
                    .get(id)
                    .cloned()
                    .ok_or(ArchiveError::UnresolvedReference {
                        note_id: record.id,
                        kind: EntityKind::Tag,
                        id: *id,
                    })
            })
            .collect::<ArchiveResult<Vec<_>>>()?;

        Ok(Note {
            id: record.id,
            created: record.created,
            modified: record.modified,
            note_type: record.note_type,
            title: record.title,
            body: record.body,
            book,
            tags,
        })
    }

    fn fail(&mut self, err: ArchiveError) -> ArchiveError {
        warn!(
            offset = self.reader.position(),
            notes = self.summary.notes,
            "Archive decoding stopped: {}",
            err
        );
        self.state = DecodeState::Failed(err.kind());
        err
    }
}

/// Lazy sequence of notes from an [`ArchiveDecoder`]
///
/// Dropping it early is fine; the decoder stays in `Streaming` and nothing
/// more is read.
pub struct Notes<'a, R> {
    decoder: &'a mut ArchiveDecoder<R>,
}

impl<R: Read> Notes<'_, R> {
    pub fn state(&self) -> DecodeState {
        self.decoder.state()
    }
}

impl<R: Read> Iterator for Notes<'_, R> {
    type Item = ArchiveResult<Note>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_note()
    }
}

impl<R: Read> std::iter::FusedIterator for Notes<'_, R> {}
