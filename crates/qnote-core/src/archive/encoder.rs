//! Archive encoder
//!
//! Writes a header, then one frame per book, tag and note. Books and tags
//! are interned: once an entity's frame is written, notes refer to it by ID
//! only. Entities must therefore be written before any note that uses them.

use std::collections::HashSet;
use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::error::{ArchiveError, ArchiveResult, EntityKind};
use super::frame::{Field, FrameWriter, Header, RecordKind, MAX_TAG_COUNT};
use crate::models::{Book, Note, Tag};

/// Counts of what an encoder wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    pub books: u64,
    pub tags: u64,
    pub notes: u64,
    pub bytes: u64,
}

/// Streaming archive writer
pub struct ArchiveEncoder<W> {
    writer: FrameWriter<W>,
    header: Option<Header>,
    /// IDs of books already written in this session
    books: HashSet<i64>,
    /// IDs of tags already written in this session
    tags: HashSet<i64>,
    summary: EncodeSummary,
}

impl<W: Write> ArchiveEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: FrameWriter::new(sink),
            header: None,
            books: HashSet::new(),
            tags: HashSet::new(),
            summary: EncodeSummary::default(),
        }
    }

    /// Write the header stamped with the current time
    pub fn write_header(&mut self) -> ArchiveResult<Header> {
        self.write_header_at(Utc::now())
    }

    /// Write the header with an explicit creation time
    ///
    /// Must be called exactly once, before anything else.
    pub fn write_header_at(&mut self, created: DateTime<Utc>) -> ArchiveResult<Header> {
        if self.header.is_some() {
            return Err(ArchiveError::OutOfOrder("archive header already written"));
        }
        let header = Header::at(created);
        self.writer.write_header(&header)?;
        self.header = Some(header);
        info!(version = header.version, "Archive header written");
        Ok(header)
    }

    /// Write a book frame and intern its ID
    pub fn write_book(&mut self, book: &Book) -> ArchiveResult<()> {
        self.require_header()?;
        self.writer.append(
            RecordKind::Book,
            &[
                Field::Id(book.id),
                Field::Timestamp(book.created),
                Field::Timestamp(book.modified),
                Field::Short {
                    name: "book name",
                    text: book.name.as_str(),
                },
            ],
        )?;
        self.books.insert(book.id);
        self.summary.books += 1;
        debug!(id = book.id, name = %book.name, "Wrote book frame");
        Ok(())
    }

    /// Write a tag frame and intern its ID
    pub fn write_tag(&mut self, tag: &Tag) -> ArchiveResult<()> {
        self.require_header()?;
        self.writer.append(
            RecordKind::Tag,
            &[
                Field::Id(tag.id),
                Field::Timestamp(tag.created),
                Field::Timestamp(tag.modified),
                Field::Short {
                    name: "tag name",
                    text: tag.name.as_str(),
                },
            ],
        )?;
        self.tags.insert(tag.id);
        self.summary.tags += 1;
        debug!(id = tag.id, name = %tag.name, "Wrote tag frame");
        Ok(())
    }

    /// Write a note frame
    ///
    /// The note's book and all of its tags must already have been written;
    /// otherwise nothing is written and `UnresolvedReference` is returned.
    pub fn write_note(&mut self, note: &Note) -> ArchiveResult<()> {
        self.require_header()?;

        if !self.books.contains(&note.book.id) {
            return Err(ArchiveError::UnresolvedReference {
                note_id: note.id,
                kind: EntityKind::Book,
                id: note.book.id,
            });
        }
        if let Some(tag) = note.tags.iter().find(|t| !self.tags.contains(&t.id)) {
            return Err(ArchiveError::UnresolvedReference {
                note_id: note.id,
                kind: EntityKind::Tag,
                id: tag.id,
            });
        }

        // Tags are unique by ID; repeats in the list are written once
        let mut seen = HashSet::new();
        let tag_ids: Vec<i64> = note
            .tags
            .iter()
            .map(|t| t.id)
            .filter(|id| seen.insert(*id))
            .collect();

        let tag_count = u32::try_from(tag_ids.len())
            .ok()
            .filter(|&count| count <= MAX_TAG_COUNT)
            .ok_or(ArchiveError::FieldTooLong {
                field: "note tag list",
                len: tag_ids.len(),
                max: u64::from(MAX_TAG_COUNT),
            })?;

        let mut fields = Vec::with_capacity(9 + tag_ids.len());
        fields.extend([
            Field::Id(note.id),
            Field::Timestamp(note.created),
            Field::Timestamp(note.modified),
            Field::Short {
                name: "note type",
                text: note.note_type.as_str(),
            },
            Field::Long {
                name: "note title",
                text: &note.title,
            },
            Field::Long {
                name: "note body",
                text: &note.body,
            },
            Field::Count(tag_count),
        ]);
        fields.extend(tag_ids.iter().map(|&id| Field::Id(id)));
        fields.push(Field::Id(note.book.id));

        self.writer.append(RecordKind::Note, &fields)?;
        self.summary.notes += 1;
        debug!(id = note.id, tags = tag_count, "Wrote note frame");
        Ok(())
    }

    pub fn summary(&self) -> EncodeSummary {
        EncodeSummary {
            bytes: self.writer.bytes_written(),
            ..self.summary
        }
    }

    /// Write the end marker, flush, and hand back the sink
    pub fn finish(mut self) -> ArchiveResult<(W, EncodeSummary)> {
        self.require_header()?;
        self.writer
            .append(RecordKind::End, &[Field::Total(self.summary.notes)])?;
        self.writer.flush()?;

        let summary = self.summary();
        info!(
            books = summary.books,
            tags = summary.tags,
            notes = summary.notes,
            bytes = summary.bytes,
            "Archive finished"
        );
        Ok((self.writer.into_inner(), summary))
    }

    fn require_header(&self) -> ArchiveResult<()> {
        if self.header.is_none() {
            return Err(ArchiveError::OutOfOrder(
                "archive header must be written first",
            ));
        }
        Ok(())
    }
}
