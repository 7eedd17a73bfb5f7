//! Frame-level reading and writing
//!
//! An archive is a header followed by self-describing frames. Each frame
//! starts with a one-byte [`RecordKind`]; integers are fixed-width
//! big-endian, short strings carry a one-byte length and long strings a
//! four-byte length.
//!
//! ```text
//! Header    := Magic(4) Version(4) CreatedSeconds(8) CreatedNanos(8)
//! BookFrame := 0x00 ID(8) Created(8) Modified(8) NameLen(1) Name
//! TagFrame  := 0x01 ID(8) Created(8) Modified(8) NameLen(1) Name
//! NoteFrame := 0x02 ID(8) Created(8) Modified(8) TypeLen(1) Type
//!              TitleLen(4) Title BodyLen(4) Body TagCount(4) TagID(8)* BookID(8)
//! EndFrame  := 0xFF NoteCount(8)
//! ```
//!
//! Reading is strictly sequential so archives can be streamed through a
//! pipe or decompressor.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};

use super::error::{ArchiveError, ArchiveResult};
use crate::models::{Book, ShortText, Tag, SHORT_TEXT_MAX};

/// Marker at the start of every archive
pub const MAGIC: [u8; 4] = *b"QNOT";

/// Newest archive version this build reads and the one it writes
pub const ARCHIVE_VERSION: u32 = 1;

/// Upper bound for a long string when the input length is unknown
pub const MAX_TEXT_LEN: u64 = 64 * 1024 * 1024;

/// Upper bound for the number of tags on one note
pub const MAX_TAG_COUNT: u32 = 65_536;

/// Size of the fixed archive header in bytes
pub const HEADER_LEN: u64 = 24;

/// One-byte tag at the start of each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Book = 0x00,
    Tag = 0x01,
    Note = 0x02,
    End = 0xFF,
}

impl TryFrom<u8> for RecordKind {
    type Error = ArchiveError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(RecordKind::Book),
            0x01 => Ok(RecordKind::Tag),
            0x02 => Ok(RecordKind::Note),
            0xFF => Ok(RecordKind::End),
            other => Err(ArchiveError::UnknownRecordKind(other)),
        }
    }
}

/// Archive header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    /// When the archive was written
    pub created: DateTime<Utc>,
}

impl Header {
    /// Header for a new archive written now
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(created: DateTime<Utc>) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            created,
        }
    }
}

/// A note as stored in a frame: own fields plus unresolved references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub note_type: ShortText,
    pub title: String,
    pub body: String,
    pub tag_ids: Vec<i64>,
    pub book_id: i64,
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Book(Book),
    Tag(Tag),
    Note(NoteRecord),
    /// End of archive marker with the number of notes written
    End { note_count: u64 },
}

/// A single field within a frame
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    /// Entity ID, 8 bytes
    Id(i64),
    /// Unix seconds, 8 bytes
    Timestamp(DateTime<Utc>),
    /// Element count, 4 bytes
    Count(u32),
    /// Running total, 8 bytes
    Total(u64),
    /// Text with a one-byte length prefix
    Short { name: &'static str, text: &'a str },
    /// Text with a four-byte length prefix
    Long { name: &'static str, text: &'a str },
}

/// Writes frames to a byte sink
///
/// Each frame is assembled in memory and handed to the sink with a single
/// `write_all`, so a field that fails validation never leaves a partial
/// frame behind.
pub struct FrameWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    bytes_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::new(),
            bytes_written: 0,
        }
    }

    /// Total bytes handed to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write the archive header
    pub fn write_header(&mut self, header: &Header) -> ArchiveResult<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(&MAGIC);
        self.scratch.write_u32::<BigEndian>(header.version)?;
        self.scratch
            .write_i64::<BigEndian>(header.created.timestamp())?;
        self.scratch
            .write_i64::<BigEndian>(i64::from(header.created.timestamp_subsec_nanos()))?;
        self.flush_scratch()
    }

    /// Write one frame: the kind byte followed by `fields` in order
    pub fn append(&mut self, kind: RecordKind, fields: &[Field<'_>]) -> ArchiveResult<()> {
        self.scratch.clear();
        self.scratch.write_u8(kind as u8)?;
        for field in fields {
            encode_field(&mut self.scratch, field)?;
        }
        self.flush_scratch()
    }

    pub fn flush(&mut self) -> ArchiveResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn flush_scratch(&mut self) -> ArchiveResult<()> {
        self.inner.write_all(&self.scratch)?;
        self.bytes_written += self.scratch.len() as u64;
        Ok(())
    }
}

fn encode_field(buf: &mut Vec<u8>, field: &Field<'_>) -> ArchiveResult<()> {
    match *field {
        Field::Id(id) => buf.write_i64::<BigEndian>(id)?,
        Field::Timestamp(ts) => buf.write_i64::<BigEndian>(ts.timestamp())?,
        Field::Count(n) => buf.write_u32::<BigEndian>(n)?,
        Field::Total(n) => buf.write_u64::<BigEndian>(n)?,
        Field::Short { name, text } => {
            let len = u8::try_from(text.len()).map_err(|_| ArchiveError::FieldTooLong {
                field: name,
                len: text.len(),
                max: SHORT_TEXT_MAX as u64,
            })?;
            buf.write_u8(len)?;
            buf.extend_from_slice(text.as_bytes());
        }
        Field::Long { name, text } => {
            // Readers reject anything above MAX_TEXT_LEN
            let len = u32::try_from(text.len())
                .ok()
                .filter(|&len| u64::from(len) <= MAX_TEXT_LEN)
                .ok_or(ArchiveError::FieldTooLong {
                    field: name,
                    len: text.len(),
                    max: MAX_TEXT_LEN,
                })?;
            buf.write_u32::<BigEndian>(len)?;
            buf.extend_from_slice(text.as_bytes());
        }
    }
    Ok(())
}

/// Reads frames from a byte source
pub struct FrameReader<R> {
    inner: R,
    position: u64,
    len: Option<u64>,
}

impl<R: Read> FrameReader<R> {
    /// Reader over a source of unknown length
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            len: None,
        }
    }

    /// Reader over a source holding exactly `len` bytes
    ///
    /// Knowing the length lets length prefixes be checked against the
    /// bytes that actually remain.
    pub fn with_len(inner: R, len: u64) -> Self {
        Self {
            inner,
            position: 0,
            len: Some(len),
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read and validate the archive header
    pub fn read_header(&mut self) -> ArchiveResult<Header> {
        let mut found = [0u8; 4];
        let got = self.fill(&mut found)?;
        if got < found.len() || found != MAGIC {
            return Err(ArchiveError::UnknownFormat {
                expected: MAGIC,
                found,
            });
        }

        let version = self.read_u32("archive version")?;
        if version == 0 || version > ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: version,
                supported: ARCHIVE_VERSION,
            });
        }

        let secs = self.read_i64("archive creation time")?;
        let nanos = self.read_i64("archive creation time")?;
        let created = u32::try_from(nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(secs, nanos))
            .ok_or_else(|| ArchiveError::InvalidField {
                field: "archive creation time",
                details: format!("{}s {}ns is out of range", secs, nanos),
            })?;

        Ok(Header { version, created })
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` when the input ends cleanly at a frame boundary.
    pub fn next_frame(&mut self) -> ArchiveResult<Option<Frame>> {
        let mut kind = [0u8; 1];
        if self.fill(&mut kind)? == 0 {
            return Ok(None);
        }

        let frame = match RecordKind::try_from(kind[0])? {
            RecordKind::Book => {
                let (id, created, modified, name) = self.read_entity("book")?;
                Frame::Book(Book {
                    id,
                    created,
                    modified,
                    name,
                })
            }
            RecordKind::Tag => {
                let (id, created, modified, name) = self.read_entity("tag")?;
                Frame::Tag(Tag {
                    id,
                    created,
                    modified,
                    name,
                })
            }
            RecordKind::Note => Frame::Note(self.read_note()?),
            RecordKind::End => Frame::End {
                note_count: self.read_u64("end marker")?,
            },
        };

        Ok(Some(frame))
    }

    fn read_entity(
        &mut self,
        kind: &'static str,
    ) -> ArchiveResult<(i64, DateTime<Utc>, DateTime<Utc>, ShortText)> {
        let id = self.read_i64(kind)?;
        let created = self.read_timestamp(kind)?;
        let modified = self.read_timestamp(kind)?;
        let name = self.read_short(kind)?;
        if name.is_empty() {
            return Err(ArchiveError::InvalidField {
                field: kind,
                details: format!("{} {} has an empty name", kind, id),
            });
        }
        Ok((id, created, modified, name))
    }

    fn read_note(&mut self) -> ArchiveResult<NoteRecord> {
        let id = self.read_i64("note")?;
        let created = self.read_timestamp("note")?;
        let modified = self.read_timestamp("note")?;
        let note_type = self.read_short("note type")?;
        let title = self.read_long("note title")?;
        let body = self.read_long("note body")?;

        let tag_count = self.read_u32("note tag count")?;
        let declared = u64::from(tag_count) * 8;
        if tag_count > MAX_TAG_COUNT || self.exceeds_remaining(declared + 8) {
            return Err(ArchiveError::CorruptLength {
                field: "note tag list",
                declared,
                available: self.available(u64::from(MAX_TAG_COUNT) * 8),
            });
        }
        let tag_ids = (0..tag_count)
            .map(|_| self.read_i64("note tag list"))
            .collect::<ArchiveResult<Vec<_>>>()?;
        let book_id = self.read_i64("note book reference")?;

        Ok(NoteRecord {
            id,
            created,
            modified,
            note_type,
            title,
            body,
            tag_ids,
            book_id,
        })
    }

    fn read_timestamp(&mut self, context: &'static str) -> ArchiveResult<DateTime<Utc>> {
        let secs = self.read_i64(context)?;
        DateTime::from_timestamp(secs, 0).ok_or_else(|| ArchiveError::InvalidField {
            field: context,
            details: format!("timestamp {} is out of range", secs),
        })
    }

    fn read_short(&mut self, field: &'static str) -> ArchiveResult<ShortText> {
        let len = self
            .inner
            .read_u8()
            .map_err(|e| ArchiveError::from_read(e, field))?;
        self.position += 1;
        let text = self.read_text(field, u64::from(len), u64::from(len))?;
        ShortText::new(text).map_err(|e| ArchiveError::InvalidField {
            field,
            details: e.to_string(),
        })
    }

    fn read_long(&mut self, field: &'static str) -> ArchiveResult<String> {
        let len = self.read_u32(field)?;
        self.read_text(field, u64::from(len), MAX_TEXT_LEN)
    }

    fn read_text(&mut self, field: &'static str, len: u64, cap: u64) -> ArchiveResult<String> {
        if len > cap || self.exceeds_remaining(len) {
            return Err(ArchiveError::CorruptLength {
                field,
                declared: len,
                available: self.available(cap),
            });
        }

        let mut buf = Vec::new();
        let got = (&mut self.inner)
            .take(len)
            .read_to_end(&mut buf)
            .map_err(|e| ArchiveError::from_read(e, field))?;
        self.position += got as u64;
        if (got as u64) < len {
            return Err(ArchiveError::TruncatedFrame { context: field });
        }

        String::from_utf8(buf).map_err(|e| ArchiveError::InvalidField {
            field,
            details: e.to_string(),
        })
    }

    fn read_i64(&mut self, context: &'static str) -> ArchiveResult<i64> {
        let value = self
            .inner
            .read_i64::<BigEndian>()
            .map_err(|e| ArchiveError::from_read(e, context))?;
        self.position += 8;
        Ok(value)
    }

    fn read_u64(&mut self, context: &'static str) -> ArchiveResult<u64> {
        let value = self
            .inner
            .read_u64::<BigEndian>()
            .map_err(|e| ArchiveError::from_read(e, context))?;
        self.position += 8;
        Ok(value)
    }

    fn read_u32(&mut self, context: &'static str) -> ArchiveResult<u32> {
        let value = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| ArchiveError::from_read(e, context))?;
        self.position += 4;
        Ok(value)
    }

    /// Read up to `buf.len()` bytes, stopping early only at end of input
    fn fill(&mut self, buf: &mut [u8]) -> ArchiveResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ArchiveError::Io(e)),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    fn remaining(&self) -> Option<u64> {
        self.len.map(|len| len.saturating_sub(self.position))
    }

    fn exceeds_remaining(&self, needed: u64) -> bool {
        self.remaining().is_some_and(|rem| needed > rem)
    }

    fn available(&self, cap: u64) -> u64 {
        self.remaining().map_or(cap, |rem| rem.min(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::error::ErrorKind;
    use std::io::Cursor;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn book_frame(id: i64, name: &str) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        writer
            .append(
                RecordKind::Book,
                &[
                    Field::Id(id),
                    Field::Timestamp(ts(1490492127)),
                    Field::Timestamp(ts(1490492127)),
                    Field::Short { name: "book name", text: name },
                ],
            )
            .unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_header_layout() {
        let mut writer = FrameWriter::new(Vec::new());
        let created = DateTime::from_timestamp(1490493535, 287).unwrap();
        writer.write_header(&Header::at(created)).unwrap();
        let bytes = writer.into_inner();

        assert_eq!(bytes.len() as u64, HEADER_LEN);
        assert_eq!(&bytes[..4], b"QNOT");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 1]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0x58, 0xd7, 0x20, 0x5f]);
        assert_eq!(&bytes[16..24], &[0, 0, 0, 0, 0, 0, 0x01, 0x1f]);

        let header = FrameReader::new(Cursor::new(bytes)).read_header().unwrap();
        assert_eq!(header.version, ARCHIVE_VERSION);
        assert_eq!(header.created, created);
    }

    #[test]
    fn test_book_frame_layout() {
        let bytes = book_frame(5, "test");
        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..9], &[0, 0, 0, 0, 0, 0, 0, 5]);
        assert_eq!(bytes[25], 4);
        assert_eq!(&bytes[26..], b"test");

        let mut reader = FrameReader::new(Cursor::new(bytes));
        match reader.next_frame().unwrap() {
            Some(Frame::Book(book)) => {
                assert_eq!(book.id, 5);
                assert_eq!(book.name, "test");
                assert_eq!(book.created.timestamp(), 1490492127);
            }
            other => panic!("expected book frame, got {:?}", other),
        }
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_short_field_too_long_writes_nothing() {
        let long = "x".repeat(256);
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer
            .append(
                RecordKind::Tag,
                &[Field::Id(1), Field::Short { name: "tag name", text: &long }],
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FieldTooLong);
        assert_eq!(writer.bytes_written(), 0);
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_clean_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_fixed_field() {
        let bytes = book_frame(5, "test");
        let mut reader = FrameReader::new(Cursor::new(bytes[..12].to_vec()));
        let err = reader.next_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedFrame);
    }

    #[test]
    fn test_truncated_text_without_known_length() {
        let bytes = book_frame(5, "test");
        let cut = bytes[..bytes.len() - 2].to_vec();
        let mut reader = FrameReader::new(Cursor::new(cut));
        assert_eq!(reader.next_frame().unwrap_err().kind(), ErrorKind::TruncatedFrame);
    }

    #[test]
    fn test_length_prefix_past_known_end() {
        let bytes = book_frame(5, "test");
        let cut = bytes[..bytes.len() - 2].to_vec();
        let len = cut.len() as u64;
        let mut reader = FrameReader::with_len(Cursor::new(cut), len);
        match reader.next_frame().unwrap_err() {
            ArchiveError::CorruptLength {
                declared,
                available,
                ..
            } => {
                assert_eq!(declared, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected CorruptLength, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_long_length_is_corrupt() {
        let mut bytes = vec![RecordKind::Note as u8];
        bytes.extend_from_slice(&1i64.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());

        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_frame().unwrap_err().kind(), ErrorKind::CorruptLength);
    }

    #[test]
    fn test_unknown_record_kind() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x7a, 0, 0]));
        match reader.next_frame().unwrap_err() {
            ArchiveError::UnknownRecordKind(byte) => assert_eq!(byte, 0x7a),
            other => panic!("expected UnknownRecordKind, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_name() {
        let mut bytes = book_frame(5, "test");
        let last = bytes.len() - 1;
        bytes[last] = 0xff;
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_frame().unwrap_err().kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_empty_book_name_rejected() {
        let bytes = book_frame(5, "");
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_frame().unwrap_err().kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_header_bad_magic_and_short_input() {
        let err = FrameReader::new(Cursor::new(b"QN".to_vec()))
            .read_header()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFormat);

        let err = FrameReader::new(Cursor::new(b"ZIP!\0\0\0\x01".to_vec()))
            .read_header()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFormat);
    }

    #[test]
    fn test_position_tracks_consumed_bytes() {
        let bytes = book_frame(7, "notes");
        let total = bytes.len() as u64;
        let mut reader = FrameReader::new(Cursor::new(bytes));
        reader.next_frame().unwrap();
        assert_eq!(reader.position(), total);
    }
}
