//! Archive error handling
//!
//! Every failure the codec can report, grouped into the classes a caller
//! acts on: format errors abort the whole import, stream and structural
//! errors end the current pass, reference errors mean the archive is
//! internally inconsistent.

use std::io;

use thiserror::Error;

/// Record kinds that can carry a dangling reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Book,
    Tag,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Book => f.write_str("book"),
            EntityKind::Tag => f.write_str("tag"),
        }
    }
}

/// Errors that can occur while writing or reading an archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The stream does not start with the archive magic
    #[error("Unknown archive format: expected magic {expected:?}, found {found:?}")]
    UnknownFormat { expected: [u8; 4], found: [u8; 4] },

    /// The archive was written by a newer version
    #[error("Unsupported archive version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Input ended in the middle of a frame, or before the end marker
    #[error("Truncated frame: input ended while reading {context}")]
    TruncatedFrame { context: &'static str },

    /// A length prefix points past the end of the input
    #[error("Corrupt length for {field}: {declared} bytes declared, at most {available} available")]
    CorruptLength {
        field: &'static str,
        declared: u64,
        available: u64,
    },

    /// A frame started with a kind byte this version does not know
    #[error("Unknown record kind 0x{0:02x}")]
    UnknownRecordKind(u8),

    /// A field decoded to a value that cannot be represented
    #[error("Invalid {field}: {details}")]
    InvalidField {
        field: &'static str,
        details: String,
    },

    /// The end marker disagrees with what was read
    #[error("End marker records {expected} notes but {found} were read")]
    TrailerMismatch { expected: u64, found: u64 },

    /// A note refers to a book or tag that has not been written/read yet
    #[error("Note {note_id} references {kind} {id} which has not appeared in the archive")]
    UnresolvedReference {
        note_id: i64,
        kind: EntityKind,
        id: i64,
    },

    /// A text field is too long for its length prefix
    #[error("Field '{field}' is {len} bytes long, the limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: u64,
    },

    /// An operation was called in the wrong state
    #[error("Out of order: {0}")]
    OutOfOrder(&'static str),

    /// Underlying sink/source failed
    #[error("Archive I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Broad classes of archive errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad magic or version; nothing in the stream is usable
    Format,
    /// The byte sink or source failed
    Stream,
    /// A frame is truncated or malformed; earlier frames remain valid
    Structural,
    /// A note refers to an entity that has not been seen
    Reference,
    /// The codec API was misused
    Usage,
}

/// Fieldless mirror of [`ArchiveError`], kept by the decoder after failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownFormat,
    UnsupportedVersion,
    TruncatedFrame,
    CorruptLength,
    UnknownRecordKind,
    InvalidField,
    TrailerMismatch,
    UnresolvedReference,
    FieldTooLong,
    OutOfOrder,
    Io,
}

impl ErrorKind {
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorKind::UnknownFormat | ErrorKind::UnsupportedVersion => ErrorClass::Format,
            ErrorKind::Io => ErrorClass::Stream,
            ErrorKind::TruncatedFrame
            | ErrorKind::CorruptLength
            | ErrorKind::UnknownRecordKind
            | ErrorKind::InvalidField
            | ErrorKind::TrailerMismatch => ErrorClass::Structural,
            ErrorKind::UnresolvedReference => ErrorClass::Reference,
            ErrorKind::FieldTooLong | ErrorKind::OutOfOrder => ErrorClass::Usage,
        }
    }
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::UnknownFormat { .. } => ErrorKind::UnknownFormat,
            ArchiveError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            ArchiveError::TruncatedFrame { .. } => ErrorKind::TruncatedFrame,
            ArchiveError::CorruptLength { .. } => ErrorKind::CorruptLength,
            ArchiveError::UnknownRecordKind(_) => ErrorKind::UnknownRecordKind,
            ArchiveError::InvalidField { .. } => ErrorKind::InvalidField,
            ArchiveError::TrailerMismatch { .. } => ErrorKind::TrailerMismatch,
            ArchiveError::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            ArchiveError::FieldTooLong { .. } => ErrorKind::FieldTooLong,
            ArchiveError::OutOfOrder(_) => ErrorKind::OutOfOrder,
            ArchiveError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.kind().class()
    }

    /// Map an I/O error raised while reading a frame
    ///
    /// An unexpected EOF inside a frame means the input was cut short.
    pub(crate) fn from_read(error: io::Error, context: &'static str) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::TruncatedFrame { context }
        } else {
            ArchiveError::Io(error)
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.class() {
            ErrorClass::Format => {
                Some("The file is not a qnote archive or was written by a newer version of qnote.")
            }
            ErrorClass::Structural => {
                Some("The archive is damaged. Notes read before the damage are still valid.")
            }
            ErrorClass::Reference => Some(
                "The archive lists a note before its book or tags. Re-export it with a current version of qnote.",
            ),
            ErrorClass::Stream | ErrorClass::Usage => None,
        }
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_is_truncation() {
        let err = ArchiveError::from_read(
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
            "note title",
        );
        assert_eq!(err.kind(), ErrorKind::TruncatedFrame);
        assert_eq!(err.class(), ErrorClass::Structural);
        assert!(err.to_string().contains("note title"));
    }

    #[test]
    fn test_other_read_errors_stay_io() {
        let err = ArchiveError::from_read(
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"),
            "note title",
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.class(), ErrorClass::Stream);
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_error_classes() {
        let format = ArchiveError::UnknownFormat {
            expected: *b"QNOT",
            found: *b"ZZZZ",
        };
        assert_eq!(format.class(), ErrorClass::Format);
        assert!(format.recovery_suggestion().is_some());

        let reference = ArchiveError::UnresolvedReference {
            note_id: 603,
            kind: EntityKind::Tag,
            id: 4,
        };
        assert_eq!(reference.class(), ErrorClass::Reference);
        assert_eq!(
            reference.to_string(),
            "Note 603 references tag 4 which has not appeared in the archive"
        );

        assert_eq!(
            ArchiveError::OutOfOrder("header written twice").class(),
            ErrorClass::Usage
        );
    }

    #[test]
    fn test_corrupt_length_display() {
        let err = ArchiveError::CorruptLength {
            field: "note body",
            declared: 4096,
            available: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("note body"));
        assert!(msg.contains("4096"));
    }
}
