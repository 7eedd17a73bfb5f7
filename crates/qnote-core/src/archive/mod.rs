//! Binary archive codec
//!
//! Serializes a whole note collection into one portable stream and reads
//! it back.
//!
//! ## Layers
//!
//! - `frame`: kind-tagged, length-prefixed frames over `Read`/`Write`
//! - `encoder`: header plus book/tag/note frames, with ID interning
//! - `decoder`: header validation and a lazy iterator of resolved notes
//! - `compression`: optional zstd wrapping for archive files

pub mod compression;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;

pub use compression::{create_archive, open_archive, ArchiveSink, ArchiveSource, Compression};
pub use decoder::{ArchiveDecoder, DecodeState, DecodeSummary, Notes};
pub use encoder::{ArchiveEncoder, EncodeSummary};
pub use error::{ArchiveError, ArchiveResult, EntityKind, ErrorClass, ErrorKind};
pub use frame::{Frame, FrameReader, FrameWriter, Header, RecordKind, ARCHIVE_VERSION, MAGIC};
