//! qnote Core Library
//!
//! This crate provides the core functionality for qnote, a personal note
//! collection organised into books and tagged notes, plus a portable binary
//! archive format for backing the collection up and moving it between
//! machines.
//!
//! # Architecture
//!
//! - **SQLite**: the live collection
//! - **Archive**: a self-describing, length-prefixed frame stream that
//!   serializes the whole collection and reads it back lazily
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//!
//! store.add_note("test", "basic", "Title", "Body", &["parser"])?;
//! store.export_to_path(Path::new("backup.qnote"))?;
//!
//! let report = other.import_from_path(Path::new("backup.qnote"), PartialImport::Discard)?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `models`: Books, tags and notes
//! - `archive`: Binary archive encoder and decoder
//! - `transfer`: Moving a collection between a store and an archive
//! - `storage`: SQLite schema and the `NoteStore` seam
//! - `config`: Application configuration

pub mod archive;
pub mod config;
pub mod models;
pub mod storage;
pub mod store;
pub mod transfer;

pub use archive::{
    ArchiveDecoder, ArchiveEncoder, ArchiveError, ArchiveResult, DecodeState, EncodeSummary,
    ErrorClass, ErrorKind, Header,
};
pub use config::Config;
pub use models::{Book, ModelError, Note, ShortText, Tag};
pub use storage::{NoteStore, SqliteSession};
pub use store::Store;
pub use transfer::{ImportReport, PartialImport};
