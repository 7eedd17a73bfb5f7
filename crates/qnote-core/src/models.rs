//! Data models for qnote
//!
//! Defines the core data structures: Book, Tag, and Note.
//! IDs are assigned by the store; the archive codec carries them verbatim
//! but importers are free to reassign them.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum byte length of a [`ShortText`]
pub const SHORT_TEXT_MAX: usize = 255;

/// Errors raised when constructing model values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Text exceeds the short-string cap
    #[error("'{field}' is {len} bytes long, the limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Book and tag names must not be empty
    #[error("{0} name cannot be empty")]
    EmptyName(&'static str),
}

/// A string of at most [`SHORT_TEXT_MAX`] bytes
///
/// Used for book names, tag names and note types, which are written to
/// archives with a one-byte length prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortText(String);

impl ShortText {
    /// Create a short text, failing if it is longer than the cap
    pub fn new(text: impl Into<String>) -> Result<Self, ModelError> {
        let text = text.into();
        if text.len() > SHORT_TEXT_MAX {
            return Err(ModelError::TooLong {
                field: "short text",
                len: text.len(),
                max: SHORT_TEXT_MAX,
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<String> for ShortText {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ShortText {
    type Error = ModelError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ShortText> for String {
    fn from(s: ShortText) -> Self {
        s.0
    }
}

impl AsRef<str> for ShortText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ShortText {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ShortText {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ShortText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn entity_name(kind: &'static str, name: impl Into<String>) -> Result<ShortText, ModelError> {
    let name = name.into();
    if name.is_empty() {
        return Err(ModelError::EmptyName(kind));
    }
    ShortText::new(name).map_err(|err| match err {
        ModelError::TooLong { len, max, .. } => ModelError::TooLong {
            field: kind,
            len,
            max,
        },
        other => other,
    })
}

/// Current time truncated to whole seconds, the resolution archives keep
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// A collection of notes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    /// Store-assigned identifier (0 until stored)
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Unique, non-empty name
    pub name: ShortText,
}

impl Book {
    /// Create a new, unsaved book
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        Self::with_id(0, name)
    }

    /// Create a book with a specific ID (for loading from storage)
    pub fn with_id(id: i64, name: impl Into<String>) -> Result<Self, ModelError> {
        let now = now();
        Ok(Self {
            id,
            created: now,
            modified: now,
            name: entity_name("book", name)?,
        })
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Book ID: {} Name: {}>", self.id, self.name)
    }
}

/// A label attached to notes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    /// Store-assigned identifier (0 until stored)
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Unique, non-empty name
    pub name: ShortText,
}

impl Tag {
    /// Create a new, unsaved tag
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        Self::with_id(0, name)
    }

    /// Create a tag with a specific ID (for loading from storage)
    pub fn with_id(id: i64, name: impl Into<String>) -> Result<Self, ModelError> {
        let now = now();
        Ok(Self {
            id,
            created: now,
            modified: now,
            name: entity_name("tag", name)?,
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Tag ID: {} Name: {}>", self.id, self.name)
    }
}

/// A text note owned by exactly one book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned identifier (0 until stored)
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Short classifying string, e.g. "basic"
    #[serde(rename = "type")]
    pub note_type: ShortText,
    pub title: String,
    pub body: String,
    /// Owning book
    pub book: Book,
    /// Tags, unique by ID, order not significant
    pub tags: Vec<Tag>,
}

impl Note {
    /// Create a new, unsaved note in the given book
    pub fn new(book: Book, note_type: ShortText, title: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: 0,
            created: now,
            modified: now,
            note_type,
            title: title.into(),
            body: String::new(),
            book,
            tags: Vec::new(),
        }
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.modified = now();
    }

    /// Update the body
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.modified = now();
    }

    /// Add a tag unless one with the same ID is already attached
    pub fn add_tag(&mut self, tag: Tag) {
        if !self.tags.iter().any(|t| t.id == tag.id) {
            self.tags.push(tag);
            self.modified = now();
        }
    }

    /// Remove a tag by ID
    pub fn remove_tag(&mut self, id: i64) {
        if let Some(pos) = self.tags.iter().position(|t| t.id == id) {
            self.tags.remove(pos);
            self.modified = now();
        }
    }

    /// Tag names as a sorted set
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    /// Compare everything that survives an export/import cycle
    ///
    /// Ignores IDs and timestamps: Title, Body, Type, Book name and the set
    /// of Tag names must match.
    pub fn content_eq(&self, other: &Note) -> bool {
        self.title == other.title
            && self.body == other.body
            && self.note_type == other.note_type
            && self.book.name == other.book.name
            && self.tag_names() == other.tag_names()
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        fn sorted(tags: &[Tag]) -> Vec<&Tag> {
            let mut tags: Vec<&Tag> = tags.iter().collect();
            tags.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
            tags
        }

        self.id == other.id
            && self.created == other.created
            && self.modified == other.modified
            && self.note_type == other.note_type
            && self.title == other.title
            && self.body == other.body
            && self.book == other.book
            && sorted(&self.tags) == sorted(&other.tags)
    }
}

impl Eq for Note {}
