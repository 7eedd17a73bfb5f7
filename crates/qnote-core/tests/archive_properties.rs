//! Codec properties over generated collections

use std::io::Cursor;

use chrono::DateTime;
use proptest::prelude::*;
use proptest::sample::Index;

use qnote_core::archive::{
    ArchiveDecoder, ArchiveEncoder, ArchiveResult, DecodeState, ErrorKind,
};
use qnote_core::{Book, Note, ShortText, Tag};

#[derive(Debug, Clone)]
struct NoteShape {
    note_type: String,
    title: String,
    body: String,
    book: Index,
    tags: Vec<Index>,
}

#[derive(Debug, Clone)]
struct Collection {
    books: Vec<Book>,
    tags: Vec<Tag>,
    notes: Vec<Note>,
}

/// Archive bytes plus every frame boundary before the end marker, paired
/// with the number of notes written up to it
struct Encoded {
    bytes: Vec<u8>,
    boundaries: Vec<(u64, usize)>,
}

fn entity_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "\\PC{1,60}",
        1 => Just("a".repeat(255)),
        1 => Just(format!("{}a", "é".repeat(127))),
        1 => Just(format!("{}abc", "😀".repeat(63))),
    ]
}

fn note_shape() -> impl Strategy<Value = NoteShape> {
    (
        prop_oneof![4 => "\\PC{0,40}", 1 => Just("t".repeat(255))],
        any::<String>(),
        prop_oneof![Just(String::new()), any::<String>()],
        any::<Index>(),
        prop::collection::vec(any::<Index>(), 0..6),
    )
        .prop_map(|(note_type, title, body, book, tags)| NoteShape {
            note_type,
            title,
            body,
            book,
            tags,
        })
}

fn collection() -> impl Strategy<Value = Collection> {
    (
        1i64..1_000_000,
        prop::collection::vec(entity_name(), 1..5),
        prop::collection::vec(entity_name(), 0..8),
        prop::collection::vec(note_shape(), 0..12),
    )
        .prop_map(|(base, book_names, tag_names, shapes)| {
            build(base, book_names, tag_names, shapes)
        })
}

fn build(
    base: i64,
    book_names: Vec<String>,
    tag_names: Vec<String>,
    shapes: Vec<NoteShape>,
) -> Collection {
    let books: Vec<Book> = book_names
        .into_iter()
        .zip(base..)
        .map(|(name, id)| Book::with_id(id, name).unwrap())
        .collect();
    let tags: Vec<Tag> = tag_names
        .into_iter()
        .zip(base..)
        .map(|(name, id)| Tag::with_id(id, name).unwrap())
        .collect();

    let notes: Vec<Note> = shapes
        .into_iter()
        .zip(base..)
        .map(|(shape, id)| {
            let book = books[shape.book.index(books.len())].clone();
            let mut note = Note::new(book, ShortText::new(shape.note_type).unwrap(), shape.title);
            note.id = id;
            note.set_body(shape.body);
            if !tags.is_empty() {
                for index in &shape.tags {
                    note.add_tag(tags[index.index(tags.len())].clone());
                }
            }
            note
        })
        .collect();

    Collection { books, tags, notes }
}

fn encode(collection: &Collection) -> Encoded {
    let mut encoder = ArchiveEncoder::new(Vec::new());
    encoder
        .write_header_at(DateTime::from_timestamp(1490493535, 0).unwrap())
        .unwrap();

    let mut boundaries = vec![(encoder.summary().bytes, 0)];
    for book in &collection.books {
        encoder.write_book(book).unwrap();
        boundaries.push((encoder.summary().bytes, 0));
    }
    for tag in &collection.tags {
        encoder.write_tag(tag).unwrap();
        boundaries.push((encoder.summary().bytes, 0));
    }
    for (written, note) in collection.notes.iter().enumerate() {
        encoder.write_note(note).unwrap();
        boundaries.push((encoder.summary().bytes, written + 1));
    }

    let (bytes, _) = encoder.finish().unwrap();
    Encoded { bytes, boundaries }
}

fn decode_all(decoder: &mut ArchiveDecoder<Cursor<Vec<u8>>>) -> Vec<ArchiveResult<Note>> {
    decoder.parse_header().unwrap();
    decoder.notes().unwrap().collect()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn decoded_notes_match_encoded_collection(collection in collection()) {
        let encoded = encode(&collection);
        let len = encoded.bytes.len() as u64;
        let mut decoder = ArchiveDecoder::with_len(Cursor::new(encoded.bytes), len);
        let notes = decode_all(&mut decoder)
            .into_iter()
            .collect::<ArchiveResult<Vec<_>>>()
            .unwrap();

        prop_assert_eq!(decoder.state(), DecodeState::Done);
        prop_assert_eq!(notes.len(), collection.notes.len());
        for (decoded, written) in notes.iter().zip(&collection.notes) {
            prop_assert!(decoded.content_eq(written), "{:?} != {:?}", decoded, written);
            prop_assert_eq!(decoded.id, written.id);
            prop_assert_eq!(decoded.tags.len(), written.tags.len());
        }

        let summary = decoder.summary();
        prop_assert_eq!(summary.books, collection.books.len() as u64);
        prop_assert_eq!(summary.tags, collection.tags.len() as u64);
        prop_assert_eq!(summary.notes, collection.notes.len() as u64);
        prop_assert_eq!(summary.bytes, len);
    }

    #[test]
    fn truncation_at_any_frame_boundary_keeps_prior_notes(collection in collection()) {
        let encoded = encode(&collection);

        for &(cut, written) in &encoded.boundaries {
            let prefix = encoded.bytes[..cut as usize].to_vec();
            let decoders = [
                ArchiveDecoder::new(Cursor::new(prefix.clone())),
                ArchiveDecoder::with_len(Cursor::new(prefix), cut),
            ];

            for mut decoder in decoders {
                let (ok, err): (Vec<_>, Vec<_>) =
                    decode_all(&mut decoder).into_iter().partition(Result::is_ok);

                prop_assert_eq!(ok.len(), written, "cut at {}", cut);
                prop_assert_eq!(err.len(), 1, "cut at {}", cut);
                prop_assert_eq!(
                    decoder.state(),
                    DecodeState::Failed(ErrorKind::TruncatedFrame),
                    "cut at {}",
                    cut
                );
                for (decoded, note) in ok.into_iter().zip(&collection.notes) {
                    prop_assert!(decoded.unwrap().content_eq(note));
                }
            }
        }
    }
}
