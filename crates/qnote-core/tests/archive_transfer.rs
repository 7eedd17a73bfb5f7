//! End-to-end archive transfer between two on-disk stores

use std::io::Cursor;

use qnote_core::archive::{ArchiveDecoder, DecodeState, ErrorClass, ErrorKind};
use qnote_core::{Config, NoteStore, PartialImport, Store};
use tempfile::TempDir;

const BODY: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.
Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.
Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.
Duis aute irure dolor in reprehenderit in voluptate velit esse.";

fn open_store(dir: &TempDir, name: &str) -> Store {
    Store::open_with_config(Config::with_data_dir(dir.path().join(name))).unwrap()
}

fn seed(store: &mut Store) {
    store
        .add_note(
            "test",
            "basic",
            "This is test 1 of the basic parser",
            BODY,
            &["basic", "test", "parser"],
        )
        .unwrap();
    store
        .add_note(
            "test",
            "basic",
            "This is #test 2 of the #basic #parser",
            BODY,
            &["basic", "test", "parser"],
        )
        .unwrap();
    store
        .add_note("journal", "entry", "Ünïcödé title ✓", "", &["personal"])
        .unwrap();
}

#[test]
fn collection_survives_export_and_import() {
    let dir = TempDir::new().unwrap();
    let mut source = open_store(&dir, "source");
    seed(&mut source);

    let archive = dir.path().join("backup.qnote.zst");
    let summary = source.export_to_path(&archive).unwrap();
    assert_eq!((summary.books, summary.tags, summary.notes), (2, 4, 3));

    let mut target = open_store(&dir, "target");
    let report = target
        .import_from_path(&archive, PartialImport::Discard)
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.notes_imported, 3);
    assert_eq!(report.books_created, 2);
    assert_eq!(report.tags_created, 4);

    let expected = source.notes().unwrap();
    let actual = target.notes().unwrap();
    assert_eq!(expected.len(), actual.len());
    for (a, b) in expected.iter().zip(&actual) {
        assert!(a.content_eq(b), "{:?} != {:?}", a, b);
        assert_eq!(a.created, b.created);
    }

    // Importing again reuses books and tags but duplicates notes
    let report = target
        .import_from_path(&archive, PartialImport::Discard)
        .unwrap();
    assert_eq!((report.books_created, report.tags_created), (0, 0));
    assert_eq!(target.note_count().unwrap(), 6);
}

#[test]
fn decoder_streams_notes_lazily() {
    let mut store = Store::open_in_memory().unwrap();
    seed(&mut store);
    let (bytes, _) = store.export_to(Vec::new()).unwrap();
    let len = bytes.len() as u64;
    let mut decoder = ArchiveDecoder::with_len(Cursor::new(bytes), len);
    let header = decoder.parse_header().unwrap();
    assert_eq!(header.version, 1);

    let mut notes = decoder.notes().unwrap();
    let first = notes.next().unwrap().unwrap();
    assert_eq!(first.title, "This is test 1 of the basic parser");
    assert_eq!(first.body.lines().count(), 4);
    assert_eq!(notes.state(), DecodeState::Streaming);
    drop(notes);

    // Abandoned streams stay where they stopped
    assert_eq!(decoder.state(), DecodeState::Streaming);
    assert_eq!(decoder.summary().notes, 1);
}

#[test]
fn damaged_archive_is_reported_and_discarded() {
    let dir = TempDir::new().unwrap();
    let mut source = open_store(&dir, "source");
    seed(&mut source);
    let (mut bytes, _) = source.export_to(Vec::new()).unwrap();

    // Corrupt the kind byte of the end marker
    let end = bytes.len() - 9;
    bytes[end] = 0x7f;

    let mut target = open_store(&dir, "target");
    let mut decoder = ArchiveDecoder::new(Cursor::new(bytes));
    let report = target
        .import_from(&mut decoder, PartialImport::Discard)
        .unwrap();

    let error = report.error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::UnknownRecordKind);
    assert_eq!(error.class(), ErrorClass::Structural);
    assert!(report.rolled_back);
    assert_eq!(target.note_count().unwrap(), 0);
    assert_eq!(decoder.state(), DecodeState::Failed(ErrorKind::UnknownRecordKind));
}
