//! Archive command handlers
//!
//! Export and import move the whole collection; inspect reads an archive
//! without touching the store.

use std::path::Path;

use anyhow::{bail, Context, Result};

use qnote_core::archive::{open_archive, ArchiveDecoder};
use qnote_core::{PartialImport, Store};

use crate::output::Output;

/// Export the collection to an archive file
pub fn export(store: &Store, path: &Path, output: &Output) -> Result<()> {
    let summary = store
        .export_to_path(path)
        .with_context(|| format!("Failed to export to {:?}", path))?;
    output.print_export(path, &summary);
    Ok(())
}

/// Import an archive file into the collection
pub fn import(store: &mut Store, path: &Path, keep_partial: bool, output: &Output) -> Result<()> {
    let policy = if keep_partial {
        PartialImport::Keep
    } else {
        PartialImport::Discard
    };

    let report = store.import_from_path(path, policy)?;
    output.print_import(path, &report);

    if !report.is_complete() {
        bail!("Import of {:?} stopped early", path);
    }
    Ok(())
}

/// Decode an archive and report what it holds
pub fn inspect(path: &Path, output: &Output) -> Result<()> {
    let (source, len) = open_archive(path)?;
    let mut decoder = match len {
        Some(len) => ArchiveDecoder::with_len(source, len),
        None => ArchiveDecoder::new(source),
    };

    let mut error = decoder.parse_header().err();
    if error.is_none() {
        match decoder.notes() {
            Ok(notes) => {
                for item in notes {
                    if let Err(err) = item {
                        error = Some(err);
                        break;
                    }
                }
            }
            Err(err) => error = Some(err),
        }
    }

    output.print_inspect(path, decoder.header(), &decoder.summary(), error.as_ref());

    if error.is_some() {
        bail!("Archive {:?} is damaged", path);
    }
    Ok(())
}
