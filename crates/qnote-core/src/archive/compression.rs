//! Compression for archive files
//!
//! Archives are plain frame streams; compression wraps the byte sink or
//! source so the codec itself never buffers a whole archive. The format is
//! picked from the file extension.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Default compression level for zstd
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Compression applied to an archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
}

impl Compression {
    /// Detect compression type from file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// Byte sink for a new archive file
pub enum ArchiveSink {
    Plain(BufWriter<File>),
    Zstd(zstd::Encoder<'static, BufWriter<File>>),
}

impl ArchiveSink {
    /// Flush everything and close the compression stream
    pub fn finish(self) -> Result<()> {
        match self {
            ArchiveSink::Plain(mut writer) => writer.flush().context("Failed to flush archive"),
            ArchiveSink::Zstd(encoder) => {
                let mut writer = encoder
                    .finish()
                    .context("Failed to finish zstd compression")?;
                writer.flush().context("Failed to flush archive")
            }
        }
    }
}

impl Write for ArchiveSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveSink::Plain(w) => w.write(buf),
            ArchiveSink::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveSink::Plain(w) => w.flush(),
            ArchiveSink::Zstd(w) => w.flush(),
        }
    }
}

/// Byte source for an existing archive file
pub enum ArchiveSource {
    Plain(BufReader<File>),
    Zstd(zstd::Decoder<'static, BufReader<File>>),
}

impl Read for ArchiveSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArchiveSource::Plain(r) => r.read(buf),
            ArchiveSource::Zstd(r) => r.read(buf),
        }
    }
}

/// Create an archive file, compressing it if the extension asks for it
pub fn create_archive(path: &Path, level: i32) -> Result<ArchiveSink> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create archive {:?}", path))?;
    let writer = BufWriter::new(file);

    let compression = Compression::from_path(path);
    debug!(?compression, ?path, "Creating archive file");
    match compression {
        Compression::None => Ok(ArchiveSink::Plain(writer)),
        Compression::Zstd => {
            let encoder = zstd::Encoder::new(writer, level)
                .context("Failed to create zstd encoder")?;
            Ok(ArchiveSink::Zstd(encoder))
        }
    }
}

/// Open an archive file for reading
///
/// Returns the source and, for uncompressed files, its exact length.
pub fn open_archive(path: &Path) -> Result<(ArchiveSource, Option<u64>)> {
    let file = File::open(path).with_context(|| format!("Failed to open archive {:?}", path))?;

    let compression = Compression::from_path(path);
    debug!(?compression, ?path, "Opening archive file");
    match compression {
        Compression::None => {
            let len = file
                .metadata()
                .with_context(|| format!("Failed to read metadata for {:?}", path))?
                .len();
            Ok((ArchiveSource::Plain(BufReader::new(file)), Some(len)))
        }
        Compression::Zstd => {
            let decoder = zstd::Decoder::with_buffer(BufReader::new(file))
                .context("Failed to create zstd decoder")?;
            Ok((ArchiveSource::Zstd(decoder), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_extension() {
        assert_eq!(
            Compression::from_path(Path::new("backup.qnote.zst")),
            Compression::Zstd
        );
        assert_eq!(
            Compression::from_path(Path::new("backup.qnote")),
            Compression::None
        );
        assert_eq!(Compression::from_path(Path::new("backup")), Compression::None);
    }

    #[test]
    fn test_zstd_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("data.qnote.zst");
        let data = b"Hello, World! This is a test of zstd compression.".repeat(20);

        let mut sink = create_archive(&path, DEFAULT_ZSTD_LEVEL).unwrap();
        sink.write_all(&data).unwrap();
        sink.finish().unwrap();

        // Compressed on disk
        assert!(std::fs::metadata(&path).unwrap().len() < data.len() as u64);

        let (mut source, len) = open_archive(&path).unwrap();
        assert!(len.is_none());
        let mut read_back = Vec::new();
        source.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn test_plain_file_reports_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.qnote");

        let mut sink = create_archive(&path, DEFAULT_ZSTD_LEVEL).unwrap();
        sink.write_all(b"test data").unwrap();
        sink.finish().unwrap();

        let (_, len) = open_archive(&path).unwrap();
        assert_eq!(len, Some(9));
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = open_archive(&temp_dir.path().join("missing.qnote")).err().unwrap();
        assert!(err.to_string().contains("Failed to open archive"));
    }
}
