use std::path::{Path, PathBuf};

use crate::reader::PartReader;
use crate::ChunkError;

/// Default part size: 8 MiB.
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Smallest part size S3 accepts for any part but the last: 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// One contiguous byte range of the source file, uploaded as a single part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part number, 1-based and contiguous.
    pub index: i32,
    /// Starting byte offset in the file.
    pub offset: u64,
    /// Size of this part; only the last part may be smaller than the
    /// configured part size.
    pub size: u64,
}

/// Splits a file into fixed-size parts and opens per-part readers.
///
/// The part list is pure arithmetic over the file size captured at
/// construction; [`open_part`](Self::open_part) opens a fresh handle each
/// call, so parts can be read concurrently without interference.
#[derive(Debug)]
pub struct FileChunker {
    path: PathBuf,
    file_size: u64,
    part_size: u64,
}

impl FileChunker {
    /// Creates a chunker for `path`.
    ///
    /// A `part_size` of 0 falls back to [`DEFAULT_PART_SIZE`].
    pub fn new(path: impl AsRef<Path>, part_size: u64) -> Result<Self, ChunkError> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|source| ChunkError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        let part_size = if part_size == 0 {
            DEFAULT_PART_SIZE
        } else {
            part_size
        };
        Ok(Self {
            path,
            file_size: meta.len(),
            part_size,
        })
    }

    /// Total size of the source file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Configured part size in bytes.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Source file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the ordered part list. An empty file yields no parts.
    pub fn parts(&self) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut index = 1i32;
        while offset < self.file_size {
            let size = self.part_size.min(self.file_size - offset);
            parts.push(Part {
                index,
                offset,
                size,
            });
            offset += size;
            index += 1;
        }
        parts
    }

    /// Opens an independent reader bounded to `part`'s window.
    pub fn open_part(&self, part: &Part) -> Result<PartReader, ChunkError> {
        PartReader::open(&self.path, part.offset, part.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn parts_cover_file_exactly() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 1000);
        let chunker = FileChunker::new(&path, 256).unwrap();
        let parts = chunker.parts();

        assert_eq!(parts.len(), 4);
        let total: u64 = parts.iter().map(|p| p.size).sum();
        assert_eq!(total, 1000);
        // Every part but the last carries exactly the part size.
        for p in &parts[..parts.len() - 1] {
            assert_eq!(p.size, 256);
        }
        assert_eq!(parts.last().unwrap().size, 1000 % 256);
    }

    #[test]
    fn parts_are_contiguous_and_one_based() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 700);
        let chunker = FileChunker::new(&path, 100).unwrap();
        for (i, p) in chunker.parts().iter().enumerate() {
            assert_eq!(p.index, i as i32 + 1);
            assert_eq!(p.offset, i as u64 * 100);
        }
    }

    #[test]
    fn exact_multiple_has_full_last_part() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 512);
        let chunker = FileChunker::new(&path, 128).unwrap();
        let parts = chunker.parts();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.last().unwrap().size, 128);
    }

    #[test]
    fn one_extra_byte_adds_a_part() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 513);
        let chunker = FileChunker::new(&path, 128).unwrap();
        let parts = chunker.parts();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts.last().unwrap().size, 1);
    }

    #[test]
    fn empty_file_yields_no_parts() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 0);
        let chunker = FileChunker::new(&path, 128).unwrap();
        assert!(chunker.parts().is_empty());
    }

    #[test]
    fn zero_part_size_uses_default() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 10);
        let chunker = FileChunker::new(&path, 0).unwrap();
        assert_eq!(chunker.part_size(), DEFAULT_PART_SIZE);
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = FileChunker::new("/nonexistent/nope.bin", 128).unwrap_err();
        assert!(matches!(err, ChunkError::FileOpen { .. }));
    }

    #[test]
    fn open_part_reads_the_window() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 300);
        let chunker = FileChunker::new(&path, 100).unwrap();
        let parts = chunker.parts();

        let mut buf = Vec::new();
        let mut reader = chunker.open_part(&parts[1]).unwrap();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 100);

        let whole = std::fs::read(&path).unwrap();
        assert_eq!(buf, whole[100..200]);
    }

    #[test]
    fn open_part_handles_are_independent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "f.bin", 200);
        let chunker = FileChunker::new(&path, 100).unwrap();
        let parts = chunker.parts();

        let mut r1 = chunker.open_part(&parts[0]).unwrap();
        let mut r2 = chunker.open_part(&parts[1]).unwrap();

        // Interleaved reads must not disturb each other.
        let mut a = [0u8; 50];
        let mut b = [0u8; 50];
        r1.read_exact(&mut a).unwrap();
        r2.read_exact(&mut b).unwrap();
        r1.read_exact(&mut a).unwrap();
        r2.read_exact(&mut b).unwrap();

        let whole = std::fs::read(&path).unwrap();
        assert_eq!(&a[..], &whole[50..100]);
        assert_eq!(&b[..], &whole[150..200]);
    }
}
