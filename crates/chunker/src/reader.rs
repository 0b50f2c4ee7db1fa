use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::ChunkError;

/// A reader bounded to one part's byte window `[offset, offset + size)`.
///
/// Owns its file handle, so any number of part readers over the same file
/// can run concurrently. Seeks are relative to the window; reading past the
/// window end yields end-of-stream.
pub struct PartReader {
    file: File,
    /// Absolute offset of the window start in the file.
    offset: u64,
    /// Window length in bytes.
    size: u64,
    /// Current position within the window.
    pos: u64,
}

impl PartReader {
    pub(crate) fn open(path: &Path, offset: u64, size: u64) -> Result<Self, ChunkError> {
        let mut file = File::open(path).map_err(|source| ChunkError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| ChunkError::Seek { offset, source })?;
        Ok(Self {
            file,
            offset,
            size,
            pos: 0,
        })
    }

    /// Window length in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// True when the window is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current position within the window.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for PartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size {
            return Ok(0);
        }
        let remaining = (self.size - self.pos) as usize;
        let take = buf.len().min(remaining);
        let n = self.file.read(&mut buf[..take])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for PartReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.size as i64 + d,
        };
        if target < 0 || target as u64 > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "seek to {target} out of bounds for part window of {} bytes",
                    self.size
                ),
            ));
        }
        let target = target as u64;
        self.file.seek(SeekFrom::Start(self.offset + target))?;
        self.pos = target;
        Ok(target)
    }
}
