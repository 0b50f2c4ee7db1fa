use std::io::{self, Read, Seek, SeekFrom};

/// Wraps a seekable reader and reports net-new bytes to a callback.
///
/// The wrapper keeps a high-water mark of bytes already reported. Backward
/// seeks (an SDK rewinding mid-attempt, or the engine's `seek(0)` before a
/// retry) move the position but never the mark, so re-read bytes are not
/// reported again: a part that rewinds any number of times still reports
/// exactly its window size once fully sent.
pub struct ProgressReader<R> {
    inner: R,
    on_delta: Box<dyn FnMut(u64) + Send>,
    /// Current position within the wrapped stream.
    pos: u64,
    /// Highest position ever reported.
    reported: u64,
}

impl<R: Read + Seek> ProgressReader<R> {
    pub fn new(inner: R, on_delta: impl FnMut(u64) + Send + 'static) -> Self {
        Self {
            inner,
            on_delta: Box::new(on_delta),
            pos: 0,
            reported: 0,
        }
    }

    /// Total bytes reported so far.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Consumes the wrapper, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.pos += n as u64;
            if self.pos > self.reported {
                let delta = self.pos - self.reported;
                (self.on_delta)(delta);
                self.reported = self.pos;
            }
        }
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for ProgressReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = self.inner.seek(pos)?;
        self.pos = new_pos;
        Ok(new_pos)
    }
}
