//! Fixed-size part layout and bounded readers for multipart uploads.
//!
//! A [`FileChunker`] derives the ordered part list for a file, and lends
//! each part out as an independent, window-bounded [`PartReader`]. The
//! [`ProgressReader`] wrapper reports net-new bytes as a stream is consumed,
//! absorbing the rewinds that SDK retries cause.

mod chunk;
mod progress;
mod reader;

pub use chunk::{FileChunker, Part, DEFAULT_PART_SIZE, MIN_PART_SIZE};
pub use progress::ProgressReader;
pub use reader::PartReader;

/// Errors produced while laying out or reading parts.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("failed to open {path}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to seek to part window at offset {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read part {part}: {source}")]
    Read {
        part: i32,
        #[source]
        source: std::io::Error,
    },
}
