//! Optional gzip pre-step: compress the source to a temp path and upload
//! that instead. The caller records the original path in the status file so
//! a resume keeps working on the compressed copy.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::error::UploadError;

/// Compresses `src` into `{tmp}/favus-compressed/{basename}.{nanos}.gz`
/// and returns the new path. A partial file is removed on failure.
pub(crate) fn gzip_to_temp(src: &Path) -> Result<PathBuf, UploadError> {
    let io_err = |path: &Path, source| UploadError::FileIo {
        path: path.display().to_string(),
        source,
    };

    let dir = std::env::temp_dir().join("favus-compressed");
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let base = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dest = dir.join(format!("{base}.{nanos}.gz"));

    info!(src = %src.display(), dest = %dest.display(), "compressing before upload");
    match write_gzip(src, &dest) {
        Ok(()) => Ok(dest),
        Err(e) => {
            let _ = std::fs::remove_file(&dest);
            Err(io_err(src, e))
        }
    }
}

fn write_gzip(src: &Path, dest: &Path) -> std::io::Result<()> {
    let mut input = File::open(src)?;
    let output = File::create(dest)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    Ok(())
}
