//! Durable status records for multipart upload sessions.
//!
//! A status file is the crash-safety anchor of an upload: it is rewritten
//! after every acknowledged part and read back by the resume path. Writes
//! go through a sibling temp file and an atomic rename, so a crash reveals
//! either the previous complete record or the new one, never a torn file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors from loading or saving a status file.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status file not found: {0}")]
    NotFound(String),

    #[error("status file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on status file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk record of a multipart upload session.
///
/// Field names are part of the wire format shared with older tooling;
/// `completedParts` maps part numbers (as JSON object keys) to etags stored
/// verbatim, surrounding quotes included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStatus {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(
        rename = "originalFilePath",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub original_file_path: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    /// Completed part number → etag. A BTreeMap keeps the file diffable.
    #[serde(rename = "completedParts")]
    pub completed_parts: BTreeMap<i32, String>,
    #[serde(rename = "totalParts")]
    pub total_parts: usize,
    #[serde(rename = "partSizeBytes")]
    pub part_size_bytes: u64,
}

impl UploadStatus {
    /// Creates a fresh status with no completed parts.
    pub fn new(
        file_path: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        total_parts: usize,
        part_size_bytes: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            original_file_path: None,
            upload_id: upload_id.into(),
            bucket: bucket.into(),
            key: key.into(),
            completed_parts: BTreeMap::new(),
            total_parts,
            part_size_bytes,
        }
    }

    /// Records a completed part. The etag is stored verbatim.
    pub fn add_completed_part(&mut self, part: i32, etag: impl Into<String>) {
        self.completed_parts.insert(part, etag.into());
    }

    /// True if `part` has been acknowledged.
    pub fn is_part_completed(&self, part: i32) -> bool {
        self.completed_parts.contains_key(&part)
    }

    /// Completed `(part, etag)` pairs in ascending part order.
    pub fn completed_pairs(&self) -> Vec<(i32, String)> {
        self.completed_parts
            .iter()
            .map(|(p, e)| (*p, e.clone()))
            .collect()
    }

    /// Saves the record atomically: temp file in the same directory, fsync,
    /// rename into place.
    pub fn save(&self, path: &Path) -> Result<(), StatusError> {
        let io_err = |source| StatusError::Io {
            path: path.display().to_string(),
            source,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;

        let data = serde_json::to_vec_pretty(self).map_err(|source| StatusError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Loads a record, distinguishing a missing file from a corrupt one.
    pub fn load(path: &Path) -> Result<Self, StatusError> {
        let data = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StatusError::NotFound(path.display().to_string())
            } else {
                StatusError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        serde_json::from_slice(&data).map_err(|source| StatusError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Builds the conventional status file path:
/// `{dir}/{basename}_{first8(upload_id)}.upload_status`.
pub fn status_file_path(dir: &Path, file_path: &Path, upload_id: &str) -> PathBuf {
    let base = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let id8: String = upload_id.chars().take(8).collect();
    dir.join(format!("{base}_{id8}.upload_status"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> UploadStatus {
        let mut s = UploadStatus::new(
            "/data/video.mp4",
            "my-bucket",
            "uploads/video.mp4",
            "upload-id-123456",
            3,
            5 * 1024 * 1024,
        );
        s.add_completed_part(1, "\"etag-one\"");
        s
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.upload_status");
        let status = sample();
        status.save(&path).unwrap();

        let loaded = UploadStatus::load(&path).unwrap();
        assert_eq!(loaded.file_path, "/data/video.mp4");
        assert_eq!(loaded.bucket, "my-bucket");
        assert_eq!(loaded.key, "uploads/video.mp4");
        assert_eq!(loaded.upload_id, "upload-id-123456");
        assert_eq!(loaded.total_parts, 3);
        assert_eq!(loaded.part_size_bytes, 5 * 1024 * 1024);
        assert_eq!(loaded.completed_parts.get(&1).unwrap(), "\"etag-one\"");
    }

    #[test]
    fn wire_keys_are_exact() {
        let json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "filePath",
            "uploadId",
            "bucket",
            "key",
            "completedParts",
            "totalParts",
            "partSizeBytes",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        // Part numbers serialize as JSON object keys (strings).
        assert!(json["completedParts"].get("1").is_some());
        // Absent original path is omitted entirely.
        assert!(obj.get("originalFilePath").is_none());
    }

    #[test]
    fn original_file_path_serialized_when_set() {
        let mut s = sample();
        s.original_file_path = Some("/data/raw.mp4".into());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["originalFilePath"], "/data/raw.mp4");
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = UploadStatus::load(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StatusError::NotFound(_)));
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.upload_status");
        std::fs::write(&path, b"{not json").unwrap();
        let err = UploadStatus::load(&path).unwrap_err();
        assert!(matches!(err, StatusError::Corrupt { .. }));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.upload_status");
        sample().save(&path).unwrap();
        sample().save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1, "only the status file remains: {entries:?}");
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.upload_status");
        let mut status = sample();
        status.save(&path).unwrap();

        status.add_completed_part(2, "\"etag-two\"");
        status.save(&path).unwrap();

        let loaded = UploadStatus::load(&path).unwrap();
        assert_eq!(loaded.completed_parts.len(), 2);
    }

    #[test]
    fn etag_quotes_survive_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.upload_status");
        let mut s = sample();
        s.add_completed_part(2, "\"0f343b0931126a20f133d67c2b018a3b\"");
        s.save(&path).unwrap();

        let loaded = UploadStatus::load(&path).unwrap();
        assert_eq!(
            loaded.completed_parts.get(&2).unwrap(),
            "\"0f343b0931126a20f133d67c2b018a3b\""
        );
    }

    #[test]
    fn completed_pairs_sorted_ascending() {
        let mut s = sample();
        s.add_completed_part(9, "\"i\"");
        s.add_completed_part(3, "\"c\"");
        let pairs = s.completed_pairs();
        let numbers: Vec<i32> = pairs.iter().map(|(p, _)| *p).collect();
        assert_eq!(numbers, vec![1, 3, 9]);
    }

    #[test]
    fn status_path_template() {
        let p = status_file_path(
            Path::new("/tmp"),
            Path::new("/data/video.mp4"),
            "abcdefgh12345678",
        );
        assert_eq!(
            p,
            PathBuf::from("/tmp/video.mp4_abcdefgh.upload_status")
        );
    }

    #[test]
    fn status_path_short_upload_id() {
        let p = status_file_path(Path::new("/tmp"), Path::new("f.bin"), "abc");
        assert_eq!(p, PathBuf::from("/tmp/f.bin_abc.upload_status"));
    }
}
