//! Resume coordinator: reconcile a persisted status with the server's part
//! list, then upload only the missing parts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use aws_sdk_s3::error::ProvideErrorMetadata;
use tracing::info;

use favus_chunker::FileChunker;
use favus_protocol::{PreCompletedPart, SessionStart};
use favus_reporter::Reporter;
use favus_status::UploadStatus;

use crate::engine::Uploader;
use crate::error::UploadError;
use crate::events::UploadEvent;

const MIB: f64 = 1024.0 * 1024.0;

impl Uploader {
    /// Resumes the session recorded in `status_path`.
    ///
    /// The server is authoritative: its part list is overlaid onto the local
    /// record before anything is uploaded, so parts acknowledged after the
    /// last successful save are not re-sent. If the file has changed since
    /// the session began (the recomputed part count disagrees), resume
    /// refuses with [`UploadError::StatusMismatch`].
    pub async fn resume(&self, status_path: &Path) -> Result<(), UploadError> {
        let mut status = UploadStatus::load(status_path)?;
        info!(
            file = %status.file_path,
            upload_id = %status.upload_id,
            "resuming multipart upload"
        );

        let server_parts = self
            .fetch_server_parts(&status.bucket, &status.key, &status.upload_id)
            .await?;
        for (part, etag) in &server_parts {
            status.add_completed_part(*part, etag.clone());
        }
        status.save(status_path)?;

        let chunker = Arc::new(FileChunker::new(
            &status.file_path,
            status.part_size_bytes,
        )?);
        let parts = chunker.parts();
        if parts.len() != status.total_parts {
            return Err(UploadError::StatusMismatch {
                expected: status.total_parts,
                actual: parts.len(),
            });
        }

        let already_bytes: u64 = parts
            .iter()
            .filter(|p| status.is_part_completed(p.index))
            .map(|p| p.size)
            .sum();
        let pre_completed: Vec<PreCompletedPart> = parts
            .iter()
            .filter_map(|p| {
                status.completed_parts.get(&p.index).map(|etag| PreCompletedPart {
                    part: p.index,
                    size: p.size,
                    etag: etag.clone(),
                })
            })
            .collect();
        info!(
            completed = pre_completed.len(),
            total = status.total_parts,
            already_bytes,
            "reconciled with server"
        );

        let total_bytes = chunker.file_size();
        let mut reporter = Reporter::new(total_bytes).await;
        reporter
            .session_start(SessionStart {
                bucket: status.bucket.clone(),
                key: status.key.clone(),
                upload_id: status.upload_id.clone(),
                part_mb: status.part_size_bytes as f64 / MIB,
                total: total_bytes,
                resumed: Some(true),
                already_bytes: Some(already_bytes),
                pre_completed: Some(pre_completed),
                total_parts: Some(status.total_parts),
                part_size_bytes: Some(status.part_size_bytes),
            })
            .await;
        // Throughput estimates start from what is already on the server.
        reporter.set_uploaded_bytes(already_bytes);

        let _ = self.events().try_send(UploadEvent::SessionStarted {
            upload_id: status.upload_id.clone(),
            total_bytes,
            total_parts: status.total_parts,
            resumed: true,
            already_bytes,
        });

        let pending: Vec<_> = parts
            .into_iter()
            .filter(|p| !status.is_part_completed(p.index))
            .collect();

        let bucket = status.bucket.clone();
        let key = status.key.clone();
        let upload_id = status.upload_id.clone();
        let status = Arc::new(Mutex::new(status));
        self.drive(
            chunker,
            pending,
            &bucket,
            &key,
            &upload_id,
            status,
            status_path.to_path_buf(),
            reporter,
        )
        .await
    }

    /// Pages through ListParts and returns the server's `part → etag` map.
    ///
    /// A `NoSuchUpload` answer means another actor already aborted or
    /// completed the session; that surfaces as [`UploadError::StatusStale`]
    /// instead of silently proceeding.
    pub(crate) async fn fetch_server_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<BTreeMap<i32, String>, UploadError> {
        let mut result = BTreeMap::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_parts()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .max_parts(1000);
            if let Some(m) = &marker {
                req = req.part_number_marker(m);
            }

            let out = match req.send().await {
                Ok(out) => out,
                Err(e) if e.code() == Some("NoSuchUpload") => {
                    return Err(UploadError::StatusStale(format!(
                        "upload {upload_id} for {key} no longer exists on the server"
                    )));
                }
                Err(e) => {
                    return Err(UploadError::ListParts {
                        source: Box::new(e),
                    })
                }
            };

            let mut last_seen: Option<i32> = None;
            for part in out.parts() {
                let Some(number) = part.part_number() else {
                    continue;
                };
                last_seen = Some(number);
                if let Some(etag) = part.e_tag() {
                    // Quotes preserved verbatim.
                    result.insert(number, etag.to_string());
                }
            }

            match next_marker(
                out.is_truncated().unwrap_or(false),
                out.next_part_number_marker(),
                last_seen,
            ) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(result)
    }
}

/// Pagination rule: when truncated, follow `NextPartNumberMarker`; if the
/// server left it empty, fall back to the largest part number seen in the
/// current page. `None` means the listing is finished.
fn next_marker(
    is_truncated: bool,
    next_part_number_marker: Option<&str>,
    last_seen: Option<i32>,
) -> Option<String> {
    if !is_truncated {
        return None;
    }
    match next_part_number_marker {
        Some(m) if !m.is_empty() => Some(m.to_string()),
        _ => last_seen.map(|n| n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_truncated_stops() {
        assert_eq!(next_marker(false, Some("5"), Some(5)), None);
        assert_eq!(next_marker(false, None, None), None);
    }

    #[test]
    fn truncated_follows_server_marker() {
        assert_eq!(next_marker(true, Some("1000"), Some(900)), Some("1000".into()));
    }

    #[test]
    fn truncated_with_empty_marker_falls_back_to_last_part() {
        assert_eq!(next_marker(true, Some(""), Some(42)), Some("42".into()));
        assert_eq!(next_marker(true, None, Some(7)), Some("7".into()));
    }

    #[test]
    fn truncated_empty_page_stops() {
        // Defensive: a truncated answer with neither marker nor parts
        // cannot make progress.
        assert_eq!(next_marker(true, None, None), None);
    }
}
