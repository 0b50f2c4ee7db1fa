//! Listing and cleanup operations over the configured bucket.

use aws_sdk_s3::error::ProvideErrorMetadata;
use tracing::{info, warn};

use crate::engine::Uploader;
use crate::error::UploadError;

/// One in-progress multipart session, as reported by the server.
#[derive(Debug, Clone)]
pub struct MultipartUploadInfo {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<String>,
}

/// One stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl Uploader {
    /// Lists every in-progress multipart session in the bucket, following
    /// key/upload-id marker pagination to the end.
    pub async fn list_in_progress(&self) -> Result<Vec<MultipartUploadInfo>, UploadError> {
        let mut uploads = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut id_marker: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_multipart_uploads()
                .bucket(&self.config.bucket);
            if let Some(k) = &key_marker {
                req = req.key_marker(k);
            }
            if let Some(i) = &id_marker {
                req = req.upload_id_marker(i);
            }
            let out = req.send().await.map_err(|e| UploadError::ListUploads {
                source: Box::new(e),
            })?;

            for upload in out.uploads() {
                let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                uploads.push(MultipartUploadInfo {
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    initiated: upload.initiated().map(|d| d.to_string()),
                });
            }

            if !out.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = out.next_key_marker().map(String::from);
            id_marker = out.next_upload_id_marker().map(String::from);
            if key_marker.is_none() && id_marker.is_none() {
                break;
            }
        }
        Ok(uploads)
    }

    /// Aborts every in-progress multipart session in the bucket. Returns
    /// how many were aborted; individual failures are logged and skipped.
    pub async fn abort_orphans(&self) -> Result<usize, UploadError> {
        let uploads = self.list_in_progress().await?;
        let mut aborted = 0;
        for upload in &uploads {
            match self.abort(&upload.key, &upload.upload_id).await {
                Ok(()) => {
                    info!(key = %upload.key, upload_id = %upload.upload_id, "aborted orphan upload");
                    aborted += 1;
                }
                Err(e) => {
                    warn!(key = %upload.key, upload_id = %upload.upload_id, error = %e, "failed to abort orphan");
                }
            }
        }
        Ok(aborted)
    }

    /// Lists objects under `prefix` (the whole bucket when `None`).
    pub async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>, UploadError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.config.bucket);
            if let Some(p) = prefix {
                req = req.prefix(p);
            }
            if let Some(t) = &token {
                req = req.continuation_token(t);
            }
            let out = req.send().await.map_err(|e| UploadError::ListObjects {
                source: Box::new(e),
            })?;

            for object in out.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().map(|d| d.to_string()),
                });
            }

            match out.next_continuation_token() {
                Some(t) if out.is_truncated().unwrap_or(false) => token = Some(t.to_string()),
                _ => break,
            }
        }
        Ok(objects)
    }

    /// HEADs an object; `Ok(None)` when the key does not exist.
    pub async fn head_object(&self, key: &str) -> Result<Option<u64>, UploadError> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => Ok(Some(out.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|svc| svc.is_not_found())
                    || e.code() == Some("NotFound");
                if not_found {
                    Ok(None)
                } else {
                    Err(UploadError::ListObjects {
                        source: Box::new(e),
                    })
                }
            }
        }
    }
}
