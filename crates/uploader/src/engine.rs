//! The multipart upload engine.
//!
//! A session is: bucket check → initiate → bounded worker pool over the part
//! queue → complete. Workers retry transient part failures with linear
//! backoff, persist the status file after every acknowledged part, and feed
//! a single dispatcher task that owns the wire [`Reporter`]. Any terminal
//! worker error cancels the pool, aborts the server-side session
//! (best-effort) and surfaces the original error.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use favus_chunker::{FileChunker, Part, ProgressReader};
use favus_protocol::SessionStart;
use favus_reporter::Reporter;
use favus_status::{status_file_path, UploadStatus};

use crate::compress;
use crate::config::Config;
use crate::error::{is_transient, UploadError};
use crate::events::UploadEvent;

/// Part upload attempts before giving up.
const UPLOAD_RETRY_ATTEMPTS: u32 = 5;

/// Base delay of the linear backoff between attempts.
const UPLOAD_RETRY_BASE: Duration = Duration::from_secs(2);

const MIB: f64 = 1024.0 * 1024.0;

/// Multipart upload engine bound to one S3 client and a resolved config.
pub struct Uploader {
    pub(crate) client: Client,
    pub(crate) config: Config,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl Uploader {
    pub fn new(client: Client, config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// The resolved configuration this engine runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that cancels the session (Ctrl-C wiring lives in the caller).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Takes the engine event receiver. Can only be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub(crate) fn events(&self) -> &mpsc::Sender<UploadEvent> {
        &self.events_tx
    }

    /// Uploads `file_path` to `key` as a multipart session.
    ///
    /// A zero-byte file succeeds immediately without touching the multipart
    /// API. The status file is removed only after a successful complete.
    pub async fn upload_file(&self, file_path: &Path, key: &str) -> Result<(), UploadError> {
        self.config.validate()?;
        info!(
            file = %file_path.display(),
            bucket = %self.config.bucket,
            key,
            "starting multipart upload"
        );

        self.check_bucket().await?;

        let meta = std::fs::metadata(file_path).map_err(|source| UploadError::FileIo {
            path: file_path.display().to_string(),
            source,
        })?;
        if meta.len() == 0 {
            info!(file = %file_path.display(), "file is empty, skipping upload");
            return Ok(());
        }

        let (source, original) = if self.config.compress {
            let gz = compress::gzip_to_temp(file_path)?;
            (gz, Some(file_path.to_path_buf()))
        } else {
            (file_path.to_path_buf(), None)
        };

        let total_bytes = std::fs::metadata(&source)
            .map_err(|source_err| UploadError::FileIo {
                path: source.display().to_string(),
                source: source_err,
            })?
            .len();
        let mut reporter = Reporter::new(total_bytes).await;

        let chunker = match FileChunker::new(&source, self.config.part_size_bytes()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                reporter.error(format!("create chunker: {e}"), None).await;
                return Err(e.into());
            }
        };
        let parts = chunker.parts();

        let initiated = match self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(e) => {
                reporter
                    .error(format!("initiate multipart: {}", DisplayErrorContext(&e)), None)
                    .await;
                return Err(UploadError::InitiateFailed {
                    source: Box::new(e),
                });
            }
        };
        let upload_id = match initiated.upload_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(UploadError::InitiateFailed {
                    source: "missing upload id in CreateMultipartUpload response".into(),
                })
            }
        };
        info!(upload_id, "initiated multipart upload");

        let status_path = status_file_path(&std::env::temp_dir(), &source, &upload_id);
        let mut status = UploadStatus::new(
            source.display().to_string(),
            &self.config.bucket,
            key,
            &upload_id,
            parts.len(),
            self.config.part_size_bytes(),
        );
        status.original_file_path = original.as_ref().map(|p| p.display().to_string());
        // Persist immediately so a crash before the first part still
        // leaves a resumable record.
        if let Err(e) = status.save(&status_path) {
            warn!(path = %status_path.display(), error = %e, "failed to save initial status file");
        }
        let status = Arc::new(Mutex::new(status));

        reporter
            .session_start(SessionStart {
                bucket: self.config.bucket.clone(),
                key: key.to_string(),
                upload_id: upload_id.clone(),
                part_mb: self.config.part_size_bytes() as f64 / MIB,
                total: total_bytes,
                resumed: None,
                already_bytes: None,
                pre_completed: None,
                total_parts: None,
                part_size_bytes: None,
            })
            .await;
        let _ = self.events_tx.try_send(UploadEvent::SessionStarted {
            upload_id: upload_id.clone(),
            total_bytes,
            total_parts: parts.len(),
            resumed: false,
            already_bytes: 0,
        });

        let result = self
            .drive(
                chunker,
                parts,
                &self.config.bucket,
                key,
                &upload_id,
                status,
                status_path,
                reporter,
            )
            .await;

        if result.is_ok() && original.is_some() {
            if let Err(e) = std::fs::remove_file(&source) {
                warn!(path = %source.display(), error = %e, "failed to remove compressed temp file");
            }
        }
        result
    }

    /// Deletes one object from the configured bucket.
    pub async fn delete_object(&self, key: &str) -> Result<(), UploadError> {
        info!(bucket = %self.config.bucket, key, "deleting object");
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| UploadError::Delete {
                key: key.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Aborts a multipart session on the server.
    pub async fn abort(&self, key: &str, upload_id: &str) -> Result<(), UploadError> {
        info!(key, upload_id, "aborting multipart upload");
        self.client
            .abort_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| UploadError::AbortFailed {
                key: key.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Session internals, shared by upload and resume
    // -----------------------------------------------------------------

    /// Runs the worker pool over `pending`, then completes or aborts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn drive(
        &self,
        chunker: Arc<FileChunker>,
        pending: Vec<Part>,
        bucket: &str,
        key: &str,
        upload_id: &str,
        status: Arc<Mutex<UploadStatus>>,
        status_path: PathBuf,
        reporter: Reporter,
    ) -> Result<(), UploadError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_events(rx, reporter, self.events_tx.clone()));

        let ctx = PoolContext {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            chunker,
            status: Arc::clone(&status),
            status_path: status_path.clone(),
            cancel: self.cancel.clone(),
            tx,
        };
        let pool_result = run_pool(ctx, pending, self.config.max_concurrency).await;

        // All worker senders are gone; the dispatcher drains and returns
        // the reporter for the terminal events.
        let mut reporter = match dispatcher.await {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "event dispatcher task failed");
                None
            }
        };

        match pool_result {
            Ok(()) => {
                let pairs = {
                    let status = status.lock().unwrap();
                    status.completed_pairs()
                };
                info!(key, parts = pairs.len(), "completing multipart upload");
                match self.complete(bucket, key, upload_id, pairs).await {
                    Ok(()) => {
                        if let Some(r) = reporter.as_mut() {
                            r.session_done(true, upload_id).await;
                        }
                        let _ = self
                            .events_tx
                            .try_send(UploadEvent::SessionCompleted { success: true });
                        if let Err(e) = std::fs::remove_file(&status_path) {
                            warn!(path = %status_path.display(), error = %e, "failed to remove status file");
                        }
                        info!(key, upload_id, "multipart upload completed");
                        Ok(())
                    }
                    Err(source) => {
                        // Keep the status file: the operator may resume, and
                        // a stale session surfaces as StatusStale there.
                        self.abort_quietly(key, upload_id).await;
                        if let Some(r) = reporter.as_mut() {
                            r.error(format!("complete multipart: {source}"), None).await;
                            r.session_done(false, upload_id).await;
                        }
                        let _ = self
                            .events_tx
                            .try_send(UploadEvent::SessionCompleted { success: false });
                        Err(UploadError::CompleteFailed { source })
                    }
                }
            }
            Err(e) => {
                self.abort_quietly(key, upload_id).await;
                if let Some(r) = reporter.as_mut() {
                    r.session_done(false, upload_id).await;
                }
                let _ = self
                    .events_tx
                    .try_send(UploadEvent::SessionCompleted { success: false });
                Err(e)
            }
        }
    }

    /// HEAD the bucket and map the provider's answer onto the error model.
    pub(crate) async fn check_bucket(&self) -> Result<(), UploadError> {
        let bucket = self.config.bucket.clone();
        let err = match self.client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        if err
            .as_service_error()
            .is_some_and(|svc| svc.is_not_found())
        {
            return Err(UploadError::BucketMissing(bucket));
        }
        match err.code() {
            Some("NotFound") | Some("NoSuchBucket") => Err(UploadError::BucketMissing(bucket)),
            Some("Forbidden") | Some("AccessDenied") => Err(UploadError::BucketForbidden(bucket)),
            _ => {
                // HEAD answers often carry no body; fall back to the status.
                match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(404) => Err(UploadError::BucketMissing(bucket)),
                    Some(403) => Err(UploadError::BucketForbidden(bucket)),
                    _ => Err(UploadError::BucketProbe {
                        bucket,
                        source: Box::new(err),
                    }),
                }
            }
        }
    }

    /// Sorts the pairs ascending and calls CompleteMultipartUpload.
    /// Never retried: a transient failure here is treated as fatal to
    /// protect against the double-complete race.
    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        pairs: Vec<(i32, String)>,
    ) -> Result<(), crate::error::BoxError> {
        let completed: Vec<CompletedPart> = sorted_completed_parts(pairs)
            .into_iter()
            .map(|(part, etag)| {
                CompletedPart::builder()
                    .part_number(part)
                    .e_tag(etag)
                    .build()
            })
            .collect();
        let multipart = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart)
            .send()
            .await
            .map_err(|e| -> crate::error::BoxError { Box::new(e) })?;
        Ok(())
    }

    /// Best-effort abort: a cleanup failure is logged, never surfaced, so
    /// it cannot mask the error that triggered it.
    async fn abort_quietly(&self, key: &str, upload_id: &str) {
        if let Err(e) = self.abort(key, upload_id).await {
            warn!(key, upload_id, error = %e, "abort failed");
        }
    }
}

/// Everything a part worker needs, cloned per worker.
#[derive(Clone)]
struct PoolContext {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    chunker: Arc<FileChunker>,
    status: Arc<Mutex<UploadStatus>>,
    status_path: PathBuf,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<UploadEvent>,
}

/// Spawns up to `max_concurrency` workers over a shared part queue and
/// joins them, preferring a real failure over `Cancelled` as the verdict.
async fn run_pool(
    ctx: PoolContext,
    pending: Vec<Part>,
    max_concurrency: usize,
) -> Result<(), UploadError> {
    if pending.is_empty() {
        return Ok(());
    }

    let workers = max_concurrency.max(1).min(pending.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(pending)));

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let ctx = ctx.clone();
        let queue = Arc::clone(&queue);
        set.spawn(worker_loop(ctx, queue));
    }
    drop(ctx);

    let mut first_err: Option<UploadError> = None;
    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(r) => r,
            Err(e) => Err(UploadError::Worker { source: Box::new(e) }),
        };
        if let Err(e) = outcome {
            prefer_error(&mut first_err, e);
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Records the session verdict: the first real error wins over `Cancelled`.
fn prefer_error(slot: &mut Option<UploadError>, e: UploadError) {
    let incoming_cancelled = matches!(e, UploadError::Cancelled);
    let replace = match slot {
        None => true,
        Some(UploadError::Cancelled) => !incoming_cancelled,
        Some(_) => false,
    };
    if replace {
        *slot = Some(e);
    }
}

async fn worker_loop(
    ctx: PoolContext,
    queue: Arc<Mutex<VecDeque<Part>>>,
) -> Result<(), UploadError> {
    loop {
        if ctx.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let part = {
            let mut q = queue.lock().unwrap();
            q.pop_front()
        };
        let Some(part) = part else {
            return Ok(());
        };
        if let Err(e) = upload_one_part(&ctx, &part).await {
            ctx.cancel.cancel();
            return Err(e);
        }
    }
}

/// Uploads one part with retries, then persists it into the status file.
async fn upload_one_part(ctx: &PoolContext, part: &Part) -> Result<(), UploadError> {
    let reader = ctx.chunker.open_part(part)?;
    let delta_tx = ctx.tx.clone();
    let part_no = part.index;
    let mut wrapped = ProgressReader::new(reader, move |n| {
        let _ = delta_tx.send(UploadEvent::Progress {
            part: part_no,
            bytes: n,
        });
    });

    let _ = ctx.tx.send(UploadEvent::PartStarted {
        part: part.index,
        size: part.size,
        offset: part.offset,
    });
    info!(
        part = part.index,
        offset = part.offset,
        size = part.size,
        "uploading part"
    );

    let mut attempt = 0u32;
    let output = loop {
        attempt += 1;

        // Rewind and re-read the window; bytes the wrapper has already
        // reported are not reported again.
        let expected = part.size;
        let source_path = ctx.chunker.path().to_path_buf();
        let (returned, read_result) = tokio::task::spawn_blocking(move || {
            let result = read_window(&mut wrapped, expected);
            (wrapped, result)
        })
        .await
        .map_err(|e| UploadError::Worker { source: Box::new(e) })?;
        wrapped = returned;
        let body = read_result.map_err(|source| UploadError::FileIo {
            path: source_path.display().to_string(),
            source,
        })?;

        let send = ctx
            .client
            .upload_part()
            .bucket(&ctx.bucket)
            .key(&ctx.key)
            .upload_id(&ctx.upload_id)
            .part_number(part.index)
            .content_length(part.size as i64)
            .body(ByteStream::from(body))
            .send();

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
            result = send => result,
        };

        match result {
            Ok(out) => break out,
            Err(e) if attempt < UPLOAD_RETRY_ATTEMPTS && is_transient(&e) => {
                warn!(
                    part = part.index,
                    attempt,
                    error = %DisplayErrorContext(&e),
                    "part upload failed, retrying"
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
                    _ = tokio::time::sleep(UPLOAD_RETRY_BASE * attempt) => {}
                }
            }
            Err(e) => {
                let message = format!(
                    "upload part {} failed after {attempt} attempt(s): {}",
                    part.index,
                    DisplayErrorContext(&e)
                );
                let _ = ctx.tx.send(UploadEvent::PartFailed {
                    part: part.index,
                    message,
                });
                return Err(UploadError::PartUpload {
                    part: part.index,
                    source: Box::new(e),
                });
            }
        }
    };

    let Some(etag) = output.e_tag().map(str::to_string) else {
        let _ = ctx.tx.send(UploadEvent::PartFailed {
            part: part.index,
            message: format!("server returned no etag for part {}", part.index),
        });
        return Err(UploadError::NilETag { part: part.index });
    };

    {
        let mut status = ctx.status.lock().unwrap();
        status.add_completed_part(part.index, etag.clone());
        if let Err(e) = status.save(&ctx.status_path) {
            warn!(part = part.index, error = %e, "failed to save status file");
        }
    }
    info!(part = part.index, etag = %etag, "part uploaded");
    let _ = ctx.tx.send(UploadEvent::PartCompleted {
        part: part.index,
        size: part.size,
        etag,
    });
    Ok(())
}

/// Reads the full part window from offset zero, in slices small enough
/// that the progress wrapper emits usable deltas along the way.
fn read_window<R: Read + Seek>(reader: &mut R, expected: u64) -> std::io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(expected as usize);
    let mut slice = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut slice)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&slice[..n]);
    }
    if buf.len() as u64 != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("part window expected {expected} bytes, read {}", buf.len()),
        ));
    }
    Ok(buf)
}

/// Single owner of the wire reporter: maps engine events onto it and
/// forwards them to any front-end subscriber.
async fn dispatch_events(
    mut rx: mpsc::UnboundedReceiver<UploadEvent>,
    mut reporter: Reporter,
    forward: mpsc::Sender<UploadEvent>,
) -> Reporter {
    while let Some(event) = rx.recv().await {
        match &event {
            UploadEvent::PartStarted { part, size, offset } => {
                reporter.part_start(*part, *size, *offset).await;
            }
            UploadEvent::Progress { part, bytes } => {
                reporter.total_progress_add(*bytes).await;
                reporter.part_progress_add(*part, *bytes).await;
            }
            UploadEvent::PartCompleted { part, size, etag } => {
                reporter.part_done(*part, *size, etag).await;
            }
            UploadEvent::PartFailed { part, message } => {
                reporter.error(message.clone(), Some(*part)).await;
            }
            _ => {}
        }
        let _ = forward.try_send(event);
    }
    reporter
}

/// Ascending part order, as CompleteMultipartUpload requires.
fn sorted_completed_parts(mut pairs: Vec<(i32, String)>) -> Vec<(i32, String)> {
    pairs.sort_by_key(|(part, _)| *part);
    pairs
}
