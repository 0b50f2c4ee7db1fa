use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};

use favus_chunker::ChunkError;
use favus_status::StatusError;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong during an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("bucket {0} does not exist")]
    BucketMissing(String),

    #[error("bucket {0} exists but access is denied")]
    BucketForbidden(String),

    #[error("failed to check bucket {bucket}: {source}")]
    BucketProbe {
        bucket: String,
        #[source]
        source: BoxError,
    },

    #[error("I/O error on {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("total parts mismatch: status records {expected} but the file now yields {actual}")]
    StatusMismatch { expected: usize, actual: usize },

    #[error("upload session is stale: {0}")]
    StatusStale(String),

    #[error("server returned no etag for part {part}")]
    NilETag { part: i32 },

    #[error("failed to initiate multipart upload: {source}")]
    InitiateFailed {
        #[source]
        source: BoxError,
    },

    #[error("failed to upload part {part}: {source}")]
    PartUpload {
        part: i32,
        #[source]
        source: BoxError,
    },

    #[error("failed to complete multipart upload: {source}")]
    CompleteFailed {
        #[source]
        source: BoxError,
    },

    #[error("failed to abort multipart upload for {key}: {source}")]
    AbortFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to list parts: {source}")]
    ListParts {
        #[source]
        source: BoxError,
    },

    #[error("failed to list multipart uploads: {source}")]
    ListUploads {
        #[source]
        source: BoxError,
    },

    #[error("failed to list objects: {source}")]
    ListObjects {
        #[source]
        source: BoxError,
    },

    #[error("failed to delete object {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("worker task failed: {source}")]
    Worker {
        #[source]
        source: BoxError,
    },

    #[error("upload cancelled")]
    Cancelled,
}

/// True when an SDK error is worth retrying: connection-level failures,
/// timeouts, and throttling/5xx service codes.
pub(crate) fn is_transient<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => is_transient_code(err.code()),
        _ => false,
    }
}

/// Service-code half of the retry decision. 4xx auth/validation codes are
/// fatal; throttling and server-side failures are not.
pub(crate) fn is_transient_code(code: Option<&str>) -> bool {
    matches!(
        code,
        Some(
            "SlowDown"
                | "RequestTimeout"
                | "RequestTimeoutException"
                | "InternalError"
                | "ServiceUnavailable"
                | "Throttling"
                | "ThrottlingException"
                | "TooManyRequestsException"
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_codes_are_transient() {
        for code in [
            "SlowDown",
            "RequestTimeout",
            "InternalError",
            "ServiceUnavailable",
            "Throttling",
            "ThrottlingException",
        ] {
            assert!(is_transient_code(Some(code)), "{code} should be transient");
        }
    }

    #[test]
    fn auth_and_validation_codes_are_fatal() {
        for code in [
            "AccessDenied",
            "InvalidAccessKeyId",
            "SignatureDoesNotMatch",
            "NoSuchUpload",
            "InvalidPart",
            "EntityTooSmall",
        ] {
            assert!(!is_transient_code(Some(code)), "{code} should be fatal");
        }
        assert!(!is_transient_code(None));
    }

    #[test]
    fn error_messages_name_the_subject() {
        let e = UploadError::BucketMissing("b".into());
        assert_eq!(e.to_string(), "bucket b does not exist");

        let e = UploadError::StatusMismatch {
            expected: 3,
            actual: 4,
        };
        assert!(e.to_string().contains("3"));
        assert!(e.to_string().contains("4"));

        let e = UploadError::NilETag { part: 2 };
        assert!(e.to_string().contains("part 2"));
    }
}
