//! Typed payload bodies for each [`EventKind`](crate::EventKind).
//!
//! Field names match the UI wire format exactly; optional resume fields are
//! omitted (not `null`) when absent.

use serde::{Deserialize, Serialize};

/// Payload of `session_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    /// Part size in MiB (fractional for odd sizes).
    #[serde(rename = "partMB")]
    pub part_mb: f64,
    /// Total bytes in the session.
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed: Option<bool>,
    #[serde(rename = "alreadyBytes", skip_serializing_if = "Option::is_none")]
    pub already_bytes: Option<u64>,
    #[serde(rename = "preCompleted", skip_serializing_if = "Option::is_none")]
    pub pre_completed: Option<Vec<PreCompletedPart>>,
    #[serde(rename = "totalParts", skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<usize>,
    #[serde(rename = "partSizeBytes", skip_serializing_if = "Option::is_none")]
    pub part_size_bytes: Option<u64>,
}

/// A part that was already on the server when a session resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreCompletedPart {
    pub part: i32,
    pub size: u64,
    pub etag: String,
}

/// Payload of `total_progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalProgress {
    pub bytes: u64,
    pub total: u64,
    pub percent: f64,
    pub bps: f64,
}

/// Payload of `part_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartStart {
    pub part: i32,
    pub size: u64,
    pub offset: u64,
}

/// Payload of `part_progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartProgress {
    pub part: i32,
    pub sent: u64,
    pub size: u64,
    pub percent: f64,
    pub bps: f64,
}

/// Payload of `part_done`. The etag is carried verbatim, quotes included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartDone {
    pub part: i32,
    pub size: u64,
    pub etag: String,
}

/// Payload of `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<i32>,
}

/// Payload of `session_done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDone {
    pub success: bool,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    /// Human-readable elapsed time, e.g. `"12.345s"`.
    pub duration: String,
    pub bytes: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_start_omits_resume_fields() {
        let p = SessionStart {
            bucket: "b".into(),
            key: "k".into(),
            upload_id: "u".into(),
            part_mb: 8.0,
            total: 100,
            resumed: None,
            already_bytes: None,
            pre_completed: None,
            total_parts: None,
            part_size_bytes: None,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("resumed"));
        assert!(!json.contains("alreadyBytes"));
        assert!(!json.contains("preCompleted"));
    }

    #[test]
    fn session_start_resume_fields_camel_case() {
        let p = SessionStart {
            bucket: "b".into(),
            key: "k".into(),
            upload_id: "u".into(),
            part_mb: 5.0,
            total: 100,
            resumed: Some(true),
            already_bytes: Some(40),
            pre_completed: Some(vec![PreCompletedPart {
                part: 1,
                size: 40,
                etag: "\"x\"".into(),
            }]),
            total_parts: Some(3),
            part_size_bytes: Some(5 * 1024 * 1024),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"uploadId\":\"u\""));
        assert!(json.contains("\"partMB\":5.0"));
        assert!(json.contains("\"alreadyBytes\":40"));
        assert!(json.contains("\"preCompleted\""));
        assert!(json.contains("\"totalParts\":3"));
        assert!(json.contains("\"partSizeBytes\":5242880"));
    }

    #[test]
    fn error_event_part_omitted_when_none() {
        let e = ErrorEvent {
            message: "boom".into(),
            part: None,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);
    }

    #[test]
    fn part_done_preserves_etag_quotes() {
        let p = PartDone {
            part: 1,
            size: 10,
            etag: "\"d41d8cd98f\"".into(),
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: PartDone = serde_json::from_str(&json).unwrap();
        assert_eq!(back.etag, "\"d41d8cd98f\"");
    }
}
