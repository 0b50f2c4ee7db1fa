use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind discriminator carried in an [`Event`]'s `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "session_start")]
    SessionStart,
    #[serde(rename = "total_progress")]
    TotalProgress,
    #[serde(rename = "part_start")]
    PartStart,
    #[serde(rename = "part_progress")]
    PartProgress,
    #[serde(rename = "part_done")]
    PartDone,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "session_done")]
    SessionDone,

    /// Forward compatibility: unknown event types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Envelope for every event posted to the bridge agent.
///
/// The `payload` field uses `serde_json::value::RawValue` so the agent can
/// forward bodies verbatim without re-encoding them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub ts: DateTime<Utc>,
    pub payload: Box<serde_json::value::RawValue>,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new<T: Serialize>(
        kind: EventKind,
        run_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(payload)?;
        Ok(Self {
            kind,
            run_id: run_id.into(),
            ts: Utc::now(),
            payload: serde_json::value::RawValue::from_string(json)?,
        })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.payload.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::PartDone;

    #[test]
    fn kind_serialization() {
        assert_eq!(
            serde_json::to_string(&EventKind::SessionStart).unwrap(),
            "\"session_start\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::PartDone).unwrap(),
            "\"part_done\""
        );
    }

    #[test]
    fn unknown_kind_deserializes() {
        let kind: EventKind = serde_json::from_str("\"some_future_event\"").unwrap();
        assert_eq!(kind, EventKind::Unknown);
    }

    #[test]
    fn event_wire_field_names() {
        let payload = PartDone {
            part: 3,
            size: 1024,
            etag: "\"abc\"".into(),
        };
        let ev = Event::new(EventKind::PartDone, "run-1", &payload).unwrap();
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"part_done\""));
        assert!(json.contains("\"runId\":\"run-1\""));
        assert!(json.contains("\"ts\":"));
        assert!(json.contains("\"payload\":"));
    }

    #[test]
    fn event_payload_roundtrip() {
        let payload = PartDone {
            part: 7,
            size: 42,
            etag: "\"e\"".into(),
        };
        let ev = Event::new(EventKind::PartDone, "r", &payload).unwrap();
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        let parsed: PartDone = back.parse_payload().unwrap();
        assert_eq!(parsed.part, 7);
        assert_eq!(parsed.etag, "\"e\"");
    }
}
