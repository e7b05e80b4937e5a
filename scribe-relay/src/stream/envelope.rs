//! Inbound frame classification
//!
//! The stream carries one JSON object per frame. Frames with an event-type
//! field are domain events for the processor; frames without one are
//! connection-level notices (heartbeat acks, subscription status, error
//! reports) that are logged and dropped. Anything unparseable is dropped
//! too; a bad frame must never take the connection manager down.

use serde::Deserialize;
use serde_json::Value;

/// Event type marking a finished cloud recording
pub const RECORDING_COMPLETED: &str = "recording.completed";

/// A decoded domain event
#[derive(Debug, Clone, Deserialize)]
pub struct MeetingEvent {
    /// Event type, e.g. "recording.completed"
    pub event: String,
    /// Event payload, shape depends on the event type
    #[serde(default)]
    pub payload: Value,
}

/// Classification of one inbound frame
#[derive(Debug)]
pub enum FrameKind {
    /// Domain event to forward to the processor
    Event(MeetingEvent),
    /// Connection-level frame; logged and dropped
    Notice(String),
    /// Unparseable frame; logged and dropped
    Malformed(String),
}

/// Classify one raw text frame
pub fn classify_frame(text: &str) -> FrameKind {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return FrameKind::Malformed(e.to_string()),
    };

    if !value.is_object() {
        return FrameKind::Malformed("frame is not a JSON object".to_string());
    }

    match value.get("event").and_then(Value::as_str) {
        Some(event) if !event.is_empty() => FrameKind::Event(MeetingEvent {
            event: event.to_string(),
            payload: value.get("payload").cloned().unwrap_or(Value::Null),
        }),
        _ => FrameKind::Notice(describe_notice(&value)),
    }
}

/// Human-readable tag for a connection-level frame
fn describe_notice(value: &Value) -> String {
    if let Some(module) = value.get("module").and_then(Value::as_str) {
        return module.to_string();
    }
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return format!("error: {}", error);
    }
    let raw = value.to_string();
    if raw.len() > 120 {
        let preview: String = raw.chars().take(120).collect();
        format!("{}...", preview)
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_frame() {
        let frame = r#"{"event":"recording.completed","payload":{"object":{"uuid":"m1"}}}"#;
        match classify_frame(frame) {
            FrameKind::Event(event) => {
                assert_eq!(event.event, RECORDING_COMPLETED);
                assert_eq!(event.payload["object"]["uuid"], "m1");
            }
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn test_event_without_payload() {
        match classify_frame(r#"{"event":"meeting.started"}"#) {
            FrameKind::Event(event) => {
                assert_eq!(event.event, "meeting.started");
                assert!(event.payload.is_null());
            }
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_ack_is_notice() {
        match classify_frame(r#"{"module":"heartbeat","success":true}"#) {
            FrameKind::Notice(tag) => assert_eq!(tag, "heartbeat"),
            other => panic!("Expected Notice, got {:?}", other),
        }
    }

    #[test]
    fn test_error_report_is_notice() {
        match classify_frame(r#"{"error":"subscription expired","success":false}"#) {
            FrameKind::Notice(tag) => assert!(tag.contains("subscription expired")),
            other => panic!("Expected Notice, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_event_field_is_notice() {
        assert!(matches!(
            classify_frame(r#"{"event":""}"#),
            FrameKind::Notice(_)
        ));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            classify_frame("{not json"),
            FrameKind::Malformed(_)
        ));
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(classify_frame("42"), FrameKind::Malformed(_)));
    }
}
