//! Event records relayed from the voice pipeline to the companion UI.

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Payload sent to a subscriber when its stream is established.
pub const CONNECTED_PAYLOAD: &str = "Connected to Huggsy";

/// Kind of event carried by a record.
///
/// Unknown kinds are preserved verbatim so newer producers can introduce
/// kinds without a relay upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    UserSpeech,
    AiResponse,
    AiEmotion,
    Connected,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::UserSpeech => "user_speech",
            EventKind::AiResponse => "ai_response",
            EventKind::AiEmotion => "ai_emotion",
            EventKind::Connected => "connected",
            EventKind::Other(kind) => kind,
        }
    }

    /// Short label used in the operational log.
    pub fn log_label(&self) -> &str {
        match self {
            EventKind::UserSpeech => "USER",
            EventKind::AiResponse => "AI",
            EventKind::AiEmotion => "EMOTION",
            other => other.as_str(),
        }
    }
}

impl From<String> for EventKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "user_speech" => EventKind::UserSpeech,
            "ai_response" => EventKind::AiResponse,
            "ai_emotion" => EventKind::AiEmotion,
            "connected" => EventKind::Connected,
            _ => EventKind::Other(kind),
        }
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        EventKind::from(kind.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single relayed event.
///
/// `event` and `message` are accepted as aliases when reading, matching the
/// field names older producers and history files use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(alias = "event")]
    pub kind: EventKind,
    #[serde(alias = "message")]
    pub payload: String,
    #[serde(default)]
    pub timestamp: String,
}

impl EventRecord {
    /// Build a record stamped with the current local wall-clock time.
    pub fn now(kind: impl Into<EventKind>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
            timestamp: current_timestamp(),
        }
    }

    /// The synthetic record that opens every live stream.
    pub fn connected() -> Self {
        Self::now(EventKind::Connected, CONNECTED_PAYLOAD)
    }

    /// Render the record the way it appears in the operational log.
    pub fn transcript_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp,
            self.kind.log_label(),
            self.payload
        )
    }
}

/// Human-readable `HH:MM:SS` local time.
pub fn current_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_kinds_serialize_as_snake_case() {
        let record = EventRecord {
            kind: EventKind::AiEmotion,
            payload: "happy".to_string(),
            timestamp: "10:00:00".to_string(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"kind": "ai_emotion", "payload": "happy", "timestamp": "10:00:00"})
        );
    }

    #[test]
    fn unknown_kind_round_trips_verbatim() {
        let value = json!({"kind": "battery_low", "payload": "12%", "timestamp": "09:15:02"});

        let record: EventRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(record.kind, EventKind::Other("battery_low".to_string()));
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let record: EventRecord = serde_json::from_value(json!({
            "event": "user_speech",
            "message": "hi",
            "timestamp": "08:00:01"
        }))
        .unwrap();

        assert_eq!(record.kind, EventKind::UserSpeech);
        assert_eq!(record.payload, "hi");
    }

    #[test]
    fn missing_timestamp_defaults_to_empty() {
        let record: EventRecord =
            serde_json::from_value(json!({"kind": "connected", "payload": "x"})).unwrap();
        assert_eq!(record.timestamp, "");
    }

    #[test]
    fn timestamp_is_clock_time() {
        let ts = current_timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[5], b':');
    }

    #[test]
    fn transcript_line_uses_short_labels() {
        let mut record = EventRecord::now("ai_response", "hello");
        record.timestamp = "12:00:00".to_string();
        assert_eq!(record.transcript_line(), "[12:00:00] AI: hello");

        record.kind = EventKind::from("battery_low");
        assert_eq!(record.transcript_line(), "[12:00:00] battery_low: hello");
    }
}
