//! Wire types exchanged with the controller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a replica, unique within a test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message identifier, `"<from>_<to>_<n>"` for agent-originated messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A protocol message between two replicas.
///
/// The payload travels as a base64 string. Messages are never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: String,
    pub from: ReplicaId,
    pub to: ReplicaId,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub intercept: bool,
}

/// This agent's registration with the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    pub id: ReplicaId,
    #[serde(default)]
    pub info: Map<String, Value>,
    pub addr: String,
    pub ready: bool,
}

/// Kinds of telemetry the agent reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    MessageSend,
    MessageReceive,
    TimeoutStart,
    TimeoutEnd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageSend => "MessageSend",
            EventType::MessageReceive => "MessageReceive",
            EventType::TimeoutStart => "TimeoutStart",
            EventType::TimeoutEnd => "TimeoutEnd",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped observation posted to the controller's `/event` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub replica: ReplicaId,
    pub params: HashMap<String, String>,
    /// Unix seconds, UTC
    pub timestamp: i64,
}

/// A free-form log line posted to the controller's `/log` route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub replica: ReplicaId,
    pub message: String,
    pub params: Map<String, Value>,
    pub timestamp: i64,
}

/// Body of an inbound `/timeout` call. `timeout_type` is the timer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutFire {
    #[serde(rename = "type")]
    pub timeout_type: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub replica: ReplicaId,
}

/// Body of an inbound `/directive` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveRequest {
    pub action: String,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // `null` is how an empty byte slice is encoded by some controllers
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let message = Message {
            id: "r1_r2_0".into(),
            message_type: "vote".to_string(),
            from: "r1".into(),
            to: "r2".into(),
            data: b"hello".to_vec(),
            intercept: true,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "r1_r2_0",
                "type": "vote",
                "from": "r1",
                "to": "r2",
                "data": "aGVsbG8=",
                "intercept": true,
            })
        );
    }

    #[test]
    fn test_message_from_controller() {
        let message: Message = serde_json::from_value(json!({
            "id": "r2_r1_4",
            "type": "commit",
            "from": "r2",
            "to": "r1",
            "data": null,
        }))
        .unwrap();

        assert_eq!(message.id.as_str(), "r2_r1_4");
        assert!(message.data.is_empty());
        assert!(!message.intercept);
    }

    #[test]
    fn test_message_rejects_bad_payload() {
        let result = serde_json::from_value::<Message>(json!({
            "id": "x",
            "type": "t",
            "from": "a",
            "to": "b",
            "data": "not base64!!",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let event = Event {
            event_type: EventType::TimeoutStart,
            replica: "r1".into(),
            params: HashMap::from([("type".to_string(), "election".to_string())]),
            timestamp: 1_700_000_000,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "TimeoutStart");
        assert_eq!(value["replica"], "r1");
        assert_eq!(value["params"]["type"], "election");
        assert_eq!(value["timestamp"], 1_700_000_000);
    }

    #[test]
    fn test_replica_record_wire_format() {
        let mut info = Map::new();
        info.insert("zone".to_string(), json!("a"));
        let record = ReplicaRecord {
            id: "r1".into(),
            info,
            addr: "10.0.0.1:8001".to_string(),
            ready: false,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "r1", "info": {"zone": "a"}, "addr": "10.0.0.1:8001", "ready": false})
        );
    }

    #[test]
    fn test_timeout_fire_defaults() {
        let fire: TimeoutFire = serde_json::from_str(r#"{"type":"election"}"#).unwrap();
        assert_eq!(fire.timeout_type, "election");
        assert!(fire.duration.is_empty());
        assert!(fire.replica.is_empty());
    }
}
