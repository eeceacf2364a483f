use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a backend-managed account ("context").
///
/// Contexts are never declared up front: an id first shows up either on an
/// incoming event or when a caller asks for that context's emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl ContextId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ContextId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend event, tagged by its `type` field.
///
/// Only the tag is interpreted; the remaining fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Result payload of `get_next_event`: an event paired with its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "contextId")]
    pub context_id: ContextId,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(context_id: impl Into<ContextId>, event: Event) -> Self {
        Self {
            context_id: context_id.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let json = r#"{"contextId":3,"event":{"type":"Info","msg":"connected"}}"#;
        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.context_id, ContextId(3));
        assert_eq!(envelope.event.kind(), "Info");
        assert_eq!(envelope.event.get("msg"), Some(&Value::from("connected")));
        assert!(envelope.event.get("type").is_none());
    }

    #[test]
    fn test_event_serializes_tag_alongside_fields() {
        let event = Event::new("IncomingMsg")
            .with_field("chatId", 12)
            .with_field("msgId", 99);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "IncomingMsg");
        assert_eq!(value["chatId"], 12);
        assert_eq!(value["msgId"], 99);
    }

    #[test]
    fn test_event_without_tag_is_rejected() {
        let json = r#"{"contextId":1,"event":{"msg":"no tag"}}"#;
        assert!(serde_json::from_str::<EventEnvelope>(json).is_err());
    }

    #[test]
    fn test_negative_context_id_is_rejected() {
        let json = r#"{"contextId":-1,"event":{"type":"Info"}}"#;
        assert!(serde_json::from_str::<EventEnvelope>(json).is_err());
    }

    #[test]
    fn test_context_id_display() {
        assert_eq!(ContextId(42).to_string(), "42");
        assert_eq!(ContextId::from(7u32).as_u32(), 7);
    }
}
