//! The envelope wrapping every message exchanged with the frontend
use serde::{Deserialize, Serialize};

use crate::{events::Event, requests::RequestBody, responses::Response, types::Seq};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseMessage {
    pub seq: Seq,
    #[serde(flatten)]
    pub message: Sendable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Sendable {
    Request(RequestBody),
    Response(Response),
    Event(Event),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_deserialization() {
        let raw = serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "initialize",
            "arguments": {"adapterID": "rdbg", "linesStartAt1": true},
        });

        let message: BaseMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(message.seq, 1);
        assert!(matches!(
            message.message,
            Sendable::Request(RequestBody::Initialize(_))
        ));
    }

    #[test]
    fn event_envelope_serialization() {
        let message = BaseMessage {
            seq: 12,
            message: Sendable::Event(Event::Initialized),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["seq"], 12);
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "initialized");
    }
}
