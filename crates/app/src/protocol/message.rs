//! Wire messages of the hub's real-time API.
//!
//! Every frame is a UTF-8 JSON object whose `type` field selects the variant.
//! The `auth` message is the only outbound message without an `id`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use homedash_domain::entity::Entity;

/// Event type the client subscribes to.
pub const STATE_CHANGED: &str = "state_changed";

/// Access token that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Auth {
        access_token: AccessToken,
    },
    GetStates {
        id: u64,
    },
    SubscribeEvents {
        id: u64,
        event_type: String,
    },
    CallService {
        id: u64,
        domain: String,
        service: String,
        service_data: Map<String, Value>,
    },
}

impl OutboundMessage {
    /// Correlation id, absent only for `auth`.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Auth { .. } => None,
            Self::GetStates { id }
            | Self::SubscribeEvents { id, .. }
            | Self::CallService { id, .. } => Some(*id),
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Propagates the `serde_json` error; in practice these shapes always encode.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages received from the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AuthRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Event {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        event: EventPayload,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorPayload>,
    },
    Pong {
        id: u64,
    },
    /// Any message type this client does not act on.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the frame is not a JSON object of
    /// a known shape.
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Event { .. } => "event",
            Self::Result { .. } => "result",
            Self::Pong { .. } => "pong",
            Self::Unknown => "unknown",
        }
    }
}

/// Body of an `event` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// `data` of a `state_changed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<Entity>,
    #[serde(default)]
    pub old_state: Option<Value>,
}

/// `error` of a failed `result` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_encode_auth_without_id() {
        let msg = OutboundMessage::Auth {
            access_token: AccessToken::new("T"),
        };
        let value: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "auth", "access_token": "T"}));
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn should_encode_call_service_with_id() {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), json!("lock.front_door"));
        let msg = OutboundMessage::CallService {
            id: 7,
            domain: "lock".to_string(),
            service: "unlock".to_string(),
            service_data: data,
        };
        let value: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "call_service",
                "id": 7,
                "domain": "lock",
                "service": "unlock",
                "service_data": {"entity_id": "lock.front_door"}
            })
        );
    }

    #[test]
    fn should_redact_token_in_debug() {
        let msg = OutboundMessage::Auth {
            access_token: AccessToken::new("super-secret"),
        };
        assert!(!format!("{msg:?}").contains("super-secret"));
    }

    #[test]
    fn should_decode_state_changed_event() {
        let frame = r#"{
            "type": "event",
            "id": 2,
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "light.kitchen",
                    "new_state": {"entity_id": "light.kitchen", "state": "off"},
                    "old_state": {"entity_id": "light.kitchen", "state": "on"}
                }
            }
        }"#;
        let InboundMessage::Event { event, .. } = InboundMessage::from_frame(frame).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.event_type, STATE_CHANGED);
        let data: StateChangedData = serde_json::from_value(event.data).unwrap();
        assert_eq!(data.new_state.unwrap().state.as_str(), "off");
    }

    #[test]
    fn should_decode_failed_result() {
        let frame = r#"{"type": "result", "id": 3, "success": false,
            "error": {"code": "not_found", "message": "Service not found."}}"#;
        let msg = InboundMessage::from_frame(frame).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Result {
                id: 3,
                success: false,
                result: None,
                error: Some(ErrorPayload {
                    code: "not_found".to_string(),
                    message: "Service not found.".to_string(),
                }),
            }
        );
    }

    #[test]
    fn should_map_unknown_types_to_unknown() {
        let msg = InboundMessage::from_frame(r#"{"type": "supported_features"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn should_reject_frames_that_are_not_json_objects() {
        assert!(InboundMessage::from_frame("not json").is_err());
        assert!(InboundMessage::from_frame(r#"{"no_type": true}"#).is_err());
    }
}
