//! Wire protocol for the bidirectional event channel.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. Inbound frames are decoded in two
//! steps: first the [`InboundFrame`] envelope, then the payload for the
//! named event, so that an unknown event name and a bad payload can be told
//! apart. Outbound frames are the [`OutboundEvent`] enum, adjacently tagged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventError;
use crate::types::{ChatMessage, SystemNotice, TypingSignal, UserRecord};

/// Inbound `join` event name.
pub const EVENT_JOIN: &str = "join";
/// Inbound `send-message` event name.
pub const EVENT_SEND_MESSAGE: &str = "send-message";
/// Inbound and outbound `typing-start` event name.
pub const EVENT_TYPING_START: &str = "typing-start";
/// Inbound and outbound `typing-stop` event name.
pub const EVENT_TYPING_STOP: &str = "typing-stop";

/// Envelope of a client → server frame.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct InboundFrame {
    /// Event name used to pick the handler.
    pub event: String,
    /// Event payload; decoded by the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl InboundFrame {
    /// Decode the envelope of a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, EventError> {
        serde_json::from_str(raw).map_err(|e| EventError::MalformedEvent {
            event: "unknown".into(),
            reason: e.to_string(),
        })
    }

    /// Decode the payload into the params type for this event.
    ///
    /// A missing `data` field decodes as an empty object, so events whose
    /// params are all optional accept a bare envelope.
    pub fn params<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventError> {
        let data = self
            .data
            .clone()
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(data).map_err(|e| EventError::MalformedEvent {
            event: self.event.clone(),
            reason: e.to_string(),
        })
    }
}

/// Payload of `join`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    /// Requested display name, untrimmed.
    #[serde(alias = "username")]
    pub display_name: String,
}

/// Payload of `send-message`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SendMessageParams {
    /// Message body.
    pub content: String,
}

/// Payload of `typing-start` / `typing-stop`. The sender is resolved
/// server-side, so any client-supplied fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TypingParams {}

/// Reason carried by `join-rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Empty or whitespace-only display name.
    InvalidName,
    /// Display name held by another online user.
    NameConflict,
}

/// Server → client event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Full online-user list after a membership change.
    PresenceSnapshot {
        /// Online users in join order.
        users: Vec<UserRecord>,
    },
    /// A user joined (sent to everyone but the joiner).
    SystemJoinNotice(SystemNotice),
    /// A user left (sent to everyone remaining).
    SystemLeaveNotice(SystemNotice),
    /// A chat message (sent to everyone, sender included).
    Message(ChatMessage),
    /// Someone started typing (sent to everyone but the typist).
    TypingStart(TypingSignal),
    /// Someone stopped typing (sent to everyone but the typist).
    TypingStop(TypingSignal),
    /// The join was refused (sent to the joiner only).
    JoinRejected {
        /// Machine-readable reason.
        reason: RejectReason,
        /// Human-readable explanation.
        message: String,
    },
}

impl OutboundEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PresenceSnapshot { .. } => "presence-snapshot",
            Self::SystemJoinNotice(_) => "system-join-notice",
            Self::SystemLeaveNotice(_) => "system-leave-notice",
            Self::Message(_) => "message",
            Self::TypingStart(_) => EVENT_TYPING_START,
            Self::TypingStop(_) => EVENT_TYPING_STOP,
            Self::JoinRejected { .. } => "join-rejected",
        }
    }

    /// Serialize to the JSON text sent over the channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JoinError;
    use crate::ids::ConnectionId;
    use assert_matches::assert_matches;
    use insta::assert_json_snapshot;

    #[test]
    fn parse_join_frame() {
        let frame = InboundFrame::parse(r#"{"event":"join","data":{"displayName":" Ann "}}"#)
            .unwrap();
        assert_eq!(frame.event, EVENT_JOIN);
        let params: JoinParams = frame.params().unwrap();
        assert_eq!(params.display_name, " Ann ");
    }

    #[test]
    fn join_accepts_username_alias() {
        let frame = InboundFrame::parse(r#"{"event":"join","data":{"username":"Bo"}}"#).unwrap();
        let params: JoinParams = frame.params().unwrap();
        assert_eq!(params.display_name, "Bo");
    }

    #[test]
    fn typing_frame_without_data() {
        let frame = InboundFrame::parse(r#"{"event":"typing-start"}"#).unwrap();
        assert!(frame.data.is_none());
        let _params: TypingParams = frame.params().unwrap();
    }

    #[test]
    fn typing_ignores_client_supplied_name() {
        let frame =
            InboundFrame::parse(r#"{"event":"typing-stop","data":{"username":"spoof"}}"#).unwrap();
        assert!(frame.params::<TypingParams>().is_ok());
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = InboundFrame::parse("not json").unwrap_err();
        assert_matches!(err, EventError::MalformedEvent { ref event, .. } if event == "unknown");
    }

    #[test]
    fn missing_event_field_is_malformed() {
        let err = InboundFrame::parse(r#"{"data":{}}"#).unwrap_err();
        assert_matches!(err, EventError::MalformedEvent { .. });
    }

    #[test]
    fn bad_payload_is_malformed_with_event_name() {
        let frame = InboundFrame::parse(r#"{"event":"send-message","data":{"text":1}}"#).unwrap();
        let err = frame.params::<SendMessageParams>().unwrap_err();
        assert_matches!(err, EventError::MalformedEvent { ref event, .. } if event == "send-message");
    }

    #[test]
    fn null_data_treated_as_empty() {
        let frame = InboundFrame::parse(r#"{"event":"join","data":null}"#).unwrap();
        assert!(frame.params::<JoinParams>().is_err());
        assert!(frame.params::<TypingParams>().is_ok());
    }

    #[test]
    fn event_names_match_wire_tags() {
        let events = [
            OutboundEvent::PresenceSnapshot { users: vec![] },
            OutboundEvent::SystemJoinNotice(SystemNotice::joined("a")),
            OutboundEvent::SystemLeaveNotice(SystemNotice::left("a")),
            OutboundEvent::Message(ChatMessage::user("a", "b")),
            OutboundEvent::TypingStart(TypingSignal {
                sender_name: "a".into(),
            }),
            OutboundEvent::TypingStop(TypingSignal {
                sender_name: "a".into(),
            }),
            OutboundEvent::JoinRejected {
                reason: RejectReason::InvalidName,
                message: JoinError::InvalidName.to_string(),
            },
        ];
        for event in events {
            let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn presence_snapshot_wire_format() {
        let mut record = UserRecord::new(ConnectionId::from("conn_a"), "Ann".into());
        record.joined_at = "2026-01-01T00:00:00Z".parse().unwrap();
        let event = OutboundEvent::PresenceSnapshot {
            users: vec![record],
        };
        assert_json_snapshot!(event, @r#"
        {
          "event": "presence-snapshot",
          "data": {
            "users": [
              {
                "connectionId": "conn_a",
                "displayName": "Ann",
                "joinedAt": "2026-01-01T00:00:00Z"
              }
            ]
          }
        }
        "#);
    }

    #[test]
    fn message_wire_format() {
        let event = OutboundEvent::Message(ChatMessage::user("Ann", "hello"));
        assert_json_snapshot!(event, {
            ".data.id" => "[id]",
            ".data.timestamp" => "[timestamp]",
        }, @r#"
        {
          "event": "message",
          "data": {
            "id": "[id]",
            "senderName": "Ann",
            "content": "hello",
            "timestamp": "[timestamp]",
            "kind": "user"
          }
        }
        "#);
    }

    #[test]
    fn join_rejected_wire_format() {
        let err = JoinError::NameConflict { name: "Ann".into() };
        let event = OutboundEvent::JoinRejected {
            reason: err.reject_reason().unwrap(),
            message: err.to_string(),
        };
        assert_json_snapshot!(event, @r#"
        {
          "event": "join-rejected",
          "data": {
            "reason": "NameConflict",
            "message": "display name 'Ann' is already taken"
          }
        }
        "#);
    }

    #[test]
    fn outbound_round_trips_through_serde() {
        let event = OutboundEvent::SystemLeaveNotice(SystemNotice::left("Bo"));
        let back: OutboundEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(back, event);
    }
}
