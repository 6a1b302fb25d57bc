//! Data model: online users and the messages fanned out between them.
//!
//! Nothing here is persisted. A [`UserRecord`] lives exactly as long as its
//! connection; messages and notices are immutable once built and are dropped
//! after broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, MessageId};

/// One identified (joined) connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Owning connection.
    pub connection_id: ConnectionId,
    /// Trimmed, non-empty, unique among online users at join time.
    pub display_name: String,
    /// When the join was accepted.
    pub joined_at: DateTime<Utc>,
}

impl UserRecord {
    /// Build a record stamped with the current time.
    pub fn new(connection_id: ConnectionId, display_name: String) -> Self {
        Self {
            connection_id,
            display_name,
            joined_at: Utc::now(),
        }
    }
}

/// Origin of a chat-stream entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Authored by a user.
    User,
    /// Generated by the server (join/leave).
    System,
}

/// A user-authored message, echoed to every connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned ID.
    pub id: MessageId,
    /// Registered display name of the sender.
    pub sender_name: String,
    /// Message body, relayed verbatim.
    pub content: String,
    /// Server-assigned emission time.
    pub timestamp: DateTime<Utc>,
    /// Always [`MessageKind::User`].
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Build a user message with a fresh ID and timestamp.
    pub fn user(sender_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender_name: sender_name.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::User,
        }
    }
}

/// Server-generated join/leave notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotice {
    /// The user who joined or left.
    pub display_name: String,
    /// Human-readable text.
    pub text: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Always [`MessageKind::System`].
    pub kind: MessageKind,
}

impl SystemNotice {
    /// `"<name> joined the chat"`.
    pub fn joined(display_name: &str) -> Self {
        Self::new(display_name, format!("{display_name} joined the chat"))
    }

    /// `"<name> left the chat"`.
    pub fn left(display_name: &str) -> Self {
        Self::new(display_name, format!("{display_name} left the chat"))
    }

    fn new(display_name: &str, text: String) -> Self {
        Self {
            display_name: display_name.to_owned(),
            text,
            timestamp: Utc::now(),
            kind: MessageKind::System,
        }
    }
}

/// Ephemeral typing indicator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    /// Registered display name of the typist.
    pub sender_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_serializes_camel_case() {
        let record = UserRecord::new(ConnectionId::from("conn_1"), "Ann".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["connectionId"], "conn_1");
        assert_eq!(json["displayName"], "Ann");
        assert!(json["joinedAt"].is_string());
    }

    #[test]
    fn chat_message_gets_fresh_ids() {
        let a = ChatMessage::user("Ann", "hi");
        let b = ChatMessage::user("Ann", "hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, MessageKind::User);
    }

    #[test]
    fn chat_message_wire_shape() {
        let msg = ChatMessage::user("Ann", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderName"], "Ann");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["kind"], "user");
        assert!(json["id"].as_str().unwrap().starts_with("msg_"));
    }

    #[test]
    fn system_notice_text() {
        let joined = SystemNotice::joined("Bo");
        assert_eq!(joined.text, "Bo joined the chat");
        assert_eq!(joined.kind, MessageKind::System);
        let left = SystemNotice::left("Bo");
        assert_eq!(left.text, "Bo left the chat");
        assert_eq!(left.display_name, "Bo");
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let notice = SystemNotice::joined("Ann");
        let json = serde_json::to_value(&notice).unwrap();
        let raw = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(raw).is_ok());
    }
}
