//! Error taxonomy for the relay.
//!
//! - [`JoinError`]: join-time validation failures. `InvalidName` and
//!   `NameConflict` are the only errors a client ever sees (as a
//!   `join-rejected` event).
//! - [`EventError`]: reasons an inbound event was dropped. These are logged
//!   and counted but never sent to the client and never close the connection.

use thiserror::Error;

use crate::protocol::RejectReason;

/// Why a join (or a pre-join availability check) was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Display name was empty or whitespace-only.
    #[error("display name is required")]
    InvalidName,
    /// Another online user already holds this (trimmed) name.
    #[error("display name '{name}' is already taken")]
    NameConflict {
        /// The trimmed name that collided.
        name: String,
    },
    /// The connection already has an identity.
    #[error("connection has already joined")]
    AlreadyJoined,
}

impl JoinError {
    /// Wire reason for errors reported back to the joining client.
    ///
    /// `AlreadyJoined` has no wire form: a repeated join is dropped.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::InvalidName => Some(RejectReason::InvalidName),
            Self::NameConflict { .. } => Some(RejectReason::NameConflict),
            Self::AlreadyJoined => None,
        }
    }
}

/// Why an inbound event produced no effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The frame or its payload could not be decoded.
    #[error("malformed '{event}' event: {reason}")]
    MalformedEvent {
        /// Event name, or `"unknown"` when the envelope itself was invalid.
        event: String,
        /// Decoder message.
        reason: String,
    },
    /// No handler is registered for this event name.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    /// The sending connection has no registered identity.
    #[error("event from a connection with no registered identity")]
    UnidentifiedSender,
    /// The connection was already detached when the event was processed.
    #[error("event from a closed connection")]
    ConnectionClosed,
    /// A join was refused.
    #[error(transparent)]
    Join(#[from] JoinError),
}

impl EventError {
    /// Short label used for the `reason` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MalformedEvent { .. } => "malformed",
            Self::UnknownEvent(_) => "unknown_event",
            Self::UnidentifiedSender => "unidentified_sender",
            Self::ConnectionClosed => "connection_closed",
            Self::Join(JoinError::AlreadyJoined) => "already_joined",
            Self::Join(_) => "join_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn reject_reason_mapping() {
        assert_eq!(
            JoinError::InvalidName.reject_reason(),
            Some(RejectReason::InvalidName)
        );
        assert_eq!(
            JoinError::NameConflict { name: "Ann".into() }.reject_reason(),
            Some(RejectReason::NameConflict)
        );
        assert_eq!(JoinError::AlreadyJoined.reject_reason(), None);
    }

    #[test]
    fn display_messages() {
        assert_eq!(JoinError::InvalidName.to_string(), "display name is required");
        assert_eq!(
            JoinError::NameConflict { name: "Bo".into() }.to_string(),
            "display name 'Bo' is already taken"
        );
        let err = EventError::MalformedEvent {
            event: "join".into(),
            reason: "missing field".into(),
        };
        assert_eq!(err.to_string(), "malformed 'join' event: missing field");
    }

    #[test]
    fn join_error_converts() {
        let err: EventError = JoinError::AlreadyJoined.into();
        assert_matches!(err, EventError::Join(JoinError::AlreadyJoined));
        assert_eq!(err.label(), "already_joined");
    }

    #[test]
    fn labels_are_snake_case() {
        let errors = [
            EventError::MalformedEvent {
                event: "x".into(),
                reason: "y".into(),
            },
            EventError::UnknownEvent("x".into()),
            EventError::UnidentifiedSender,
            EventError::ConnectionClosed,
            EventError::Join(JoinError::InvalidName),
            EventError::Join(JoinError::AlreadyJoined),
        ];
        for err in errors {
            let label = err.label();
            assert!(
                label.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "label '{label}' must be snake_case"
            );
        }
    }
}
