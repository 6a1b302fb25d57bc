//! # huddle-core
//!
//! Foundation types, wire protocol, and errors for the huddle presence relay.
//!
//! This crate provides the shared vocabulary the server and its tests depend on:
//!
//! - **Branded IDs**: `ConnectionId`, `MessageId` as newtypes for type safety
//! - **Data model**: `UserRecord`, `ChatMessage`, `SystemNotice`, `TypingSignal`
//! - **Protocol**: `InboundFrame` (client → server) and `OutboundEvent` (server → client)
//! - **Errors**: `JoinError` and `EventError` via `thiserror`
//! - **Names**: display-name normalization shared by the channel join and the
//!   HTTP pre-join check

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod names;
pub mod protocol;
pub mod types;

pub use errors::{EventError, JoinError};
pub use ids::{ConnectionId, MessageId};
pub use names::normalize_display_name;
pub use protocol::{InboundFrame, OutboundEvent, RejectReason};
pub use types::{ChatMessage, MessageKind, SystemNotice, TypingSignal, UserRecord};
