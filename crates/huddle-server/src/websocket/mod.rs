//! Channel transport: per-connection state, heartbeat, and session lifecycle.

pub mod connection;
pub mod heartbeat;
pub mod session;
