//! # huddle-server
//!
//! Real-time presence and message relay over WebSocket.
//!
//! - [`registry::ConnectionRegistry`]: which connection is which user, with
//!   display names unique among online users
//! - [`engine::BroadcastEngine`]: turns join/leave/message/typing events into
//!   fan-out to the right audience
//! - [`dispatch::EventRouter`]: event-name → handler table for inbound frames
//! - [`websocket`]: per-connection session loop, outbound queue, heartbeat
//! - [`server::HuddleServer`]: Axum router (`/ws`, `/api/users/*`, `/health`,
//!   `/metrics`) and listener

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod health;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use engine::BroadcastEngine;
pub use registry::ConnectionRegistry;
pub use server::HuddleServer;
pub use shutdown::ShutdownCoordinator;
