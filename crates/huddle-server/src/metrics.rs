//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally (tests,
/// embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the connection limit was reached (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "ws_connections_refused_total";
/// Accepted joins total (counter).
pub const PRESENCE_JOINS_TOTAL: &str = "presence_joins_total";
/// Refused joins total (counter, labels: reason).
pub const PRESENCE_JOIN_REJECTIONS_TOTAL: &str = "presence_join_rejections_total";
/// Users currently online (gauge).
pub const PRESENCE_ONLINE_USERS: &str = "presence_online_users";
/// User messages broadcast total (counter).
pub const CHAT_MESSAGES_TOTAL: &str = "chat_messages_total";
/// Inbound events dropped without effect (counter, labels: reason).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Outbound deliveries dropped on full or closed queues (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
