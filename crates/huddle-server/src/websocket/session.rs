//! Channel session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::Peer;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::dispatch::EventRouter;
use crate::engine::BroadcastEngine;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// How long queued events may take to flush once the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-session settings taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Interval between server pings and liveness checks.
    pub heartbeat_interval: Duration,
    /// Silence after which the session is closed.
    pub heartbeat_timeout: Duration,
    /// Outbound queue capacity.
    pub send_queue_capacity: usize,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    TransportError,
    HeartbeatTimeout,
    ServerShutdown,
}

/// Run a session for a freshly upgraded socket.
///
/// 1. Attaches a new [`Peer`] to the engine
/// 2. Forwards queued outbound events and periodic pings to the socket
/// 3. Dispatches inbound text frames, in arrival order
/// 4. Detaches from the engine exactly once, whatever ended the session
#[instrument(skip_all)]
pub async fn run_ws_session(
    ws: WebSocket,
    engine: Arc<BroadcastEngine>,
    router: Arc<EventRouter>,
    settings: SessionSettings,
    shutdown: CancellationToken,
) {
    let (peer, send_rx) = Peer::channel(settings.send_queue_capacity);
    let peer = Arc::new(peer);
    let conn_id = peer.id.clone();

    engine.attach(Arc::clone(&peer));
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %conn_id, "client connected");

    let (ws_tx, mut ws_rx) = ws.split();
    let mut writer = tokio::spawn(write_outbound(ws_tx, send_rx, settings.heartbeat_interval));

    // The heartbeat holds a peer handle; it must be gone before the writer
    // can see the queue close.
    let reason = {
        let heartbeat = run_heartbeat(
            Arc::clone(&peer),
            settings.heartbeat_interval,
            settings.heartbeat_timeout,
            shutdown.child_token(),
        );
        tokio::pin!(heartbeat);

        loop {
            tokio::select! {
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        peer.mark_alive();
                        let _ = router.dispatch(&conn_id, text.as_str(), &engine);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(conn_id = %conn_id, len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => peer.mark_alive(),
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "socket read failed");
                        break CloseReason::TransportError;
                    }
                },
                result = &mut heartbeat => match result {
                    HeartbeatResult::TimedOut => {
                        warn!(
                            conn_id = %conn_id,
                            silent_ms = peer.last_pong_elapsed().as_millis(),
                            "client unresponsive, disconnecting"
                        );
                        break CloseReason::HeartbeatTimeout;
                    }
                    HeartbeatResult::Cancelled => break CloseReason::ServerShutdown,
                },
                () = shutdown.cancelled() => break CloseReason::ServerShutdown,
            }
        }
    };

    let _ = engine.detach(&conn_id);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        conn_id = %conn_id,
        ?reason,
        duration_secs = peer.age().as_secs_f64(),
        dropped = peer.drop_count(),
        "client disconnected"
    );

    // Closing the last sender lets the writer flush and send a close frame.
    drop(peer);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Drain the outbound queue into the socket, pinging every `ping_interval`.
async fn write_outbound<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    ping_interval: Duration,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
