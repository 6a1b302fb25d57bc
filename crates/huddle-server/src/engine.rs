//! Broadcast engine: routes validated events to their audience.
//!
//! Each open channel is attached as a [`Peer`]; the registry is consulted to
//! turn a connection into a display name. Fan-out serializes an event once
//! and pushes it into every target peer's bounded queue with `try_send`, so a
//! slow or dead peer loses its own delivery and never holds up the rest.
//!
//! Membership transitions (join and detach) run under one lock covering the
//! registry update, the snapshot read, and the fan-out. Every peer therefore
//! receives presence snapshots in the order the registry changed.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_core::{
    ChatMessage, ConnectionId, EventError, OutboundEvent, SystemNotice, TypingSignal, UserRecord,
};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::metrics::{
    BROADCAST_DROPS_TOTAL, CHAT_MESSAGES_TOTAL, PRESENCE_JOIN_REJECTIONS_TOTAL,
    PRESENCE_JOINS_TOTAL, PRESENCE_ONLINE_USERS,
};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::Peer;

/// Fan-out target set.
#[derive(Clone, Copy, Debug)]
enum Audience<'a> {
    All,
    AllExcept(&'a ConnectionId),
}

/// Routes join/leave/message/typing events between attached peers.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    peers: RwLock<HashMap<ConnectionId, Arc<Peer>>>,
    membership: Mutex<()>,
}

impl BroadcastEngine {
    /// Create an engine over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            peers: RwLock::new(HashMap::new()),
            membership: Mutex::new(()),
        }
    }

    /// The registry this engine resolves identities against.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// A channel opened; the peer now receives all-connection broadcasts.
    pub fn attach(&self, peer: Arc<Peer>) {
        let _ = self.peers.write().insert(peer.id.clone(), peer);
    }

    /// Handle a `join` from `connection_id`.
    ///
    /// On success the others get `system-join-notice` and everyone, joiner
    /// included, gets a fresh `presence-snapshot`. A blank or taken name is
    /// answered with `join-rejected` to the joiner alone.
    pub fn join(&self, connection_id: &ConnectionId, raw_name: &str) -> Result<UserRecord, EventError> {
        let _membership = self.membership.lock();
        if !self.peers.read().contains_key(connection_id) {
            return Err(EventError::ConnectionClosed);
        }

        let record = match self.registry.try_join(connection_id, raw_name) {
            Ok(record) => record,
            Err(err) => {
                if let Some(reason) = err.reject_reason() {
                    counter!(PRESENCE_JOIN_REJECTIONS_TOTAL, "reason" => format!("{reason:?}"))
                        .increment(1);
                    info!(conn_id = %connection_id, ?reason, "join rejected");
                    let _ = self.send_to(
                        connection_id,
                        &OutboundEvent::JoinRejected {
                            reason,
                            message: err.to_string(),
                        },
                    );
                }
                return Err(err.into());
            }
        };

        counter!(PRESENCE_JOINS_TOTAL).increment(1);
        info!(conn_id = %connection_id, display_name = %record.display_name, "user joined");

        let _ = self.broadcast(
            &OutboundEvent::SystemJoinNotice(SystemNotice::joined(&record.display_name)),
            Audience::AllExcept(connection_id),
        );
        self.broadcast_presence();
        Ok(record)
    }

    /// Handle a `send-message` from `connection_id`.
    ///
    /// The message goes to every connection, the sender included. Events
    /// from a connection with no identity are dropped.
    pub fn send_message(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<ChatMessage, EventError> {
        let sender = self
            .registry
            .lookup(connection_id)
            .ok_or(EventError::UnidentifiedSender)?;

        let message = ChatMessage::user(sender.display_name, content);
        counter!(CHAT_MESSAGES_TOTAL).increment(1);
        debug!(conn_id = %connection_id, message_id = %message.id, "relaying message");
        let _ = self.broadcast(&OutboundEvent::Message(message.clone()), Audience::All);
        Ok(message)
    }

    /// Handle `typing-start` (`started = true`) or `typing-stop` from
    /// `connection_id`; relayed to everyone else.
    pub fn typing(&self, connection_id: &ConnectionId, started: bool) -> Result<(), EventError> {
        let sender = self
            .registry
            .lookup(connection_id)
            .ok_or(EventError::UnidentifiedSender)?;

        let signal = TypingSignal {
            sender_name: sender.display_name,
        };
        let event = if started {
            OutboundEvent::TypingStart(signal)
        } else {
            OutboundEvent::TypingStop(signal)
        };
        let _ = self.broadcast(&event, Audience::AllExcept(connection_id));
        Ok(())
    }

    /// A channel closed.
    ///
    /// Drops the peer and its registry record. If the connection had joined,
    /// the remaining connections get `system-leave-notice` and a fresh
    /// `presence-snapshot`; otherwise nothing is broadcast.
    pub fn detach(&self, connection_id: &ConnectionId) -> Option<UserRecord> {
        let _membership = self.membership.lock();
        let _ = self.peers.write().remove(connection_id);

        let record = self.registry.leave(connection_id)?;
        info!(conn_id = %connection_id, display_name = %record.display_name, "user left");

        let _ = self.broadcast(
            &OutboundEvent::SystemLeaveNotice(SystemNotice::left(&record.display_name)),
            Audience::All,
        );
        self.broadcast_presence();
        Some(record)
    }

    /// Number of attached (open) connections, joined or not.
    pub fn connection_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Current online users in join order.
    pub fn online_users(&self) -> Vec<UserRecord> {
        self.registry.snapshot()
    }

    /// Send one event to a single connection.
    pub fn send_to(&self, connection_id: &ConnectionId, event: &OutboundEvent) -> bool {
        let Some(json) = serialize(event) else {
            return false;
        };
        let Some(peer) = self.peers.read().get(connection_id).cloned() else {
            return false;
        };
        deliver(&peer, &json, event)
    }

    #[allow(clippy::cast_precision_loss)]
    fn broadcast_presence(&self) {
        let users = self.registry.snapshot();
        gauge!(PRESENCE_ONLINE_USERS).set(users.len() as f64);
        let _ = self.broadcast(&OutboundEvent::PresenceSnapshot { users }, Audience::All);
    }

    /// Fan `event` out to `audience`; returns the number of queued deliveries.
    fn broadcast(&self, event: &OutboundEvent, audience: Audience<'_>) -> usize {
        let Some(json) = serialize(event) else {
            return 0;
        };
        let peers = self.peers.read();
        let mut delivered = 0;
        for peer in peers.values() {
            if let Audience::AllExcept(excluded) = audience {
                if &peer.id == excluded {
                    continue;
                }
            }
            if deliver(peer, &json, event) {
                delivered += 1;
            }
        }
        debug!(event = event.name(), recipients = delivered, "broadcast event");
        delivered
    }
}

fn serialize(event: &OutboundEvent) -> Option<Arc<String>> {
    match event.to_json() {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}

fn deliver(peer: &Peer, json: &Arc<String>, event: &OutboundEvent) -> bool {
    if peer.send(Arc::clone(json)) {
        true
    } else {
        counter!(BROADCAST_DROPS_TOTAL).increment(1);
        warn!(conn_id = %peer.id, event = event.name(), "failed to queue event for client");
        false
    }
}
