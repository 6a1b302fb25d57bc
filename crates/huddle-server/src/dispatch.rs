//! Inbound event dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_core::protocol::{
    EVENT_JOIN, EVENT_SEND_MESSAGE, EVENT_TYPING_START, EVENT_TYPING_STOP, JoinParams,
    SendMessageParams, TypingParams,
};
use huddle_core::{ConnectionId, EventError, InboundFrame, JoinError};
use metrics::counter;
use tracing::{debug, warn};

use crate::engine::BroadcastEngine;
use crate::metrics::EVENTS_DROPPED_TOTAL;

/// Handler for one inbound event name.
pub trait EventHandler: Send + Sync {
    /// Apply `frame` from `connection_id` to the engine.
    fn handle(
        &self,
        connection_id: &ConnectionId,
        frame: &InboundFrame,
        engine: &BroadcastEngine,
    ) -> Result<(), EventError>;
}

struct JoinHandler;

impl EventHandler for JoinHandler {
    fn handle(
        &self,
        connection_id: &ConnectionId,
        frame: &InboundFrame,
        engine: &BroadcastEngine,
    ) -> Result<(), EventError> {
        let params: JoinParams = frame.params()?;
        match engine.join(connection_id, &params.display_name) {
            // A refused name has already been answered with `join-rejected`.
            Ok(_) | Err(EventError::Join(JoinError::InvalidName | JoinError::NameConflict { .. })) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

struct SendMessageHandler;

impl EventHandler for SendMessageHandler {
    fn handle(
        &self,
        connection_id: &ConnectionId,
        frame: &InboundFrame,
        engine: &BroadcastEngine,
    ) -> Result<(), EventError> {
        let params: SendMessageParams = frame.params()?;
        let _ = engine.send_message(connection_id, &params.content)?;
        Ok(())
    }
}

struct TypingHandler {
    started: bool,
}

impl EventHandler for TypingHandler {
    fn handle(
        &self,
        connection_id: &ConnectionId,
        frame: &InboundFrame,
        engine: &BroadcastEngine,
    ) -> Result<(), EventError> {
        let _: TypingParams = frame.params()?;
        engine.typing(connection_id, self.started)
    }
}

/// Maps event names to handlers.
pub struct EventRouter {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Router with `join`, `send-message`, `typing-start` and `typing-stop`.
    pub fn with_default_handlers() -> Self {
        let mut router = Self::new();
        router.register(EVENT_JOIN, JoinHandler);
        router.register(EVENT_SEND_MESSAGE, SendMessageHandler);
        router.register(EVENT_TYPING_START, TypingHandler { started: true });
        router.register(EVENT_TYPING_STOP, TypingHandler { started: false });
        router
    }

    /// Register a handler for an event name.
    pub fn register(&mut self, event: &str, handler: impl EventHandler + 'static) {
        let _ = self.handlers.insert(event.to_owned(), Arc::new(handler));
    }

    /// Parse one raw text frame and run its handler.
    ///
    /// Failures never reach the client; they are logged and counted, and the
    /// connection stays open.
    pub fn dispatch(
        &self,
        connection_id: &ConnectionId,
        raw: &str,
        engine: &BroadcastEngine,
    ) -> Result<(), EventError> {
        let result = InboundFrame::parse(raw).and_then(|frame| {
            let Some(handler) = self.handlers.get(&frame.event) else {
                return Err(EventError::UnknownEvent(frame.event));
            };
            handler.handle(connection_id, &frame, engine)
        });

        if let Err(ref err) = result {
            counter!(EVENTS_DROPPED_TOTAL, "reason" => err.label()).increment(1);
            match err {
                EventError::MalformedEvent { .. } | EventError::UnknownEvent(_) => {
                    warn!(conn_id = %connection_id, error = %err, "dropping inbound event");
                }
                _ => debug!(conn_id = %connection_id, error = %err, "dropping inbound event"),
            }
        }
        result
    }

    /// List all registered event names (sorted).
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether an event name is registered.
    pub fn has_event(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
