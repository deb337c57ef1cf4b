//! Event types for the VoiceStream event system
//!
//! Provides the lifecycle event definitions and the EventBus used to fan
//! events out to supervisor subscribers.

use crate::db::models::CallState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle events published by the call engine
///
/// Events are broadcast via [`EventBus`] and serialized for SSE transmission.
/// The serialized form carries the event kind in an `event` field, e.g.
/// `{"event":"packet_received","call_id":"c1",...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallEvent {
    /// A packet was accepted and tracking state updated
    PacketReceived {
        call_id: String,
        /// Sequence number of the accepted packet
        sequence: i64,
        /// Count of distinct sequences accepted so far
        total_received: i64,
        /// Sequences currently known to be missing, ascending
        missing_sequences: Vec<i64>,
    },

    /// The call moved to a new lifecycle state
    StateChanged {
        call_id: String,
        from_state: CallState,
        to_state: CallState,
    },

    /// The AI pipeline succeeded; the call is archived
    AiCompleted {
        call_id: String,
        transcription: String,
        sentiment: String,
    },

    /// The AI pipeline exhausted its retry budget; the call failed
    AiFailed {
        call_id: String,
        /// Sanitized failure description (never raw error text)
        reason: String,
    },
}

impl CallEvent {
    /// Get event kind as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::PacketReceived { .. } => "packet_received",
            CallEvent::StateChanged { .. } => "state_changed",
            CallEvent::AiCompleted { .. } => "ai_completed",
            CallEvent::AiFailed { .. } => "ai_failed",
        }
    }

    /// The call this event belongs to
    pub fn call_id(&self) -> &str {
        match self {
            CallEvent::PacketReceived { call_id, .. }
            | CallEvent::StateChanged { call_id, .. }
            | CallEvent::AiCompleted { call_id, .. }
            | CallEvent::AiFailed { call_id, .. } => call_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::broadcast`, providing:
/// - Non-blocking publish (a slow subscriber never delays the producer)
/// - Multiple concurrent subscribers with per-subscriber buffers
/// - Automatic cleanup when subscribers drop
/// - Lag detection for subscribers that fall behind their buffer
///
/// Events are not persisted; a subscriber only sees events emitted after it
/// subscribed.
///
/// # Examples
///
/// ```
/// use vstream_common::events::{CallEvent, EventBus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(CallEvent::AiFailed {
///     call_id: "c1".to_string(),
///     reason: "AI service failed after maximum retries".to_string(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "ai_failed");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CallEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: CallEvent) -> Result<usize, broadcast::error::SendError<CallEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// The engine uses this for all publication: event delivery is
    /// best-effort and must never affect a call mutation.
    pub fn emit_lossy(&self, event: CallEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured per-subscriber buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
