//! Event types for the Scribe event system
//!
//! Provides shared event definitions and EventBus for the relay service.
//!
//! Lifecycle conditions inside the relay are *reported* on the bus rather
//! than thrown: the streaming connection manager, the dispatcher, and the
//! event processor all run unattended, so their failures become events a
//! supervisor or health-check can observe without any of them taking the
//! process down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scribe relay event types
///
/// Events are broadcast via EventBus. All events use this central enum for
/// type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScribeEvent {
    /// Streaming connection state transition
    ///
    /// Emitted on every edge of the connection state machine
    /// (Idle → Connecting → Open → Closing → Closed).
    ConnectionStateChanged {
        /// State before transition
        old_state: String,
        /// State after transition
        new_state: String,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// A reconnect attempt has been scheduled
    ReconnectScheduled {
        /// Attempt number (1-indexed)
        attempt: u32,
        /// Delay before the attempt fires, after jitter
        delay_ms: u64,
        /// When scheduling happened
        timestamp: DateTime<Utc>,
    },

    /// Reconnect attempts exhausted; no further automatic attempts
    ///
    /// Emitted exactly once per exhaustion. The connection stays down
    /// until an external caller re-invokes connect().
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
        /// When the circuit opened
        timestamp: DateTime<Utc>,
    },

    /// One completed recording fully processed
    RecordingProcessed {
        /// Meeting identifier from the event payload
        meeting_id: String,
        /// Task facts extracted from the recording
        facts: usize,
        /// Dispatch tasks that reached the task board
        dispatched: usize,
        /// Dispatch tasks that failed after retries
        failed: usize,
        /// When processing finished
        timestamp: DateTime<Utc>,
    },

    /// A recording event was dropped without dispatching anything
    RecordingSkipped {
        /// Meeting identifier, if one could be read from the payload
        meeting_id: String,
        /// Why the recording was skipped
        reason: String,
        /// When the event was dropped
        timestamp: DateTime<Utc>,
    },

    /// A single dispatch task failed terminally
    ///
    /// Sibling tasks continue; this reports the one loss.
    DispatchFailed {
        /// Diagnostic label of the failed task
        label: String,
        /// Final error after retries
        error: String,
        /// When the task gave up
        timestamp: DateTime<Utc>,
    },
}

impl ScribeEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            ScribeEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
            ScribeEvent::ReconnectScheduled { .. } => "ReconnectScheduled",
            ScribeEvent::ReconnectExhausted { .. } => "ReconnectExhausted",
            ScribeEvent::RecordingProcessed { .. } => "RecordingProcessed",
            ScribeEvent::RecordingSkipped { .. } => "RecordingSkipped",
            ScribeEvent::DispatchFailed { .. } => "DispatchFailed",
        }
    }
}

/// Broadcast bus for ScribeEvent
///
/// Thin wrapper over tokio's broadcast channel. Cloning the bus clones the
/// sender; subscribers only see events emitted after they subscribe.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScribeEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Older events are dropped for lagging subscribers once the buffer
    /// fills; emitters are never blocked.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScribeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` when nobody is listening.
    /// Having no subscribers is a normal condition (e.g. during startup);
    /// callers log and continue.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScribeEvent,
    ) -> Result<usize, broadcast::error::SendError<ScribeEvent>> {
        self.tx.send(event)
    }
}
