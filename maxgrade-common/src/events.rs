//! Event types for the maxgrade session event system
//!
//! Every session state transition that the presentation layer cares about is
//! published on the [`EventBus`] and streamed to clients over SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GradingEvent {
    /// A submission file was accepted and replaced any previous one
    FileSelected {
        session_id: Uuid,
        filename: String,
        mime_type: String,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A submission file was rejected before reading (prior state untouched)
    FileRejected {
        session_id: Uuid,
        filename: String,
        reason: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A grading call was issued
    GradingStarted {
        session_id: Uuid,
        token: u64,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// A grading call finished and its result was applied
    GradingCompleted {
        session_id: Uuid,
        token: u64,
        overall_score: i64,
        timestamp: DateTime<Utc>,
    },

    /// A grading call failed; `message` is the user-facing text
    GradingFailed {
        session_id: Uuid,
        token: u64,
        category: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A grading response arrived for a superseded request and was ignored
    StaleResponseDiscarded {
        session_id: Uuid,
        token: u64,
        timestamp: DateTime<Utc>,
    },
}

impl GradingEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            GradingEvent::FileSelected { .. } => "FileSelected",
            GradingEvent::FileRejected { .. } => "FileRejected",
            GradingEvent::GradingStarted { .. } => "GradingStarted",
            GradingEvent::GradingCompleted { .. } => "GradingCompleted",
            GradingEvent::GradingFailed { .. } => "GradingFailed",
            GradingEvent::StaleResponseDiscarded { .. } => "StaleResponseDiscarded",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            GradingEvent::FileSelected { session_id, .. }
            | GradingEvent::FileRejected { session_id, .. }
            | GradingEvent::GradingStarted { session_id, .. }
            | GradingEvent::GradingCompleted { session_id, .. }
            | GradingEvent::GradingFailed { session_id, .. }
            | GradingEvent::StaleResponseDiscarded { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for [`GradingEvent`]s
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GradingEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GradingEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GradingEvent,
    ) -> Result<usize, broadcast::error::SendError<GradingEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GradingEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(session_id: Uuid) -> GradingEvent {
        GradingEvent::GradingStarted {
            session_id,
            token: 7,
            filename: "22305011_张三_期末作业.mp4".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_creation() {
        let bus = EventBus::new(16);
        assert_eq!(bus.capacity(), 16);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(4);
        assert!(bus.emit(started(Uuid::new_v4())).is_err());
        // Lossy variant swallows the same condition
        bus.emit_lossy(started(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_emit_delivers_to_subscriber() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        assert_eq!(bus.emit(started(id)).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id(), id);
        assert_eq!(received.event_type(), "GradingStarted");
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(started(Uuid::nil())).unwrap();
        assert_eq!(json["type"], "GradingStarted");
        assert_eq!(json["token"], 7);
    }
}
