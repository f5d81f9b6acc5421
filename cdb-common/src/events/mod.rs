//! Event types for the bridge
//!
//! - [`DomainEvent`] / [`DomainMessage`]: what local aggregates record
//! - [`BridgeEvent`] / [`EventBus`]: in-process notifications between the
//!   importers and observers such as the SSE stream. Delivery is lossy.

mod domain;
mod message;
mod payloads;

pub use domain::DomainEvent;
pub use message::{DomainMessage, Metadata};
pub use payloads::{BookingInfo, Category, ContactPoint, LocationRef, MediaAsset};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{AggregateKind, ExternalId, RecordKind};

/// Whether a legacy notification announced a new record or a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
}

/// In-process notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// A legacy record was materialized into (or refreshed on) a local aggregate
    ///
    /// Carries the document so listeners do not have to fetch it again.
    RecordImported {
        aggregate_kind: AggregateKind,
        id: ExternalId,
        change: ChangeKind,
        source: RecordKind,
        document_xml: String,
        namespace_uri: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An import was skipped because the admission predicate rejected it
    RecordRejected {
        aggregate_kind: AggregateKind,
        id: ExternalId,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A write-back call against the legacy system failed (stores have drifted)
    SyncBackFailed {
        id: ExternalId,
        event_type: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for [`BridgeEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use cdb_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: BridgeEvent,
    ) -> Result<usize, broadcast::error::SendError<BridgeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(id: &str) -> BridgeEvent {
        BridgeEvent::RecordRejected {
            aggregate_kind: AggregateKind::Place,
            id: ExternalId::new(id).unwrap(),
            reason: "not a place".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(rejected("1")).is_err());
        bus.emit_lossy(rejected("1"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(rejected("abc")).unwrap();

        match rx.recv().await.unwrap() {
            BridgeEvent::RecordRejected { id, .. } => assert_eq!(id.as_str(), "abc"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_bridge_event_serializes_with_tag() {
        let json = serde_json::to_value(rejected("x")).unwrap();
        assert_eq!(json["type"], "RecordRejected");
        assert_eq!(json["aggregate_kind"], "place");
    }
}
