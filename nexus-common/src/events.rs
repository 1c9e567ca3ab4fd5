//! Change notifications broadcast to live clients
//!
//! Handlers emit a [`CrmEvent`] after every successful write; the SSE endpoint
//! forwards them to connected browsers so open views can refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::EntityType;
use crate::time;

/// CRM change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrmEvent {
    EntityCreated {
        entity_type: EntityType,
        id: Uuid,
        timestamp: DateTime<Utc>,
    },

    EntityUpdated {
        entity_type: EntityType,
        id: Uuid,
        timestamp: DateTime<Utc>,
    },

    EntityDeleted {
        entity_type: EntityType,
        id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A record was carried forward to the next pipeline stage
    Converted {
        from_type: EntityType,
        from_id: Uuid,
        to_type: EntityType,
        to_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl CrmEvent {
    pub fn created(entity_type: EntityType, id: Uuid) -> Self {
        CrmEvent::EntityCreated {
            entity_type,
            id,
            timestamp: time::now(),
        }
    }

    pub fn updated(entity_type: EntityType, id: Uuid) -> Self {
        CrmEvent::EntityUpdated {
            entity_type,
            id,
            timestamp: time::now(),
        }
    }

    pub fn deleted(entity_type: EntityType, id: Uuid) -> Self {
        CrmEvent::EntityDeleted {
            entity_type,
            id,
            timestamp: time::now(),
        }
    }

    pub fn converted(from_type: EntityType, from_id: Uuid, to_type: EntityType, to_id: Uuid) -> Self {
        CrmEvent::Converted {
            from_type,
            from_id,
            to_type,
            to_id,
            timestamp: time::now(),
        }
    }

    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            CrmEvent::EntityCreated { .. } => "EntityCreated",
            CrmEvent::EntityUpdated { .. } => "EntityUpdated",
            CrmEvent::EntityDeleted { .. } => "EntityDeleted",
            CrmEvent::Converted { .. } => "Converted",
        }
    }
}

/// Broadcast channel shared by all handlers
///
/// Every clone sends into the same channel. Slow subscribers lose the
/// oldest events once the channel capacity is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CrmEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<CrmEvent> {
        self.tx.subscribe()
    }

    /// Emit to current subscribers; having none is fine
    pub fn emit(&self, event: CrmEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        bus.emit(CrmEvent::created(EntityType::Account, Uuid::new_v4()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit(CrmEvent::deleted(EntityType::Job, id));

        match rx.recv().await.unwrap() {
            CrmEvent::EntityDeleted { entity_type, id: got, .. } => {
                assert_eq!(entity_type, EntityType::Job);
                assert_eq!(got, id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_serialized_shape() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let event = CrmEvent::converted(EntityType::Lead, from, EntityType::Deal, to);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Converted");
        assert_eq!(json["from_type"], "lead");
        assert_eq!(json["to_type"], "deal");
        assert_eq!(json["to_id"], to.to_string());
        assert_eq!(event.event_type(), "Converted");
    }
}
