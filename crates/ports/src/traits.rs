//! The port traits: the contract every side-effect adapter must fulfil.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::metrics::{Counter, MetricsSnapshot};
use crate::PortError;

/// An append-only audit entry.  Storage is owned by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub instance_id: Uuid,
    pub action: String,
    pub actor: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        instance_id: Uuid,
        action: impl Into<String>,
        actor: impl Into<String>,
        details: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            action: action.into(),
            actor: actor.into(),
            details,
            timestamp,
        }
    }
}

/// A message travelling over the event bus.  `topic` is the event type,
/// e.g. `workflow.escalated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

/// Delivers a notification to a single user (or role mailbox).
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        notification_type: &str,
        payload: Value,
    ) -> Result<(), PortError>;
}

/// Appends audit records.
#[async_trait]
pub trait AuditLogPort: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), PortError>;
}

/// Publishes events.  Delivery guarantees beyond "accepted by the bus"
/// belong to the bus implementation.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PortError>;
}

/// Process-wide counters.  Synchronous on purpose: incrementing a counter
/// is never a suspension point.
pub trait MetricsPort: Send + Sync {
    fn increment(&self, counter: Counter, value: u64);

    /// Immutable copy of every counter.
    fn snapshot(&self) -> MetricsSnapshot;

    /// Zero every counter.
    fn reset(&self);
}
