//! Tracing-backed adapters for deployments without a delivery channel.
//!
//! All three adapters always succeed; they turn the side effect into a structured
//! log line so operators can still follow what the engine did.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::traits::{AuditLogPort, AuditRecord, EventBus, NotificationPort};
use crate::PortError;

/// Writes every notification to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn send(
        &self,
        user_id: &str,
        notification_type: &str,
        payload: Value,
    ) -> Result<(), PortError> {
        info!(
            target: "approval_engine::notifications",
            user_id,
            notification_type,
            %payload,
            "notification"
        );
        Ok(())
    }
}

/// Writes audit records to the log.
#[derive(Debug, Default, Clone)]
pub struct LoggingAuditLog;

#[async_trait]
impl AuditLogPort for LoggingAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), PortError> {
        info!(
            target: "approval_engine::audit",
            instance_id = %record.instance_id,
            action = %record.action,
            actor = %record.actor,
            details = %record.details,
            timestamp = %record.timestamp,
            "audit"
        );
        Ok(())
    }
}

/// Writes published events to the log.  Typically the sink behind an outbox.
#[derive(Debug, Default, Clone)]
pub struct LoggingEventBus;

#[async_trait]
impl EventBus for LoggingEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PortError> {
        info!(target: "approval_engine::events", topic, %payload, "event");
        Ok(())
    }
}
