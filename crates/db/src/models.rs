//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate; the conversions below are the
//! only place where text columns become enums again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use engine::{InstanceStatus, WorkflowDefinition, WorkflowInstance, WorkflowType};
use ports::AuditRecord;

use crate::DbError;

// ---------------------------------------------------------------------------
// workflow_definitions
// ---------------------------------------------------------------------------

/// A published definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowDefinitionRow {
    pub id: Uuid,
    pub name: String,
    pub entity_type: String,
    /// Full JSON definition (stages included).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinitionRow {
    pub fn from_definition(definition: &WorkflowDefinition, created_at: DateTime<Utc>) -> Result<Self, DbError> {
        let json = serde_json::to_value(definition).map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(Self {
            id: definition.id,
            name: definition.name.clone(),
            entity_type: definition.workflow_type.to_string(),
            definition: json,
            created_at,
        })
    }
}

impl TryFrom<WorkflowDefinitionRow> for WorkflowDefinition {
    type Error = DbError;

    fn try_from(row: WorkflowDefinitionRow) -> Result<Self, Self::Error> {
        let definition: WorkflowDefinition = serde_json::from_value(row.definition)
            .map_err(|e| DbError::Decode(format!("definition {}: {e}", row.id)))?;
        if definition.id != row.id {
            return Err(DbError::Decode(format!(
                "definition row {} carries document for {}",
                row.id, definition.id
            )));
        }
        Ok(definition)
    }
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// A persisted workflow instance row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowInstanceRow {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub entity_id: String,
    pub entity_type: String,
    pub current_stage_index: i32,
    pub status: String,
    pub stage_started_at: DateTime<Utc>,
    pub sla_hours: Option<f64>,
    pub current_approver_id: Option<String>,
    pub escalation_enabled: bool,
    pub escalation_to: Option<String>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&WorkflowInstance> for WorkflowInstanceRow {
    type Error = DbError;

    fn try_from(instance: &WorkflowInstance) -> Result<Self, Self::Error> {
        let current_stage_index = i32::try_from(instance.current_stage_index)
            .map_err(|_| DbError::Decode(format!("stage index {} out of range", instance.current_stage_index)))?;
        let version = i64::try_from(instance.version)
            .map_err(|_| DbError::Decode(format!("version {} out of range", instance.version)))?;

        Ok(Self {
            id: instance.id,
            definition_id: instance.definition_id,
            entity_id: instance.entity_id.clone(),
            entity_type: instance.entity_type.to_string(),
            current_stage_index,
            status: instance.status.to_string(),
            stage_started_at: instance.stage_started_at,
            sla_hours: instance.sla_hours,
            current_approver_id: instance.current_approver_id.clone(),
            escalation_enabled: instance.escalation_enabled,
            escalation_to: instance.escalation_to.clone(),
            last_escalated_at: instance.last_escalated_at,
            version,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        })
    }
}

impl TryFrom<WorkflowInstanceRow> for WorkflowInstance {
    type Error = DbError;

    fn try_from(row: WorkflowInstanceRow) -> Result<Self, Self::Error> {
        let entity_type: WorkflowType = row.entity_type.parse().map_err(DbError::Decode)?;
        let status: InstanceStatus = row.status.parse().map_err(DbError::Decode)?;
        let current_stage_index = usize::try_from(row.current_stage_index)
            .map_err(|_| DbError::Decode(format!("negative stage index on {}", row.id)))?;
        let version = u64::try_from(row.version)
            .map_err(|_| DbError::Decode(format!("negative version on {}", row.id)))?;

        Ok(Self {
            id: row.id,
            definition_id: row.definition_id,
            entity_id: row.entity_id,
            entity_type,
            current_stage_index,
            status,
            stage_started_at: row.stage_started_at,
            sla_hours: row.sla_hours,
            current_approver_id: row.current_approver_id,
            escalation_enabled: row.escalation_enabled,
            escalation_to: row.escalation_to,
            last_escalated_at: row.last_escalated_at,
            version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// audit_records
// ---------------------------------------------------------------------------

/// An append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditRecordRow {
    pub id: i64,
    pub instance_id: Uuid,
    pub action: String,
    pub actor: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRecordRow> for AuditRecord {
    fn from(row: AuditRecordRow) -> Self {
        AuditRecord::new(row.instance_id, row.action, row.actor, row.details, row.created_at)
    }
}
