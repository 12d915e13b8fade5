//! Core domain models for the approval engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory.  Definitions serialise to/from the JSONB `definition` column of
//! the `workflow_definitions` table; instances map onto `workflow_instances`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowType
// ---------------------------------------------------------------------------

/// The closed set of approval flows the engine backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Leave,
    Expense,
    PurchaseOrder,
    Ticket,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 4] = [
        WorkflowType::Leave,
        WorkflowType::Expense,
        WorkflowType::PurchaseOrder,
        WorkflowType::Ticket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave         => "leave",
            Self::Expense       => "expense",
            Self::PurchaseOrder => "purchase_order",
            Self::Ticket        => "ticket",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave"          => Ok(Self::Leave),
            "expense"        => Ok(Self::Expense),
            "purchase_order" => Ok(Self::PurchaseOrder),
            "ticket"         => Ok(Self::Ticket),
            other            => Err(format!("unknown workflow type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// One ordered step of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub order: u32,
    pub approver_role: String,
    /// `None` means the stage has no deadline and is never escalated.
    #[serde(default)]
    pub sla_hours: Option<f64>,
    /// Filled from the type default at publish time when absent.
    #[serde(default)]
    pub escalation_role: Option<String>,
}

impl Stage {
    pub fn new(order: u32, approver_role: impl Into<String>) -> Self {
        Self {
            order,
            approver_role: approver_role.into(),
            sla_hours: None,
            escalation_role: None,
        }
    }

    pub fn with_sla_hours(mut self, hours: f64) -> Self {
        self.sla_hours = Some(hours);
        self
    }

    pub fn with_escalation_role(mut self, role: impl Into<String>) -> Self {
        self.escalation_role = Some(role.into());
        self
    }
}

/// An approval template.  Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "entity_type")]
    pub workflow_type: WorkflowType,
    pub stages: Vec<Stage>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, workflow_type: WorkflowType, stages: Vec<Stage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            workflow_type,
            stages,
        }
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn is_final_stage(&self, index: usize) -> bool {
        index + 1 >= self.stages.len()
    }
}

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a running approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
    Cancelled,
}

impl InstanceStatus {
    /// Terminal statuses are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending   => write!(f, "pending"),
            Self::Approved  => write!(f, "approved"),
            Self::Rejected  => write!(f, "rejected"),
            Self::Escalated => write!(f, "escalated"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "approved"  => Ok(Self::Approved),
            "rejected"  => Ok(Self::Rejected),
            "escalated" => Ok(Self::Escalated),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown instance status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// One in-flight (or finished) approval of a concrete entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub entity_id: String,
    pub entity_type: WorkflowType,
    pub current_stage_index: usize,
    pub status: InstanceStatus,
    /// Reset on every stage transition.
    pub stage_started_at: DateTime<Utc>,
    /// SLA of the current stage, copied from the definition.
    pub sla_hours: Option<f64>,
    pub current_approver_id: Option<String>,
    pub escalation_enabled: bool,
    /// Explicit escalation target; overrides the stage's escalation role.
    pub escalation_to: Option<String>,
    /// Set once per stage by the escalation engine, cleared on stage advance.
    pub last_escalated_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, bumped by every successful save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// A fresh instance sitting at stage 0 of `definition`.
    pub fn start(definition: &WorkflowDefinition, entity_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let first = definition.stage(0);
        Self {
            id: Uuid::new_v4(),
            definition_id: definition.id,
            entity_id: entity_id.into(),
            entity_type: definition.workflow_type,
            current_stage_index: 0,
            status: InstanceStatus::Pending,
            stage_started_at: now,
            sla_hours: first.and_then(|s| s.sla_hours),
            current_approver_id: first.map(|s| s.approver_role.clone()),
            escalation_enabled: true,
            escalation_to: None,
            last_escalated_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Already escalated within the current stage?
    pub fn is_escalated_in_current_stage(&self) -> bool {
        self.status == InstanceStatus::Escalated
            && self
                .last_escalated_at
                .map_or(false, |at| at >= self.stage_started_at)
    }

    /// Eligible for an SLA scan: open, escalation enabled, has a deadline.
    pub fn is_monitored(&self) -> bool {
        !self.status.is_terminal() && self.escalation_enabled && self.sla_hours.is_some()
    }
}
