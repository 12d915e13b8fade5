//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use ports::PortError;

use crate::models::{InstanceStatus, WorkflowType};
use crate::repository::RepositoryError;

/// Errors produced by the approval engine (validation, lifecycle, escalation).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition validation ------

    /// A definition must have at least one stage.
    #[error("workflow definition '{0}' has no stages")]
    NoStages(String),

    /// Two stages share the same `order`.
    #[error("duplicate stage order: {0}")]
    DuplicateStageOrder(u32),

    /// A stage without an approver role.
    #[error("stage {order} has an empty approver role")]
    EmptyApproverRole { order: u32 },

    /// SLA hours must be finite and positive.
    #[error("stage {order} has invalid sla_hours {hours}")]
    InvalidSla { order: u32, hours: f64 },

    /// Neither the stage nor the type defaults name an escalation role.
    #[error("stage {order} has no escalation role and '{workflow_type}' has no default")]
    MissingEscalationRole { order: u32, workflow_type: WorkflowType },

    /// Definitions are immutable once published.
    #[error("workflow definition {0} is already published")]
    DefinitionAlreadyPublished(Uuid),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    // ------ Lookup ------

    #[error("workflow definition {0} not found")]
    DefinitionNotFound(Uuid),

    #[error("workflow instance {0} not found")]
    InstanceNotFound(Uuid),

    /// The instance points at a stage its definition does not have.
    #[error("instance {instance_id} is at stage {index}, which its definition does not have")]
    StageOutOfRange { instance_id: Uuid, index: usize },

    // ------ Lifecycle ------

    /// The requested action is not allowed from the current status.
    #[error("cannot {action} an instance that is {from}")]
    InvalidTransition { from: InstanceStatus, action: &'static str },

    // ------ Escalation ------

    /// No `escalation_to` and no stage escalation role could be resolved.
    #[error("no escalation target resolvable for instance {0}")]
    NoEscalationTarget(Uuid),

    /// The instance has nobody to notify.
    #[error("instance {0} has no current approver")]
    NoApprover(Uuid),

    /// Notification, audit or bus delivery failed.
    #[error("delivery failed: {0}")]
    Delivery(#[from] PortError),

    /// Persistence failure (including optimistic-concurrency conflicts).
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// `true` when the instance changed underneath us.  This is an expected
    /// race with the approval API, not a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::Conflict { .. }))
    }
}
