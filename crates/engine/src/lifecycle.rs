//! The approval side of the instance state machine.
//!
//! ```text
//! pending   --approve(non-final)--> pending    (next stage, clock reset)
//! pending   --approve(final)------> approved   (terminal)
//! pending   --reject--------------> rejected   (terminal)
//! pending   --cancel--------------> cancelled  (terminal)
//! escalated --approve/reject------> as from pending
//! ```
//!
//! `pending --breach--> escalated` belongs to the escalation engine.  Both
//! sides persist through the same version-checked `save`.

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use chrono::{DateTime, Utc};
use ports::AuditRecord;

use crate::context::EngineContext;
use crate::models::{InstanceStatus, WorkflowDefinition, WorkflowInstance};
use crate::EngineError;

/// Request to start an approval.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub definition_id: Uuid,
    pub entity_id: String,
    /// Defaults to the first stage's approver role.
    pub approver_id: Option<String>,
    pub escalation_to: Option<String>,
    pub escalation_enabled: bool,
}

impl NewInstance {
    pub fn new(definition_id: Uuid, entity_id: impl Into<String>) -> Self {
        Self {
            definition_id,
            entity_id: entity_id.into(),
            approver_id: None,
            escalation_to: None,
            escalation_enabled: true,
        }
    }

    pub fn with_approver(mut self, approver_id: impl Into<String>) -> Self {
        self.approver_id = Some(approver_id.into());
        self
    }

    pub fn with_escalation_to(mut self, target: impl Into<String>) -> Self {
        self.escalation_to = Some(target.into());
        self
    }

    pub fn without_escalation(mut self) -> Self {
        self.escalation_enabled = false;
        self
    }
}

/// An approval-API action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `next_approver` overrides the next stage's approver role.
    Approve { next_approver: Option<String> },
    Reject { reason: Option<String> },
    Cancel,
}

impl Transition {
    fn verb(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Cancel => "cancel",
        }
    }
}

/// Compute the state after `transition`.  Pure; nothing is persisted.
///
/// # Errors
/// [`EngineError::InvalidTransition`] when the action is not allowed from the
/// current status, [`EngineError::StageOutOfRange`] if the definition has no
/// next stage to advance to.
pub fn apply_transition(
    instance: &WorkflowInstance,
    definition: &WorkflowDefinition,
    transition: &Transition,
    now: DateTime<Utc>,
) -> Result<WorkflowInstance, EngineError> {
    let allowed = match transition {
        Transition::Approve { .. } | Transition::Reject { .. } => matches!(
            instance.status,
            InstanceStatus::Pending | InstanceStatus::Escalated
        ),
        Transition::Cancel => instance.status == InstanceStatus::Pending,
    };
    if !allowed {
        return Err(EngineError::InvalidTransition {
            from: instance.status,
            action: transition.verb(),
        });
    }

    let mut next = instance.clone();
    next.updated_at = now;

    match transition {
        Transition::Approve { next_approver } => {
            if definition.is_final_stage(instance.current_stage_index) {
                next.status = InstanceStatus::Approved;
            } else {
                let index = instance.current_stage_index + 1;
                let stage = definition.stage(index).ok_or(EngineError::StageOutOfRange {
                    instance_id: instance.id,
                    index,
                })?;
                next.current_stage_index = index;
                next.status = InstanceStatus::Pending;
                next.stage_started_at = now;
                next.sla_hours = stage.sla_hours;
                next.current_approver_id =
                    Some(next_approver.clone().unwrap_or_else(|| stage.approver_role.clone()));
                next.last_escalated_at = None;
            }
        }
        Transition::Reject { .. } => next.status = InstanceStatus::Rejected,
        Transition::Cancel => next.status = InstanceStatus::Cancelled,
    }

    Ok(next)
}

/// Approval API operations over the shared repository.
#[derive(Clone)]
pub struct ApprovalService {
    ctx: EngineContext,
}

impl ApprovalService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Start an approval at stage 0.
    #[instrument(skip(self, request), fields(definition_id = %request.definition_id))]
    pub async fn initiate(&self, request: NewInstance, actor: &str) -> Result<WorkflowInstance, EngineError> {
        let definition = self
            .ctx
            .definitions
            .get(request.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound(request.definition_id))?;

        let now = self.ctx.clock.now();
        let mut instance = WorkflowInstance::start(&definition, request.entity_id, now);
        if let Some(approver) = request.approver_id {
            instance.current_approver_id = Some(approver);
        }
        instance.escalation_to = request.escalation_to;
        instance.escalation_enabled = request.escalation_enabled;

        self.ctx.instances.insert(&instance).await?;
        info!(instance_id = %instance.id, "workflow initiated");

        self.record(&instance, "workflow_initiated", "workflow.initiated", actor, json!({
            "entity_type": instance.entity_type,
            "entity_id": instance.entity_id,
            "approver": instance.current_approver_id,
        }))
        .await;
        Ok(instance)
    }

    pub async fn approve(
        &self,
        instance_id: Uuid,
        actor: &str,
        next_approver: Option<String>,
    ) -> Result<WorkflowInstance, EngineError> {
        self.transition(instance_id, actor, Transition::Approve { next_approver }).await
    }

    pub async fn reject(
        &self,
        instance_id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> Result<WorkflowInstance, EngineError> {
        self.transition(instance_id, actor, Transition::Reject { reason }).await
    }

    pub async fn cancel(&self, instance_id: Uuid, actor: &str) -> Result<WorkflowInstance, EngineError> {
        self.transition(instance_id, actor, Transition::Cancel).await
    }

    /// Read, transition, conditionally save.  A concurrent change surfaces
    /// as a repository conflict; the caller decides whether to retry.
    #[instrument(skip(self, transition), fields(action = transition.verb()))]
    pub async fn transition(
        &self,
        instance_id: Uuid,
        actor: &str,
        transition: Transition,
    ) -> Result<WorkflowInstance, EngineError> {
        let current = self
            .ctx
            .instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))?;
        let definition = self
            .ctx
            .definitions
            .get(current.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound(current.definition_id))?;

        let next = apply_transition(&current, &definition, &transition, self.ctx.clock.now())?;
        let saved = self.ctx.instances.save(&next).await?;

        let (action, topic) = match (&transition, saved.status) {
            (Transition::Approve { .. }, InstanceStatus::Approved) => ("workflow_approved", "workflow.approved"),
            (Transition::Approve { .. }, _) => ("stage_approved", "workflow.stage_approved"),
            (Transition::Reject { .. }, _) => ("workflow_rejected", "workflow.rejected"),
            (Transition::Cancel, _) => ("workflow_cancelled", "workflow.cancelled"),
        };
        let reason = match &transition {
            Transition::Reject { reason } => reason.clone(),
            _ => None,
        };
        info!(instance_id = %saved.id, status = %saved.status, "{}", action);

        self.record(&saved, action, topic, actor, json!({
            "from_stage": current.current_stage_index,
            "to_stage": saved.current_stage_index,
            "from_status": current.status,
            "to_status": saved.status,
            "reason": reason,
        }))
        .await;
        Ok(saved)
    }

    /// Audit + publish after a committed mutation.  Failures here are logged;
    /// the mutation already happened.
    async fn record(
        &self,
        instance: &WorkflowInstance,
        action: &str,
        topic: &str,
        actor: &str,
        details: serde_json::Value,
    ) {
        let now = self.ctx.clock.now();
        let record = AuditRecord::new(instance.id, action, actor, details.clone(), now);
        if let Err(e) = self.ctx.audit.append(record).await {
            warn!(instance_id = %instance.id, "audit append for '{}' failed: {}", action, e);
        }

        let payload = json!({
            "instance_id": instance.id,
            "entity_type": instance.entity_type,
            "entity_id": instance.entity_id,
            "status": instance.status,
            "details": details,
        });
        if let Err(e) = self.ctx.events.publish(topic, payload).await {
            warn!(instance_id = %instance.id, "publishing '{}' failed: {}", topic, e);
        }
    }
}
