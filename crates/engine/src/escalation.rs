//! SLA escalation engine.
//!
//! `EscalationEngine` is the orchestrator behind every scheduler tick:
//! 1. Lists open, escalation-enabled instances that have a stage SLA.
//! 2. Classifies each one against its deadline.
//! 3. Breached → [`EscalationEngine::escalate`], warning →
//!    [`EscalationEngine::send_warning`], ok → nothing.
//! 4. Isolates per-instance failures: they are counted, audited as
//!    `escalation_failed`, and the batch carries on.  Only a failure to list
//!    instances aborts the scan.
//!
//! Escalation is idempotent within a stage.  The instance is re-read before
//! any side effect, and the final write is a version-checked `save`, so an
//! approval racing with the scan always wins.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use chrono::{DateTime, Utc};
use ports::{AuditRecord, Counter, MetricsSnapshot};

use crate::context::EngineContext;
use crate::models::{InstanceStatus, WorkflowInstance};
use crate::repository::RepositoryError;
use crate::sla::{self, SlaStatus, DEFAULT_WARNING_RATIO};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the escalation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Fraction of the SLA after which an instance is in the warning window.
    pub warning_ratio: f64,
    /// Actor recorded on audit entries written by the engine.
    pub actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warning_ratio: DEFAULT_WARNING_RATIO,
            actor: "system".to_owned(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.warning_ratio > 0.0 && self.warning_ratio <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "warning_ratio must be in (0, 1], got {}",
                self.warning_ratio
            )));
        }
        if self.actor.trim().is_empty() {
            return Err(EngineError::InvalidConfig("actor must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_checked: usize,
    pub escalated: usize,
    pub reminded: usize,
    /// Instances whose processing failed and will be retried next tick.
    pub failed: usize,
}

/// What [`EscalationEngine::escalate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    Escalated { target: String },
    /// Already escalated in the current stage; no side effects.
    AlreadyEscalated,
    /// The instance changed since it was read (approved, advanced, ...).
    Conflict,
}

/// Acknowledgement of a manual reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderReceipt {
    pub success: bool,
    pub instance_id: Uuid,
    pub reminder_type: String,
}

enum Action {
    Escalated,
    Reminded,
    Nothing,
}

// ---------------------------------------------------------------------------
// EscalationEngine
// ---------------------------------------------------------------------------

pub struct EscalationEngine {
    ctx: EngineContext,
    config: EngineConfig,
}

impl EscalationEngine {
    /// # Errors
    /// [`EngineError::InvalidConfig`] when `config` does not validate.
    pub fn new(ctx: EngineContext, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { ctx, config })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One pass over every monitored instance.
    ///
    /// # Errors
    /// Only a failing listing call is returned; per-instance failures are
    /// counted in the summary and the metrics.
    #[instrument(skip(self))]
    pub async fn check_and_escalate_workflows(&self) -> Result<ScanSummary, EngineError> {
        let instances = self.ctx.instances.list_pending_with_sla().await?;
        let now = self.ctx.clock.now();

        self.ctx
            .metrics
            .increment(Counter::WorkflowsChecked, instances.len() as u64);

        let mut summary = ScanSummary {
            total_checked: instances.len(),
            ..ScanSummary::default()
        };

        for instance in &instances {
            match self.process(instance, now).await {
                Ok(Action::Escalated) => summary.escalated += 1,
                Ok(Action::Reminded) => summary.reminded += 1,
                Ok(Action::Nothing) => {}
                Err(e) => {
                    summary.failed += 1;
                    self.record_failure(instance, &e).await;
                }
            }
        }

        info!(
            "scan finished: {} checked, {} escalated, {} reminded, {} failed",
            summary.total_checked, summary.escalated, summary.reminded, summary.failed
        );
        Ok(summary)
    }

    async fn process(&self, instance: &WorkflowInstance, now: DateTime<Utc>) -> Result<Action, EngineError> {
        let status = sla::classify_with_ratio(
            instance.stage_started_at,
            now,
            instance.sla_hours,
            self.config.warning_ratio,
        );

        match status {
            SlaStatus::Breached if instance.is_escalated_in_current_stage() => {
                debug!(instance_id = %instance.id, "already escalated in this stage");
                Ok(Action::Nothing)
            }
            SlaStatus::Breached => {
                // A breach counts once per stage, when its escalation commits.
                match self.escalate(instance).await? {
                    EscalationOutcome::Escalated { .. } => {
                        self.ctx.metrics.increment(Counter::SlaBreaches, 1);
                        Ok(Action::Escalated)
                    }
                    EscalationOutcome::AlreadyEscalated | EscalationOutcome::Conflict => Ok(Action::Nothing),
                }
            }
            SlaStatus::Warning => {
                self.send_warning(instance).await?;
                Ok(Action::Reminded)
            }
            SlaStatus::Ok => Ok(Action::Nothing),
        }
    }

    /// Reassign `instance` to its escalation target.
    ///
    /// `instance` is the caller's snapshot; the stored copy is re-read first
    /// and nothing happens if it moved on.
    ///
    /// # Errors
    /// Lookup failures, an unresolvable target, and notification or audit
    /// delivery failures.  A concurrent modification is not an error; it is
    /// reported as [`EscalationOutcome::Conflict`].
    #[instrument(skip(self, instance), fields(instance_id = %instance.id))]
    pub async fn escalate(&self, instance: &WorkflowInstance) -> Result<EscalationOutcome, EngineError> {
        let current = self
            .ctx
            .instances
            .get(instance.id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance.id))?;

        if current.status.is_terminal() {
            debug!("instance is {}, skipping", current.status);
            return Ok(EscalationOutcome::Conflict);
        }
        if current.is_escalated_in_current_stage() {
            debug!("already escalated in stage {}", current.current_stage_index);
            return Ok(EscalationOutcome::AlreadyEscalated);
        }
        if current.version != instance.version {
            debug!(
                "instance moved from version {} to {} since it was read",
                instance.version, current.version
            );
            return Ok(EscalationOutcome::Conflict);
        }

        let target = self.resolve_target(&current).await?;
        let now = self.ctx.clock.now();
        let elapsed_hours = sla::elapsed_hours(current.stage_started_at, now);
        let from_approver = current.current_approver_id.clone();

        self.ctx
            .notifier
            .send(
                &target,
                "workflow_escalation",
                json!({
                    "instance_id": current.id,
                    "entity_type": current.entity_type,
                    "entity_id": current.entity_id,
                    "stage_index": current.current_stage_index,
                    "from_approver": from_approver,
                    "elapsed_hours": elapsed_hours,
                    "sla_hours": current.sla_hours,
                }),
            )
            .await?;

        self.ctx
            .audit
            .append(AuditRecord::new(
                current.id,
                "workflow_escalated",
                self.config.actor.as_str(),
                json!({
                    "from_approver": from_approver,
                    "to_target": target,
                    "elapsed_hours": elapsed_hours,
                }),
                now,
            ))
            .await?;

        let mut next = current.clone();
        next.status = InstanceStatus::Escalated;
        next.last_escalated_at = Some(now);
        next.current_approver_id = Some(target.clone());
        next.updated_at = now;

        let saved = match self.ctx.instances.save(&next).await {
            Ok(saved) => saved,
            Err(RepositoryError::Conflict { expected, actual, .. }) => {
                debug!(
                    "escalation write rejected: version {} expected, {} stored",
                    expected, actual
                );
                return Ok(EscalationOutcome::Conflict);
            }
            Err(e) => return Err(e.into()),
        };

        let payload = json!({
            "instance_id": saved.id,
            "entity_type": saved.entity_type,
            "entity_id": saved.entity_id,
            "stage_index": saved.current_stage_index,
            "from_approver": from_approver,
            "to_target": target,
            "elapsed_hours": elapsed_hours,
        });
        if let Err(e) = self.ctx.events.publish("workflow.escalated", payload).await {
            warn!("publishing workflow.escalated failed: {}", e);
        }

        self.ctx.metrics.increment(Counter::WorkflowsEscalated, 1);
        info!(
            "escalated to '{}' after {:.1}h (sla {:?}h)",
            target, elapsed_hours, saved.sla_hours
        );
        Ok(EscalationOutcome::Escalated { target })
    }

    /// Nudge the current approver of an instance in its warning window.
    /// Never mutates the instance.
    #[instrument(skip(self, instance), fields(instance_id = %instance.id))]
    pub async fn send_warning(&self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        let approver = instance
            .current_approver_id
            .as_deref()
            .ok_or(EngineError::NoApprover(instance.id))?;
        let now = self.ctx.clock.now();
        let elapsed_hours = sla::elapsed_hours(instance.stage_started_at, now);
        let remaining_hours = instance.sla_hours.map(|sla| sla - elapsed_hours);

        self.ctx
            .notifier
            .send(
                approver,
                "sla_warning",
                json!({
                    "instance_id": instance.id,
                    "entity_type": instance.entity_type,
                    "entity_id": instance.entity_id,
                    "elapsed_hours": elapsed_hours,
                    "remaining_hours": remaining_hours,
                }),
            )
            .await?;

        self.ctx
            .audit
            .append(AuditRecord::new(
                instance.id,
                "sla_warning_sent",
                self.config.actor.as_str(),
                json!({ "approver": approver, "elapsed_hours": elapsed_hours }),
                now,
            ))
            .await?;

        self.ctx.metrics.increment(Counter::RemindersSent, 1);
        info!("sla warning sent to '{}'", approver);
        Ok(())
    }

    /// Operator-initiated reminder to the current approver.  Skips SLA
    /// classification entirely.
    ///
    /// # Errors
    /// [`EngineError::InstanceNotFound`], [`EngineError::InvalidTransition`]
    /// for a closed instance, [`EngineError::NoApprover`], or a delivery
    /// failure.
    #[instrument(skip(self))]
    pub async fn send_reminder(
        &self,
        instance_id: Uuid,
        reminder_type: &str,
    ) -> Result<ReminderReceipt, EngineError> {
        let instance = self
            .ctx
            .instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))?;

        if instance.status.is_terminal() {
            return Err(EngineError::InvalidTransition { from: instance.status, action: "remind" });
        }
        let approver = instance
            .current_approver_id
            .as_deref()
            .ok_or(EngineError::NoApprover(instance_id))?;
        let now = self.ctx.clock.now();

        self.ctx
            .notifier
            .send(
                approver,
                reminder_type,
                json!({
                    "instance_id": instance.id,
                    "entity_type": instance.entity_type,
                    "entity_id": instance.entity_id,
                    "status": instance.status,
                    "elapsed_hours": sla::elapsed_hours(instance.stage_started_at, now),
                }),
            )
            .await?;

        self.ctx
            .audit
            .append(AuditRecord::new(
                instance.id,
                "reminder_sent",
                self.config.actor.as_str(),
                json!({ "reminder_type": reminder_type, "approver": approver }),
                now,
            ))
            .await?;

        self.ctx.metrics.increment(Counter::RemindersSent, 1);
        info!("'{}' reminder sent to '{}'", reminder_type, approver);

        Ok(ReminderReceipt {
            success: true,
            instance_id,
            reminder_type: reminder_type.to_owned(),
        })
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.ctx.metrics.reset();
    }

    /// `escalation_to` wins; otherwise the stage's escalation role.
    async fn resolve_target(&self, instance: &WorkflowInstance) -> Result<String, EngineError> {
        if let Some(target) = instance.escalation_to.as_deref().map(str::trim) {
            if !target.is_empty() {
                return Ok(target.to_owned());
            }
        }

        let definition = self
            .ctx
            .definitions
            .get(instance.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound(instance.definition_id))?;
        let stage = definition
            .stage(instance.current_stage_index)
            .ok_or(EngineError::StageOutOfRange {
                instance_id: instance.id,
                index: instance.current_stage_index,
            })?;

        stage
            .escalation_role
            .clone()
            .filter(|role| !role.trim().is_empty())
            .ok_or(EngineError::NoEscalationTarget(instance.id))
    }

    async fn record_failure(&self, instance: &WorkflowInstance, err: &EngineError) {
        self.ctx.metrics.increment(Counter::EscalationFailures, 1);
        warn!(instance_id = %instance.id, "escalation check failed: {}", err);

        let record = AuditRecord::new(
            instance.id,
            "escalation_failed",
            self.config.actor.as_str(),
            json!({
                "error": err.to_string(),
                "stage_index": instance.current_stage_index,
                "status": instance.status,
            }),
            self.ctx.clock.now(),
        );
        if let Err(e) = self.ctx.audit.append(record).await {
            error!(instance_id = %instance.id, "could not audit escalation failure: {}", e);
        }
    }
}
