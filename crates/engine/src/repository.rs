//! The `WorkflowInstanceRepository` port and its in-memory implementation.
//!
//! Every mutation goes through [`WorkflowInstanceRepository::save`], which is
//! a compare-and-swap on [`WorkflowInstance::version`].  The escalation engine
//! and the approval lifecycle both rely on it so neither can silently
//! overwrite the other.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::WorkflowInstance;

/// Errors surfaced by an instance repository.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The stored instance moved on since it was read.
    #[error("instance {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict { id: Uuid, expected: u64, actual: u64 },

    #[error("instance {0} not found")]
    NotFound(Uuid),

    #[error("instance {0} already exists")]
    Duplicate(Uuid),

    /// Anything the storage backend reports.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// Open (pending or escalated), escalation-enabled instances whose
    /// current stage has an SLA.  Terminal instances are never returned.
    async fn list_pending_with_sla(&self) -> RepositoryResult<Vec<WorkflowInstance>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<WorkflowInstance>>;

    /// Store a brand-new instance.
    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<()>;

    /// Conditional update: succeeds only if the stored version equals
    /// `instance.version`.  Returns the stored instance with its bumped version.
    async fn save(&self, instance: &WorkflowInstance) -> RepositoryResult<WorkflowInstance>;
}

// ---------------------------------------------------------------------------
// InMemoryInstanceRepository
// ---------------------------------------------------------------------------

/// In-memory repository for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryInstanceRepository {
    instances: RwLock<HashMap<Uuid, WorkflowInstance>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[async_trait]
impl WorkflowInstanceRepository for InMemoryInstanceRepository {
    async fn list_pending_with_sla(&self) -> RepositoryResult<Vec<WorkflowInstance>> {
        let instances = self.instances.read().await;
        let mut pending: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| i.is_monitored())
            .cloned()
            .collect();
        // Oldest stage first, matching the Postgres ordering.
        pending.sort_by_key(|i| i.stage_started_at);
        Ok(pending)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<WorkflowInstance>> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<()> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            return Err(RepositoryError::Duplicate(instance.id));
        }
        instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn save(&self, instance: &WorkflowInstance) -> RepositoryResult<WorkflowInstance> {
        let mut instances = self.instances.write().await;
        let stored = instances
            .get_mut(&instance.id)
            .ok_or(RepositoryError::NotFound(instance.id))?;

        if stored.version != instance.version {
            return Err(RepositoryError::Conflict {
                id: instance.id,
                expected: instance.version,
                actual: stored.version,
            });
        }

        let mut next = instance.clone();
        next.version = stored.version + 1;
        *stored = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstanceStatus, Stage, WorkflowDefinition, WorkflowType};
    use chrono::{Duration, Utc};

    fn instance(sla: Option<f64>) -> WorkflowInstance {
        let mut stage = Stage::new(0, "manager");
        stage.sla_hours = sla;
        let def = WorkflowDefinition::new("leave", WorkflowType::Leave, vec![stage]);
        WorkflowInstance::start(&def, "LV-1", Utc::now())
    }

    #[tokio::test]
    async fn listing_excludes_terminal_disabled_and_unbounded_instances() {
        let repo = InMemoryInstanceRepository::new();

        let open = instance(Some(24.0));
        let mut escalated = instance(Some(24.0));
        escalated.status = InstanceStatus::Escalated;
        let no_sla = instance(None);
        let mut disabled = instance(Some(24.0));
        disabled.escalation_enabled = false;
        let mut approved = instance(Some(24.0));
        approved.status = InstanceStatus::Approved;
        let mut rejected = instance(Some(24.0));
        rejected.status = InstanceStatus::Rejected;
        let mut cancelled = instance(Some(24.0));
        cancelled.status = InstanceStatus::Cancelled;

        for i in [&open, &escalated, &no_sla, &disabled, &approved, &rejected, &cancelled] {
            repo.insert(i).await.unwrap();
        }

        let mut listed: Vec<Uuid> = repo
            .list_pending_with_sla()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        listed.sort();
        let mut expected = vec![open.id, escalated.id];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn listing_is_oldest_stage_first() {
        let repo = InMemoryInstanceRepository::new();
        let newer = instance(Some(8.0));
        let mut older = instance(Some(8.0));
        older.stage_started_at = newer.stage_started_at - Duration::hours(5);
        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();

        let listed = repo.list_pending_with_sla().await.unwrap();
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let repo = InMemoryInstanceRepository::new();
        let original = instance(Some(24.0));
        repo.insert(&original).await.unwrap();

        let mut changed = original.clone();
        changed.current_approver_id = Some("director".into());
        let saved = repo.save(&changed).await.unwrap();

        assert_eq!(saved.version, 1);
        assert_eq!(repo.get(original.id).await.unwrap().unwrap(), saved);
    }

    #[tokio::test]
    async fn stale_save_is_rejected_and_store_untouched() {
        let repo = InMemoryInstanceRepository::new();
        let original = instance(Some(24.0));
        repo.insert(&original).await.unwrap();

        let mut approved = original.clone();
        approved.status = InstanceStatus::Approved;
        repo.save(&approved).await.unwrap();

        let mut stale = original.clone();
        stale.status = InstanceStatus::Escalated;
        let err = repo.save(&stale).await.unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Conflict { id: original.id, expected: 0, actual: 1 }
        );
        let stored = repo.get(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Approved);
    }

    #[tokio::test]
    async fn duplicate_insert_and_missing_save_are_errors() {
        let repo = InMemoryInstanceRepository::new();
        let original = instance(Some(1.0));
        repo.insert(&original).await.unwrap();
        assert_eq!(
            repo.insert(&original).await,
            Err(RepositoryError::Duplicate(original.id))
        );

        let ghost = instance(Some(1.0));
        assert_eq!(repo.save(&ghost).await, Err(RepositoryError::NotFound(ghost.id)));
    }
}
