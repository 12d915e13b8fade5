//! `workflow_instances` access and the version-checked instance repository.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use engine::{RepositoryError, RepositoryResult, WorkflowInstance, WorkflowInstanceRepository};

use crate::{models::WorkflowInstanceRow, DbError, DbPool};

const INSTANCE_COLUMNS: &str = "id, definition_id, entity_id, entity_type, current_stage_index, \
     status, stage_started_at, sla_hours, current_approver_id, escalation_enabled, \
     escalation_to, last_escalated_at, version, created_at, updated_at";

/// Open, escalation-enabled instances with a stage SLA, oldest stage first.
pub async fn list_pending_with_sla(pool: &PgPool) -> Result<Vec<WorkflowInstanceRow>, DbError> {
    let sql = format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances \
         WHERE status IN ('pending', 'escalated') \
           AND escalation_enabled \
           AND sla_hours IS NOT NULL \
         ORDER BY stage_started_at"
    );
    let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowInstanceRow>, DbError> {
    let sql = format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1");
    let row = sqlx::query_as::<_, WorkflowInstanceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_instance(pool: &PgPool, row: &WorkflowInstanceRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_instances (
            id, definition_id, entity_id, entity_type, current_stage_index,
            status, stage_started_at, sla_hours, current_approver_id, escalation_enabled,
            escalation_to, last_escalated_at, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(row.id)
    .bind(row.definition_id)
    .bind(&row.entity_id)
    .bind(&row.entity_type)
    .bind(row.current_stage_index)
    .bind(&row.status)
    .bind(row.stage_started_at)
    .bind(row.sla_hours)
    .bind(&row.current_approver_id)
    .bind(row.escalation_enabled)
    .bind(&row.escalation_to)
    .bind(row.last_escalated_at)
    .bind(row.version)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write every mutable column of `row` if, and only if, the stored version
/// still equals `row.version`.  Returns the updated row, or `None` when the
/// guard did not match.
pub async fn update_instance_if_version(
    pool: &PgPool,
    row: &WorkflowInstanceRow,
) -> Result<Option<WorkflowInstanceRow>, DbError> {
    let sql = format!(
        "UPDATE workflow_instances SET \
             current_stage_index = $3, status = $4, stage_started_at = $5, sla_hours = $6, \
             current_approver_id = $7, escalation_enabled = $8, escalation_to = $9, \
             last_escalated_at = $10, updated_at = $11, version = version + 1 \
         WHERE id = $1 AND version = $2 \
         RETURNING {INSTANCE_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, WorkflowInstanceRow>(&sql)
        .bind(row.id)
        .bind(row.version)
        .bind(row.current_stage_index)
        .bind(&row.status)
        .bind(row.stage_started_at)
        .bind(row.sla_hours)
        .bind(&row.current_approver_id)
        .bind(row.escalation_enabled)
        .bind(&row.escalation_to)
        .bind(row.last_escalated_at)
        .bind(row.updated_at)
        .fetch_optional(pool)
        .await?;
    Ok(updated)
}

pub async fn get_version(pool: &PgPool, id: Uuid) -> Result<Option<i64>, DbError> {
    let version = sqlx::query_scalar::<_, i64>("SELECT version FROM workflow_instances WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(version)
}

// ---------------------------------------------------------------------------
// PgInstanceRepository
// ---------------------------------------------------------------------------

/// Postgres-backed [`WorkflowInstanceRepository`].
#[derive(Debug, Clone)]
pub struct PgInstanceRepository {
    pool: DbPool,
}

impl PgInstanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(row: WorkflowInstanceRow) -> RepositoryResult<WorkflowInstance> {
    WorkflowInstance::try_from(row).map_err(RepositoryError::from)
}

/// Decode a scan listing.  Rows that no longer map onto an instance are
/// logged and left out so the rest of the batch is still scanned.
fn decode_listing(rows: Vec<WorkflowInstanceRow>) -> Vec<WorkflowInstance> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match WorkflowInstance::try_from(row) {
                Ok(instance) => Some(instance),
                Err(e) => {
                    warn!(instance_id = %id, "skipping undecodable instance row: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl WorkflowInstanceRepository for PgInstanceRepository {
    async fn list_pending_with_sla(&self) -> RepositoryResult<Vec<WorkflowInstance>> {
        Ok(decode_listing(list_pending_with_sla(&self.pool).await?))
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<WorkflowInstance>> {
        get_instance(&self.pool, id).await?.map(decode).transpose()
    }

    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<()> {
        let row = WorkflowInstanceRow::try_from(instance)?;
        match insert_instance(&self.pool, &row).await {
            Ok(()) => Ok(()),
            Err(DbError::Sqlx(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(instance.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, instance: &WorkflowInstance) -> RepositoryResult<WorkflowInstance> {
        let row = WorkflowInstanceRow::try_from(instance)?;
        if let Some(updated) = update_instance_if_version(&self.pool, &row).await? {
            return decode(updated);
        }

        // Guard missed: tell a vanished row apart from a concurrent writer.
        match get_version(&self.pool, instance.id).await? {
            None => Err(RepositoryError::NotFound(instance.id)),
            Some(actual) => Err(RepositoryError::Conflict {
                id: instance.id,
                expected: instance.version,
                actual: u64::try_from(actual).unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine::{Stage, WorkflowDefinition, WorkflowType};

    fn row(entity_id: &str) -> WorkflowInstanceRow {
        let def = WorkflowDefinition::new(
            "expense",
            WorkflowType::Expense,
            vec![Stage::new(0, "manager").with_sla_hours(24.0)],
        );
        let instance = WorkflowInstance::start(&def, entity_id, Utc::now());
        WorkflowInstanceRow::try_from(&instance).unwrap()
    }

    #[test]
    fn corrupt_row_does_not_hide_the_rest_of_the_listing() {
        let good = row("EXP-1");
        let mut unknown_type = row("EXP-2");
        unknown_type.entity_type = "invoice".into();
        let mut negative_version = row("EXP-3");
        negative_version.version = -1;
        let also_good = row("EXP-4");

        let listed = decode_listing(vec![good.clone(), unknown_type, negative_version, also_good.clone()]);

        let ids: Vec<Uuid> = listed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![good.id, also_good.id]);
    }

    #[test]
    fn single_lookup_still_reports_a_corrupt_row() {
        let mut corrupt = row("EXP-5");
        corrupt.status = "archived".into();
        assert!(matches!(decode(corrupt), Err(RepositoryError::Backend(_))));
    }
}
