//! `workflow_definitions` access and the Postgres definition store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use engine::{validate_definition, DefinitionStore, EngineError, EscalationDefaults, RepositoryError, WorkflowDefinition};

use crate::{models::WorkflowDefinitionRow, DbError, DbPool};

pub async fn get_definition(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowDefinitionRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowDefinitionRow>(
        r#"SELECT id, name, entity_type, definition, created_at FROM workflow_definitions WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert unless the id exists.  Returns `false` when nothing was written.
pub async fn insert_definition(pool: &PgPool, row: &WorkflowDefinitionRow) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO workflow_definitions (id, name, entity_type, definition, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.entity_type)
    .bind(&row.definition)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Postgres-backed [`DefinitionStore`].  Validation happens before anything
/// touches the database.
#[derive(Debug, Clone)]
pub struct PgDefinitionStore {
    pool: DbPool,
    defaults: EscalationDefaults,
}

impl PgDefinitionStore {
    pub fn new(pool: DbPool, defaults: EscalationDefaults) -> Self {
        Self { pool, defaults }
    }
}

fn storage(e: DbError) -> EngineError {
    EngineError::Repository(RepositoryError::from(e))
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError> {
        get_definition(&self.pool, id)
            .await
            .map_err(storage)?
            .map(WorkflowDefinition::try_from)
            .transpose()
            .map_err(storage)
    }

    async fn publish(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError> {
        let published = validate_definition(&definition, &self.defaults)?;
        let row = WorkflowDefinitionRow::from_definition(&published, Utc::now()).map_err(storage)?;

        if !insert_definition(&self.pool, &row).await.map_err(storage)? {
            return Err(EngineError::DefinitionAlreadyPublished(published.id));
        }
        info!("published definition '{}' ({})", published.name, published.id);
        Ok(published)
    }
}
