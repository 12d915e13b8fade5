//! `audit_records`: append-only.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use ports::{AuditLogPort, AuditRecord, PortError};

use crate::{models::AuditRecordRow, DbError, DbPool};

pub async fn append_record(pool: &PgPool, record: &AuditRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO audit_records (instance_id, action, actor, details, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(record.instance_id)
    .bind(&record.action)
    .bind(&record.actor)
    .bind(&record.details)
    .bind(record.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

/// Audit trail of one instance, oldest first.
pub async fn list_for_instance(pool: &PgPool, instance_id: Uuid) -> Result<Vec<AuditRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, AuditRecordRow>(
        r#"
        SELECT id, instance_id, action, actor, details, created_at
        FROM audit_records
        WHERE instance_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Postgres-backed [`AuditLogPort`].
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: DbPool,
}

impl PgAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn history(&self, instance_id: Uuid) -> Result<Vec<AuditRecord>, DbError> {
        let rows = list_for_instance(&self.pool, instance_id).await?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}

#[async_trait]
impl AuditLogPort for PgAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), PortError> {
        append_record(&self.pool, &record).await.map_err(PortError::from)
    }
}
