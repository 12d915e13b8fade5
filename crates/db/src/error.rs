//! Typed error type for the db crate.

use thiserror::Error;

use engine::RepositoryError;
use ports::PortError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row does not map back onto a domain value.
    #[error("corrupt row: {0}")]
    Decode(String),
}

impl From<DbError> for RepositoryError {
    fn from(e: DbError) -> Self {
        RepositoryError::Backend(e.to_string())
    }
}

impl From<DbError> for PortError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Decode(msg) => PortError::Rejected(msg),
            other => PortError::Unavailable(other.to_string()),
        }
    }
}
