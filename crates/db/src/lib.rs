//! `db` crate: PostgreSQL adapters for the approval engine.
//!
//! Provides a connection pool, typed row structs, and the Postgres
//! implementations of the engine's persistence and audit ports.  Business
//! rules stay in the `engine` crate; this crate only stores and loads.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
pub use repository::{PgAuditLog, PgDefinitionStore, PgInstanceRepository};
