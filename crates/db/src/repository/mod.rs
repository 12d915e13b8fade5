//! Repository functions and the Postgres port adapters built on them.
//!
//! Every free function takes a `&DbPool` and returns a `Result<T, DbError>`
//! over row structs; the `Pg*` types wrap them behind the engine's traits.

pub mod audit;
pub mod definitions;
pub mod instances;

pub use audit::PgAuditLog;
pub use definitions::PgDefinitionStore;
pub use instances::PgInstanceRepository;
