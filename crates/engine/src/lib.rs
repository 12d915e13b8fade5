//! `engine` crate: domain model, SLA classification, the approval state
//! machine and the escalation engine.

pub mod clock;
pub mod context;
pub mod definition;
pub mod error;
pub mod escalation;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod sla;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::EngineContext;
pub use definition::{validate_definition, DefinitionStore, EscalationDefaults, InMemoryDefinitionStore};
pub use error::EngineError;
pub use escalation::{EngineConfig, EscalationEngine, EscalationOutcome, ReminderReceipt, ScanSummary};
pub use lifecycle::{ApprovalService, NewInstance, Transition};
pub use models::{InstanceStatus, Stage, WorkflowDefinition, WorkflowInstance, WorkflowType};
pub use repository::{InMemoryInstanceRepository, RepositoryError, RepositoryResult, WorkflowInstanceRepository};
pub use sla::{classify, classify_with_ratio, SlaStatus};
