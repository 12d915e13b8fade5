//! The collaborators shared by the approval lifecycle and the escalation engine.

use std::sync::Arc;

use ports::{AuditLogPort, EventBus, MetricsPort, NotificationPort};

use crate::clock::Clock;
use crate::definition::DefinitionStore;
use crate::repository::WorkflowInstanceRepository;

/// Everything the engine talks to.  Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct EngineContext {
    pub instances: Arc<dyn WorkflowInstanceRepository>,
    pub definitions: Arc<dyn DefinitionStore>,
    pub notifier: Arc<dyn NotificationPort>,
    pub audit: Arc<dyn AuditLogPort>,
    pub events: Arc<dyn EventBus>,
    pub metrics: Arc<dyn MetricsPort>,
    pub clock: Arc<dyn Clock>,
}
