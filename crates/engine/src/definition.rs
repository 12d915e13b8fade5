//! Definition validation and the read-mostly definition store.
//!
//! Rules enforced at publish time:
//! 1. A definition has at least one stage.
//! 2. Stage `order` values are unique; stages are stored sorted by `order`,
//!    so a stage's position is its stage index.
//! 3. Every stage names an approver role.
//! 4. `sla_hours`, when present, is finite and strictly positive.
//! 5. Every stage ends up with an escalation role: its own, or the default
//!    for the definition's workflow type.
//!
//! Escalation-time code can therefore assume the stage escalation role is
//! always set on a published definition.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{WorkflowDefinition, WorkflowType};
use crate::EngineError;

// ---------------------------------------------------------------------------
// EscalationDefaults
// ---------------------------------------------------------------------------

/// Lookup table: workflow type → escalation role used when a stage has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationDefaults {
    roles: HashMap<WorkflowType, String>,
}

impl EscalationDefaults {
    /// A table with no entries; every stage must then name its own role.
    pub fn empty() -> Self {
        Self { roles: HashMap::new() }
    }

    pub fn with_role(mut self, workflow_type: WorkflowType, role: impl Into<String>) -> Self {
        self.roles.insert(workflow_type, role.into());
        self
    }

    pub fn role_for(&self, workflow_type: WorkflowType) -> Option<&str> {
        self.roles.get(&workflow_type).map(String::as_str)
    }
}

impl Default for EscalationDefaults {
    fn default() -> Self {
        Self::empty()
            .with_role(WorkflowType::Leave, "hr_manager")
            .with_role(WorkflowType::Expense, "finance_director")
            .with_role(WorkflowType::PurchaseOrder, "procurement_director")
            .with_role(WorkflowType::Ticket, "support_lead")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate `definition` and return it in published form: stages sorted by
/// order and every escalation role resolved.
///
/// # Errors
/// - [`EngineError::NoStages`] for an empty definition.
/// - [`EngineError::DuplicateStageOrder`] if two stages share an order.
/// - [`EngineError::EmptyApproverRole`] for a blank approver role.
/// - [`EngineError::InvalidSla`] for a non-finite or non-positive SLA.
/// - [`EngineError::MissingEscalationRole`] if no escalation role resolves.
pub fn validate_definition(
    definition: &WorkflowDefinition,
    defaults: &EscalationDefaults,
) -> Result<WorkflowDefinition, EngineError> {
    if definition.stages.is_empty() {
        return Err(EngineError::NoStages(definition.name.clone()));
    }

    let mut seen_orders: HashSet<u32> = HashSet::new();
    for stage in &definition.stages {
        if !seen_orders.insert(stage.order) {
            return Err(EngineError::DuplicateStageOrder(stage.order));
        }
    }

    let mut published = definition.clone();
    published.stages.sort_by_key(|s| s.order);

    for stage in &mut published.stages {
        if stage.approver_role.trim().is_empty() {
            return Err(EngineError::EmptyApproverRole { order: stage.order });
        }

        if let Some(hours) = stage.sla_hours {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(EngineError::InvalidSla { order: stage.order, hours });
            }
        }

        let explicit = stage
            .escalation_role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned);
        let resolved = explicit
            .or_else(|| defaults.role_for(definition.workflow_type).map(str::to_owned))
            .ok_or(EngineError::MissingEscalationRole {
                order: stage.order,
                workflow_type: definition.workflow_type,
            })?;
        stage.escalation_role = Some(resolved);
    }

    Ok(published)
}

// ---------------------------------------------------------------------------
// DefinitionStore
// ---------------------------------------------------------------------------

/// Read-mostly store of published definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError>;

    /// Validate and persist.  Publishing an id twice is an error.
    async fn publish(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError>;
}

/// In-memory definition store for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    defaults: EscalationDefaults,
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new(defaults: EscalationDefaults) -> Self {
        Self { defaults, definitions: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError> {
        Ok(self.definitions.read().await.get(&id).cloned())
    }

    async fn publish(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError> {
        let published = validate_definition(&definition, &self.defaults)?;
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&published.id) {
            return Err(EngineError::DefinitionAlreadyPublished(published.id));
        }
        definitions.insert(published.id, published.clone());
        Ok(published)
    }
}
