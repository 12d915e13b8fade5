//! Port-level error type.

use thiserror::Error;

/// Errors returned by an outbound port.
///
/// The engine uses the variant only for logging; both kinds are isolated to
/// the instance being processed and retried on the next scan:
/// - `Unavailable`: the collaborator is temporarily down (timeout, full buffer).
/// - `Rejected`: the collaborator refused the request outright.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Transient delivery failure.
    #[error("port unavailable: {0}")]
    Unavailable(String),

    /// Permanent refusal by the collaborator.
    #[error("port rejected request: {0}")]
    Rejected(String),
}

impl PortError {
    /// `true` for failures that are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
