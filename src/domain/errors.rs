//! Domain errors for the magistrate governance engine.

use thiserror::Error;

/// Diagnostic payload attached to an admission denial.
///
/// Carries everything the caller needs to render a useful rejection:
/// who asked, at what tier, and where the ceiling sat when the
/// authoritative count was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDenial {
    pub operator_id: String,
    pub tier: String,
    pub active_count: u32,
    pub tier_limit: u32,
    pub reason: String,
}

impl std::fmt::Display for AdmissionDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operator {} (tier {}): {} ({}/{} active)",
            self.operator_id, self.tier, self.reason, self.active_count, self.tier_limit
        )
    }
}

/// Domain-level errors that can occur in the magistrate system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Spawn admission denied: {0}")]
    AdmissionDenied(AdmissionDenial),

    #[error("Aggregate not found: {collection}/{agent_id}")]
    AggregateNotFound { collection: String, agent_id: String },

    #[error("Fleet task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Unknown conviction tier: {0}")]
    UnknownTier(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is an expected admission denial rather than an
    /// infrastructure failure.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::AdmissionDenied(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
