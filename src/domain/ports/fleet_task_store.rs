use crate::domain::errors::DomainResult;
use crate::domain::models::{FleetTask, FleetTaskStatus, SpawnInput};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of the authoritative admission check.
#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// Row inserted; `active_count` includes the new row.
    Admitted { task: FleetTask, active_count: u32 },
    /// Active count was at or above the limit; nothing was written.
    Denied { active_count: u32 },
}

/// Repository port for fleet task persistence.
///
/// `admit_insert` is the consistency boundary for admission: the active-row
/// count and the insert happen inside one write transaction, serialized for
/// the requesting operator's active rows. Everything else here is plain CRUD.
#[async_trait]
pub trait FleetTaskStore: Send + Sync {
    /// Count the operator's active rows and insert a new task if the count
    /// is below `tier_limit`, atomically.
    ///
    /// Any non-denial failure inside the transaction rolls back before it
    /// propagates; a denial also rolls back and reports the observed count.
    async fn admit_insert(
        &self,
        input: &SpawnInput,
        tier_limit: u32,
    ) -> DomainResult<AdmissionOutcome>;

    /// Count the operator's rows in the active-status set.
    async fn count_active(&self, operator_id: &str) -> DomainResult<u32>;

    /// Get a task by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<FleetTask>>;

    /// Update a task's status, bumping the optimistic version counter.
    async fn update_status(&self, id: Uuid, status: FleetTaskStatus) -> DomainResult<FleetTask>;

    /// List an operator's tasks, newest first.
    async fn list_by_operator(&self, operator_id: &str) -> DomainResult<Vec<FleetTask>>;
}
