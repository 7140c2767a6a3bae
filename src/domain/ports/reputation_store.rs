use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AggregateState, QualityObservation, ReputationAggregate, TaskTypeCohort,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Repository port for reputation persistence.
///
/// Aggregates are stored whole (as a versioned blob) alongside an
/// append-only event stream; the event counter on the aggregate row drives
/// compaction decisions.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Get an aggregate by (collection, agent).
    async fn get(&self, collection: &str, agent_id: &str)
        -> DomainResult<Option<ReputationAggregate>>;

    /// Insert or replace an aggregate.
    async fn put(&self, aggregate: &ReputationAggregate) -> DomainResult<()>;

    /// Get one task cohort for an agent.
    async fn get_cohort(
        &self,
        collection: &str,
        agent_id: &str,
        model: &str,
        task_type: &str,
    ) -> DomainResult<Option<TaskTypeCohort>>;

    /// Insert or replace a task cohort.
    async fn put_cohort(
        &self,
        collection: &str,
        agent_id: &str,
        cohort: &TaskTypeCohort,
    ) -> DomainResult<()>;

    /// List all cohorts for an agent.
    async fn list_cohorts(
        &self,
        collection: &str,
        agent_id: &str,
    ) -> DomainResult<Vec<TaskTypeCohort>>;

    /// Append a quality event and increment the aggregate's event counter.
    ///
    /// The insert and the increment must happen in one transaction: a
    /// non-atomic pairing would make compaction decisions operate on stale
    /// counts. Returns the new event count.
    async fn append_event(
        &self,
        collection: &str,
        agent_id: &str,
        event: &QualityObservation,
    ) -> DomainResult<u64>;

    /// List every aggregate in a collection (startup seeding).
    async fn list_all(&self, collection: &str) -> DomainResult<Vec<ReputationAggregate>>;

    /// List aggregates still in the cold state.
    async fn list_cold(&self, collection: &str) -> DomainResult<Vec<ReputationAggregate>>;

    /// Count aggregates in a collection.
    async fn count(&self, collection: &str) -> DomainResult<u64>;

    /// Count aggregates grouped by lifecycle state.
    async fn count_by_state(
        &self,
        collection: &str,
    ) -> DomainResult<HashMap<AggregateState, u64>>;

    /// Whether the aggregate's event count has reached the given threshold.
    async fn needs_compaction(
        &self,
        collection: &str,
        agent_id: &str,
        threshold: u64,
    ) -> DomainResult<bool>;

    /// Snapshot the aggregate and reset its event counter, transactionally.
    /// Returns the new snapshot version.
    async fn compact_snapshot(&self, aggregate: &ReputationAggregate) -> DomainResult<u64>;
}
