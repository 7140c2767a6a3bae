//! SQLite implementation of the ReputationStore.
//!
//! Aggregates are persisted whole as a JSON blob; the row also carries the
//! lifecycle state and the event counter so list/count queries never have to
//! parse blobs. Event appends and snapshot compaction each run in one
//! transaction so the counter can't drift from the stream.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AggregateState, QualityObservation, ReputationAggregate, TaskTypeCohort,
};
use crate::domain::ports::ReputationStore;

#[derive(Clone)]
pub struct SqliteReputationRepository {
    pool: SqlitePool,
}

impl SqliteReputationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_aggregate(blob: &str) -> DomainResult<ReputationAggregate> {
        serde_json::from_str(blob).map_err(Into::into)
    }

    fn parse_rows(rows: Vec<(String,)>) -> DomainResult<Vec<ReputationAggregate>> {
        rows.iter()
            .map(|(blob,)| Self::parse_aggregate(blob))
            .collect()
    }
}

#[async_trait]
impl ReputationStore for SqliteReputationRepository {
    async fn get(
        &self,
        collection: &str,
        agent_id: &str,
    ) -> DomainResult<Option<ReputationAggregate>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT aggregate_blob FROM reputation_aggregates WHERE collection = ? AND agent_id = ?",
        )
        .bind(collection)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(blob,)| Self::parse_aggregate(&blob)).transpose()
    }

    async fn put(&self, aggregate: &ReputationAggregate) -> DomainResult<()> {
        let blob = serde_json::to_string(aggregate)?;

        // event_count and snapshot_version are owned by append_event and
        // compact_snapshot; an upsert here must not touch them.
        sqlx::query(
            r#"INSERT INTO reputation_aggregates
               (collection, agent_id, state, aggregate_blob, event_count, snapshot_version, updated_at)
               VALUES (?, ?, ?, ?, 0, 0, ?)
               ON CONFLICT (collection, agent_id) DO UPDATE SET
                   state = excluded.state,
                   aggregate_blob = excluded.aggregate_blob,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&aggregate.collection)
        .bind(&aggregate.agent_id)
        .bind(aggregate.state.as_str())
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cohort(
        &self,
        collection: &str,
        agent_id: &str,
        model: &str,
        task_type: &str,
    ) -> DomainResult<Option<TaskTypeCohort>> {
        let row: Option<(String, String, Option<f64>, i64)> = sqlx::query_as(
            r#"SELECT model, task_type, personal_score, sample_count FROM task_cohorts
               WHERE collection = ? AND agent_id = ? AND model = ? AND task_type = ?"#,
        )
        .bind(collection)
        .bind(agent_id)
        .bind(model)
        .bind(task_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(model, task_type, personal_score, sample_count)| TaskTypeCohort {
            model,
            task_type,
            personal_score,
            sample_count: sample_count as u64,
        }))
    }

    async fn put_cohort(
        &self,
        collection: &str,
        agent_id: &str,
        cohort: &TaskTypeCohort,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO task_cohorts
               (collection, agent_id, model, task_type, personal_score, sample_count, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (collection, agent_id, model, task_type) DO UPDATE SET
                   personal_score = excluded.personal_score,
                   sample_count = excluded.sample_count,
                   updated_at = excluded.updated_at"#,
        )
        .bind(collection)
        .bind(agent_id)
        .bind(&cohort.model)
        .bind(&cohort.task_type)
        .bind(cohort.personal_score)
        .bind(cohort.sample_count as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_cohorts(
        &self,
        collection: &str,
        agent_id: &str,
    ) -> DomainResult<Vec<TaskTypeCohort>> {
        let rows: Vec<(String, String, Option<f64>, i64)> = sqlx::query_as(
            r#"SELECT model, task_type, personal_score, sample_count FROM task_cohorts
               WHERE collection = ? AND agent_id = ?
               ORDER BY model, task_type"#,
        )
        .bind(collection)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(model, task_type, personal_score, sample_count)| TaskTypeCohort {
                model,
                task_type,
                personal_score,
                sample_count: sample_count as u64,
            })
            .collect())
    }

    async fn append_event(
        &self,
        collection: &str,
        agent_id: &str,
        event: &QualityObservation,
    ) -> DomainResult<u64> {
        let payload = serde_json::to_string(event)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reputation_events (collection, agent_id, payload, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(agent_id)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE reputation_aggregates SET event_count = event_count + 1
             WHERE collection = ? AND agent_id = ?",
        )
        .bind(collection)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // No aggregate row to count against; the event must not land.
            tx.rollback().await?;
            return Err(DomainError::AggregateNotFound {
                collection: collection.to_string(),
                agent_id: agent_id.to_string(),
            });
        }

        let (event_count,): (i64,) = sqlx::query_as(
            "SELECT event_count FROM reputation_aggregates WHERE collection = ? AND agent_id = ?",
        )
        .bind(collection)
        .bind(agent_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event_count as u64)
    }

    async fn list_all(&self, collection: &str) -> DomainResult<Vec<ReputationAggregate>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT aggregate_blob FROM reputation_aggregates WHERE collection = ? ORDER BY agent_id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_rows(rows)
    }

    async fn list_cold(&self, collection: &str) -> DomainResult<Vec<ReputationAggregate>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT aggregate_blob FROM reputation_aggregates
               WHERE collection = ? AND state = 'cold' ORDER BY agent_id"#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_rows(rows)
    }

    async fn count(&self, collection: &str) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM reputation_aggregates WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn count_by_state(
        &self,
        collection: &str,
    ) -> DomainResult<HashMap<AggregateState, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM reputation_aggregates WHERE collection = ? GROUP BY state",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (state, count) in rows {
            let state = AggregateState::from_str(&state).ok_or_else(|| {
                DomainError::SerializationError(format!("Invalid aggregate state: {state}"))
            })?;
            counts.insert(state, count as u64);
        }
        Ok(counts)
    }

    async fn needs_compaction(
        &self,
        collection: &str,
        agent_id: &str,
        threshold: u64,
    ) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT event_count FROM reputation_aggregates WHERE collection = ? AND agent_id = ?",
        )
        .bind(collection)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some_and(|(count,)| count as u64 >= threshold))
    }

    async fn compact_snapshot(&self, aggregate: &ReputationAggregate) -> DomainResult<u64> {
        let blob = serde_json::to_string(aggregate)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE reputation_aggregates
               SET aggregate_blob = ?, state = ?, event_count = 0,
                   snapshot_version = snapshot_version + 1, updated_at = ?
               WHERE collection = ? AND agent_id = ?"#,
        )
        .bind(blob)
        .bind(aggregate.state.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&aggregate.collection)
        .bind(&aggregate.agent_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::AggregateNotFound {
                collection: aggregate.collection.clone(),
                agent_id: aggregate.agent_id.clone(),
            });
        }

        let (version,): (i64,) = sqlx::query_as(
            "SELECT snapshot_version FROM reputation_aggregates WHERE collection = ? AND agent_id = ?",
        )
        .bind(&aggregate.collection)
        .bind(&aggregate.agent_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(version as u64)
    }
}
