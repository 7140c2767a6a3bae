//! SQLite implementation of the FleetTaskStore.
//!
//! The admission path is the consistency boundary of the whole governor.
//! SQLite has no `SELECT ... FOR UPDATE`; the equivalent serialization is
//! `BEGIN IMMEDIATE`, which takes the database write lock before the count
//! is read, so concurrent admissions are strictly ordered. The count query
//! stays scoped to the requesting operator's active rows, which is the
//! shape a row-locking backend would serialize on.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FleetTask, FleetTaskStatus, SpawnInput};
use crate::domain::ports::{AdmissionOutcome, FleetTaskStore};

#[derive(Clone)]
pub struct SqliteFleetTaskRepository {
    pool: SqlitePool,
}

impl SqliteFleetTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `'proposed', 'spawning', ...` for SQL `IN` clauses. Built from the
    /// domain status machine so the two can't drift apart.
    fn active_status_list() -> String {
        FleetTaskStatus::active_set()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn count_active_on(
        conn: &mut PoolConnection<Sqlite>,
        operator_id: &str,
    ) -> DomainResult<u32> {
        let query = format!(
            "SELECT COUNT(*) FROM fleet_tasks WHERE operator_id = ? AND status IN ({})",
            Self::active_status_list()
        );
        let (count,): (i64,) = sqlx::query_as(&query)
            .bind(operator_id)
            .fetch_one(&mut **conn)
            .await?;
        Ok(count as u32)
    }

    async fn insert_on(conn: &mut PoolConnection<Sqlite>, task: &FleetTask) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO fleet_tasks (id, operator_id, agent_type, title, status,
               retry_count, max_retries, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.operator_id)
        .bind(&task.agent_type)
        .bind(&task.title)
        .bind(task.status.as_str())
        .bind(task.retry_count as i32)
        .bind(task.max_retries as i32)
        .bind(task.version as i64)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    /// Count-then-insert body, run inside an open transaction.
    async fn admit_in_tx(
        conn: &mut PoolConnection<Sqlite>,
        input: &SpawnInput,
        tier_limit: u32,
    ) -> DomainResult<AdmissionOutcome> {
        let active_count = Self::count_active_on(conn, &input.operator_id).await?;
        if active_count >= tier_limit {
            return Ok(AdmissionOutcome::Denied { active_count });
        }

        let task = FleetTask::from_input(input);
        Self::insert_on(conn, &task).await?;
        Ok(AdmissionOutcome::Admitted {
            task,
            active_count: active_count + 1,
        })
    }
}

#[async_trait]
impl FleetTaskStore for SqliteFleetTaskRepository {
    async fn admit_insert(
        &self,
        input: &SpawnInput,
        tier_limit: u32,
    ) -> DomainResult<AdmissionOutcome> {
        // The connection is checked out once and released unconditionally
        // when it drops, in every path below.
        let mut conn = self.pool.acquire().await?;

        // Write lock first: serializes concurrent admissions before the
        // count is read.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::admit_in_tx(&mut conn, input, tier_limit).await {
            Ok(outcome @ AdmissionOutcome::Admitted { .. }) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(e.into());
                }
                Ok(outcome)
            }
            Ok(outcome @ AdmissionOutcome::Denied { .. }) => {
                // Nothing was written; release the lock.
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Ok(outcome)
            }
            Err(e) => {
                // Non-denial failure: roll back before rethrow.
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn count_active(&self, operator_id: &str) -> DomainResult<u32> {
        let mut conn = self.pool.acquire().await?;
        Self::count_active_on(&mut conn, operator_id).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<FleetTask>> {
        let row: Option<FleetTaskRow> = sqlx::query_as("SELECT * FROM fleet_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_status(&self, id: Uuid, status: FleetTaskStatus) -> DomainResult<FleetTask> {
        let mut task = self
            .get(id)
            .await?
            .ok_or(DomainError::TaskNotFound(id))?;
        let expected_version = task.version;

        task.transition_to(status)
            .map_err(|reason| DomainError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: status.as_str().to_string(),
                reason,
            })?;

        let result = sqlx::query(
            r#"UPDATE fleet_tasks SET status = ?, retry_count = ?, version = ?, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(task.status.as_str())
        .bind(task.retry_count as i32)
        .bind(task.version as i64)
        .bind(task.updated_at.to_rfc3339())
        .bind(id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ConcurrencyConflict {
                entity: "fleet_task".to_string(),
                id: id.to_string(),
            });
        }

        Ok(task)
    }

    async fn list_by_operator(&self, operator_id: &str) -> DomainResult<Vec<FleetTask>> {
        let rows: Vec<FleetTaskRow> = sqlx::query_as(
            "SELECT * FROM fleet_tasks WHERE operator_id = ? ORDER BY created_at DESC",
        )
        .bind(operator_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct FleetTaskRow {
    id: String,
    operator_id: String,
    agent_type: Option<String>,
    title: String,
    status: String,
    retry_count: i32,
    max_retries: i32,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<FleetTaskRow> for FleetTask {
    type Error = DomainError;

    fn try_from(row: FleetTaskRow) -> Result<Self, Self::Error> {
        let id = crate::adapters::sqlite::parse_uuid(&row.id)?;

        let status = FleetTaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;

        let created_at = crate::adapters::sqlite::parse_datetime(&row.created_at)?;
        let updated_at = crate::adapters::sqlite::parse_datetime(&row.updated_at)?;

        Ok(FleetTask {
            id,
            operator_id: row.operator_id,
            agent_type: row.agent_type,
            title: row.title,
            status,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            version: row.version as u64,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteFleetTaskRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteFleetTaskRepository::new(pool)
    }

    #[tokio::test]
    async fn test_admit_and_get() {
        let repo = setup_test_repo().await;
        let input = SpawnInput::new("op-1", "Ship the feature").with_agent_type("coder");

        let outcome = repo.admit_insert(&input, 3).await.unwrap();
        let AdmissionOutcome::Admitted { task, active_count } = outcome else {
            panic!("expected admission");
        };
        assert_eq!(active_count, 1);

        let retrieved = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(retrieved.operator_id, "op-1");
        assert_eq!(retrieved.agent_type.as_deref(), Some("coder"));
        assert_eq!(retrieved.status, FleetTaskStatus::Proposed);
    }

    #[tokio::test]
    async fn test_denial_writes_nothing() {
        let repo = setup_test_repo().await;
        let input = SpawnInput::new("op-1", "First");
        repo.admit_insert(&input, 1).await.unwrap();

        let outcome = repo
            .admit_insert(&SpawnInput::new("op-1", "Second"), 1)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AdmissionOutcome::Denied { active_count: 1 }
        ));
        assert_eq!(repo.count_active("op-1").await.unwrap(), 1);
        assert_eq!(repo.list_by_operator("op-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_operators_count_independently() {
        let repo = setup_test_repo().await;
        repo.admit_insert(&SpawnInput::new("op-1", "t"), 1)
            .await
            .unwrap();

        let outcome = repo
            .admit_insert(&SpawnInput::new("op-2", "t"), 1)
            .await
            .unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Admitted { .. }));
        assert_eq!(repo.count_active("op-1").await.unwrap(), 1);
        assert_eq!(repo.count_active("op-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_terminal_statuses_free_capacity() {
        let repo = setup_test_repo().await;
        let AdmissionOutcome::Admitted { task, .. } =
            repo.admit_insert(&SpawnInput::new("op-1", "t"), 1).await.unwrap()
        else {
            panic!("expected admission");
        };

        repo.update_status(task.id, FleetTaskStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(repo.count_active("op-1").await.unwrap(), 0);

        // Slot is free again.
        let outcome = repo
            .admit_insert(&SpawnInput::new("op-1", "t2"), 1)
            .await
            .unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Admitted { .. }));
    }

    #[tokio::test]
    async fn test_update_status_rejects_invalid_transition() {
        let repo = setup_test_repo().await;
        let AdmissionOutcome::Admitted { task, .. } =
            repo.admit_insert(&SpawnInput::new("op-1", "t"), 1).await.unwrap()
        else {
            panic!("expected admission");
        };

        // Proposed cannot jump straight to merged.
        let err = repo
            .update_status(task.id, FleetTaskStatus::Merged)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        // Cancelled is a dead end.
        repo.update_status(task.id, FleetTaskStatus::Cancelled)
            .await
            .unwrap();
        let err = repo
            .update_status(task.id, FleetTaskStatus::Spawning)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_status_bumps_version() {
        let repo = setup_test_repo().await;
        let AdmissionOutcome::Admitted { task, .. } =
            repo.admit_insert(&SpawnInput::new("op-1", "t"), 1).await.unwrap()
        else {
            panic!("expected admission");
        };
        assert_eq!(task.version, 1);

        let updated = repo
            .update_status(task.id, FleetTaskStatus::Spawning)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let reloaded = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, 2);
        assert_eq!(reloaded.status, FleetTaskStatus::Spawning);
    }
}
