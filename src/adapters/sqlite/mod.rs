//! SQLite database adapters for the magistrate governance engine.

pub mod connection;
pub mod fleet_task_repository;
pub mod migrations;
pub mod reputation_repository;

pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError};
pub use fleet_task_repository::SqliteFleetTaskRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use reputation_repository::SqliteReputationRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DatabaseConfig;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}
