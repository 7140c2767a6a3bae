//! Magistrate - reputation scoring and fleet admission governance.
//!
//! Magistrate is the governance core of a backend that mediates LLM access
//! for wallet-identified operators. It keeps dampened, Bayesian-blended
//! reputation scores for agents and enforces per-tier concurrency ceilings
//! on agent spawns, with an audit trail over every governed mutation.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, ports, and errors
//! - **Service Layer** (`services`): scoring pipeline and admission governor
//! - **Adapters** (`adapters`): SQLite persistence behind the domain ports
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use magistrate::adapters::sqlite::{initialize_database, SqliteFleetTaskRepository};
//! use magistrate::services::FleetAdmissionGovernor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = magistrate::ConfigLoader::load()?;
//!     let pool = initialize_database(&config.database).await?;
//!     let store = std::sync::Arc::new(SqliteFleetTaskRepository::new(pool));
//!     let _governor = FleetAdmissionGovernor::new(store, &config.fleet);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{AdmissionDenial, DomainError, DomainResult};
pub use domain::models::{
    AggregateState, Config, ConvictionTier, DatabaseConfig, FleetConfig, FleetState, FleetTask,
    FleetTaskStatus, LoggingConfig, QualityObservation, ReputationAggregate, ScoringConfig,
    SpawnInput, TaskTypeCohort,
};
pub use domain::ports::{AdmissionOutcome, FleetTaskStore, ReputationStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{FleetAdmissionGovernor, GovernorRegistry, ReputationService};
