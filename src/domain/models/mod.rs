//! Domain models for the magistrate governance engine.

pub mod config;
pub mod fleet;
pub mod reputation;

pub use config::{
    ColdStartStrategy, Config, DatabaseConfig, FleetConfig, LoggingConfig, RampDirection,
    ScoringConfig,
};
pub use fleet::{ConvictionTier, FleetState, FleetTask, FleetTaskStatus, SpawnInput};
pub use reputation::{
    AggregateState, DimensionScore, QualityObservation, ReputationAggregate, TaskTypeCohort,
};
