//! Configuration models for the magistrate governance engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scoring: ScoringConfig,
    pub fleet: FleetConfig,
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path or URL (e.g. `sqlite:.magistrate/magistrate.db`)
    pub path: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Pool acquire timeout in seconds
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "sqlite:.magistrate/magistrate.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 3,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error
    pub level: String,
    /// One of: json, pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Direction of the EMA alpha ramp as evidence accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampDirection {
    /// Conservative-first: alpha rises from min to max
    Ascending,
    /// Responsive-first: alpha starts at max and decays to min
    Descending,
}

impl Default for RampDirection {
    fn default() -> Self {
        Self::Ascending
    }
}

/// How the first observation seeds a personal score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartStrategy {
    /// First observation taken verbatim
    Direct,
    /// First observation blended toward the neutral 0.5 prior
    Bayesian,
}

impl Default for ColdStartStrategy {
    fn default() -> Self {
        Self::Bayesian
    }
}

/// Scoring engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// EMA alpha at the conservative end of the ramp
    pub alpha_min: f64,
    /// EMA alpha at the responsive end of the ramp
    pub alpha_max: f64,
    /// Observations needed to traverse the full alpha ramp
    pub ramp_samples: u64,
    pub ramp: RampDirection,
    pub cold_start: ColdStartStrategy,
    /// Prior strength for Bayesian blending
    pub pseudo_count: u64,
    /// Effective-sample multiplier for cohorts matching the requested task type
    pub task_type_weight_multiplier: f64,
    /// Observations at which an aggregate becomes established
    pub established_threshold: u64,
    /// Observations at which an aggregate becomes authoritative
    pub authoritative_threshold: u64,
    /// Event count that triggers a transactional snapshot + counter reset
    pub compaction_threshold: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha_min: 0.1,
            alpha_max: 0.5,
            ramp_samples: 10,
            ramp: RampDirection::default(),
            cold_start: ColdStartStrategy::default(),
            pseudo_count: 10,
            task_type_weight_multiplier: 3.0,
            established_threshold: 10,
            authoritative_threshold: 50,
            compaction_threshold: 100,
        }
    }
}

/// Fleet admission governor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Per-deployment tier limit overrides, keyed by tier name.
    /// Tiers absent from the map keep their built-in defaults.
    pub tier_limits: HashMap<String, u32>,
    /// TTL for the advisory active-count cache, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            tier_limits: HashMap::new(),
            cache_ttl_secs: 5,
        }
    }
}
