//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid alpha range: min {0} must not exceed max {1}, both in (0, 1]")]
    InvalidAlphaRange(f64, f64),

    #[error("Invalid ramp_samples: must be at least 1")]
    InvalidRampSamples,

    #[error("Invalid pseudo_count: must be at least 1")]
    InvalidPseudoCount,

    #[error(
        "Invalid lifecycle thresholds: established ({0}) must be below authoritative ({1})"
    )]
    InvalidThresholds(u64, u64),

    #[error("Invalid task_type_weight_multiplier: {0}. Must be at least 1.0")]
    InvalidTaskTypeWeight(f64),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .magistrate/config.yaml (project config)
    /// 3. .magistrate/local.yaml (local overrides, optional)
    /// 4. Environment variables (MAGISTRATE_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".magistrate/config.yaml"))
            .merge(Yaml::file(".magistrate/local.yaml"))
            .merge(Env::prefixed("MAGISTRATE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let scoring = &config.scoring;
        if scoring.alpha_min <= 0.0
            || scoring.alpha_max > 1.0
            || scoring.alpha_min > scoring.alpha_max
        {
            return Err(ConfigError::InvalidAlphaRange(
                scoring.alpha_min,
                scoring.alpha_max,
            ));
        }
        if scoring.ramp_samples == 0 {
            return Err(ConfigError::InvalidRampSamples);
        }
        if scoring.pseudo_count == 0 {
            return Err(ConfigError::InvalidPseudoCount);
        }
        if scoring.established_threshold >= scoring.authoritative_threshold {
            return Err(ConfigError::InvalidThresholds(
                scoring.established_threshold,
                scoring.authoritative_threshold,
            ));
        }
        if scoring.task_type_weight_multiplier < 1.0 {
            return Err(ConfigError::InvalidTaskTypeWeight(
                scoring.task_type_weight_multiplier,
            ));
        }

        Ok(())
    }
}
