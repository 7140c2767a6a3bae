//! Logging initialization using tracing.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::LoggingConfig;

/// Initialize the global tracing subscriber from logging config.
///
/// `RUST_LOG` still overrides the configured level. Safe to call once per
/// process; a second call returns an error from the subscriber registry.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match config.format.as_str() {
        "json" => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        _ => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("Invalid log level: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }
}
