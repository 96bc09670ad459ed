//! Structured logging setup.
//!
//! Logs are written to stderr so stdout stays clean for command output.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

const DEFAULT_LEVEL: &str = "warn";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human readable.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// JSON objects for log aggregation.
    Json,
}

/// Filter precedence: `--log-level`, then `RUST_LOG`, then `warn`.
fn env_filter(level: Option<&str>) -> Result<EnvFilter, CliError> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LEVEL)),
    };
    filter.map_err(|error| CliError::Logging(error.to_string()))
}

pub fn init_logging(level: Option<&str>, format: LogFormat) -> Result<(), CliError> {
    let env_filter = env_filter(level)?;

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|error| CliError::Logging(error.to_string()))?;

    tracing::debug!(format = ?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_must_parse() {
        assert!(env_filter(Some("mktdata_core=debug")).is_ok());
        assert!(matches!(env_filter(Some("mktdata_core=loud")), Err(CliError::Logging(_))));
    }
}
