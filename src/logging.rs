//! Structured logging via the `tracing` crate.
//!
//! Level and format come from configuration, with the `RUNLEDGER_LOG`
//! environment variable taking precedence (standard env-filter syntax).

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::RunError;

/// Environment variable holding an env-filter directive set.
pub const LOG_ENV_VAR: &str = "RUNLEDGER_LOG";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: "text" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Initialize the global tracing subscriber. Logs go to stderr so that
/// command output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), RunError> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        "text" => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        other => {
            return Err(RunError::Config {
                path: LOG_ENV_VAR.into(),
                detail: format!("invalid log format: {other} (must be 'text' or 'json')"),
            })
        }
    }
    .map_err(|e| RunError::Config {
        path: LOG_ENV_VAR.into(),
        detail: format!("failed to initialize logging: {e}"),
    })
}
