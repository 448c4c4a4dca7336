//! Tracing subscriber installation

use crate::config::LoggingConfig;
use crate::error::RuntimeError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured filter. Installing twice
/// is an error, not a panic.
///
/// # Errors
/// Invalid filter directive, or a subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> Result<(), RuntimeError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| RuntimeError::Telemetry(format!("bad filter '{}': {e}", config.filter)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| RuntimeError::Telemetry(e.to_string()))
}
