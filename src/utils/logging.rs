//! Structured logging setup.
//!
//! The library itself only emits `tracing` events; applications call
//! [`init_logging`] once at startup to install a subscriber. `RUST_LOG`
//! overrides the configured level when set.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber for the given configuration.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ProtocolError::ConfigError(format!("Failed to init logging: {e}")))?;
    tracing::info!(app = %config.app_name, "Logging initialized");
    Ok(())
}
