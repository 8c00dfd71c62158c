//! Process-wide logging setup.
//!
//! Library code logs through `tracing`, and the persistence layer through
//! `log`; both end up in the same subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{JobfishError, Result};

const DEFAULT_FILTER: &str = "info,jobfish=debug";

/// Builds the filter: `RUST_LOG` wins, then the configured directives, then
/// the default.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives)
        .map_err(|e| JobfishError::Logging(format!("invalid filter '{}': {}", directives, e)))
}

/// Installs the global subscriber. Call once, at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    tracing_log::LogTracer::init()
        .map_err(|e| JobfishError::Logging(format!("log bridge: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_target(true)),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
    };
    installed.map_err(|e| JobfishError::Logging(e.to_string()))
}
