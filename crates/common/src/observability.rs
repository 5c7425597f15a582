//! Tracing subscriber initialisation.
//!
//! `RUST_LOG` wins over the configured level so operators can raise verbosity
//! for a single run without touching configuration.

use crate::config::ObservabilityConfig;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// The configured filter directive could not be parsed.
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    /// A global subscriber was already installed.
    #[error("Tracing subscriber already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Build the `EnvFilter` for the given configuration.
///
/// # Errors
///
/// Returns `ObservabilityError::InvalidFilter` if neither `RUST_LOG` nor the
/// configured level parse as a filter directive.
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter, ObservabilityError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            ObservabilityError::InvalidFilter {
                directive: config.log_level.clone(),
                reason: e.to_string(),
            }
        }),
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = build_filter(config)?;

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    result.map_err(|e| ObservabilityError::AlreadyInitialised(e.to_string()))
}
