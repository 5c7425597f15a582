//! Call session configuration.
//!
//! Configuration is loaded from environment variables. The user bearer token
//! is redacted in Debug output.

use crate::credentials::CredentialServiceConfig;
use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default maximum number of rejoin attempts after a lost connection.
pub const DEFAULT_MAX_REJOIN_ATTEMPTS: u32 = 5;

/// Default delay before the first rejoin (lets the transport's own retry run).
pub const DEFAULT_REJOIN_DELAY_MS: u64 = 2_000;

/// Default base delay for exponential rejoin backoff.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Default cap for exponential rejoin backoff.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 10_000;

/// Default time a finalised caption stays visible.
pub const DEFAULT_CAPTION_EXPIRY_MS: u64 = 500;

/// Default lifetime of an interim caption that stops receiving updates.
pub const DEFAULT_CAPTION_INTERIM_TTL_MS: u64 = 5_000;

/// Default credential service HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Timing and retry parameters for a call session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum rejoin attempts before giving up (`maxAttempts`).
    pub max_rejoin_attempts: u32,
    /// Delay between a lost connection and the first rejoin attempt.
    pub rejoin_delay: Duration,
    /// Base delay for exponential backoff between failed rejoins.
    pub backoff_base: Duration,
    /// Upper bound for the backoff delay.
    pub backoff_max: Duration,
    /// How long a finalised caption remains visible (`expiryDelay`).
    pub caption_expiry: Duration,
    /// How long an interim caption survives without updates.
    pub caption_interim_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rejoin_attempts: DEFAULT_MAX_REJOIN_ATTEMPTS,
            rejoin_delay: Duration::from_millis(DEFAULT_REJOIN_DELAY_MS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            caption_expiry: Duration::from_millis(DEFAULT_CAPTION_EXPIRY_MS),
            caption_interim_ttl: Duration::from_millis(DEFAULT_CAPTION_INTERIM_TTL_MS),
        }
    }
}

impl SessionConfig {
    /// Delay before the next rejoin after `attempts` failed attempts.
    ///
    /// `min(base * 2^attempts, max)`, saturating on overflow.
    #[must_use]
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let base_ms = u64::try_from(self.backoff_base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.backoff_max.as_millis()).unwrap_or(u64::MAX);
        let factor = 2u64.checked_pow(attempts).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}

/// Full configuration for an embedded call session.
#[derive(Clone)]
pub struct Config {
    /// Session timing parameters.
    pub session: SessionConfig,
    /// Base URL of the credential service.
    pub credentials_endpoint: String,
    /// Room/session name used when refreshing credentials.
    pub room_name: String,
    /// User bearer token for the credential service.
    /// Protected by `SecretString` to prevent accidental logging.
    pub auth_token: SecretString,
    /// Credential service request timeout.
    pub http_timeout: Duration,
    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("session", &self.session)
            .field("credentials_endpoint", &self.credentials_endpoint)
            .field("room_name", &self.room_name)
            .field("auth_token", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let credentials_endpoint = required(vars, "CALL_CREDENTIALS_ENDPOINT")?;
        let room_name = required(vars, "CALL_ROOM_NAME")?;
        let auth_token = SecretString::from(required(vars, "CALL_AUTH_TOKEN")?);

        let session = SessionConfig {
            max_rejoin_attempts: parsed(
                vars,
                "CALL_MAX_REJOIN_ATTEMPTS",
                DEFAULT_MAX_REJOIN_ATTEMPTS,
            )?,
            rejoin_delay: millis(vars, "CALL_REJOIN_DELAY_MS", DEFAULT_REJOIN_DELAY_MS)?,
            backoff_base: millis(vars, "CALL_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)?,
            backoff_max: millis(vars, "CALL_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)?,
            caption_expiry: millis(vars, "CALL_CAPTION_EXPIRY_MS", DEFAULT_CAPTION_EXPIRY_MS)?,
            caption_interim_ttl: millis(
                vars,
                "CALL_CAPTION_INTERIM_TTL_MS",
                DEFAULT_CAPTION_INTERIM_TTL_MS,
            )?,
        };

        if session.caption_interim_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CALL_CAPTION_INTERIM_TTL_MS must be greater than zero".to_string(),
            ));
        }

        if session.backoff_base > session.backoff_max {
            return Err(ConfigError::InvalidValue(
                "CALL_BACKOFF_BASE_MS must not exceed CALL_BACKOFF_MAX_MS".to_string(),
            ));
        }

        let http_timeout = millis(vars, "CALL_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?;

        let observability = ObservabilityConfig {
            log_level: vars
                .get("CALL_LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: parsed(vars, "CALL_JSON_LOGS", false)?,
        };

        Ok(Config {
            session,
            credentials_endpoint,
            room_name,
            auth_token,
            http_timeout,
            observability,
        })
    }

    /// Settings for the HTTP credential refresher.
    #[must_use]
    pub fn credential_service(&self) -> CredentialServiceConfig {
        CredentialServiceConfig::new(
            self.credentials_endpoint.clone(),
            self.room_name.clone(),
            self.auth_token.clone(),
        )
        .with_http_timeout(self.http_timeout)
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    vars.get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn millis(vars: &HashMap<String, String>, key: &str, default: u64) -> Result<Duration, ConfigError> {
    parsed(vars, key, default).map(Duration::from_millis)
}
