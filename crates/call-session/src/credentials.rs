//! Credential refresh for rejoining a session.
//!
//! When the transport drops a connection, the controller obtains fresh join
//! credentials before reconnecting. The refresher must tell apart two kinds of
//! failure:
//!
//! - **Session gone** (HTTP 404/410): the room no longer exists. Terminal.
//! - **Anything else**: network loss, server errors, rejected auth. Retryable
//!   with backoff until the rejoin budget is spent.
//!
//! # Security
//!
//! - The user bearer token and the returned access token are `SecretString`
//! - Refresh events are logged without token values
//! - HTTP timeouts prevent a hung request from stalling a rejoin forever

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Join credentials for the transport.
///
/// Opaque to the controller: it only hands them to `Transport::connect`.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Access token for the media server.
    pub token: SecretString,
    /// Media server URL.
    pub url: String,
}

impl Credentials {
    /// Create credentials from a token and URL.
    #[must_use]
    pub fn new(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            url: url.into(),
        }
    }
}

/// Errors that can occur while refreshing credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// The session no longer exists (404/410). Never retried.
    #[error("Session no longer exists")]
    SessionGone,

    /// The credential service rejected the user (401/403).
    #[error("Refresh rejected: {0}")]
    Rejected(String),

    /// Network failure or unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body could not be parsed.
    #[error("Invalid credential response: {0}")]
    InvalidResponse(String),

    /// The refresher is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RefreshError {
    /// Whether this failure ends the session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RefreshError::SessionGone)
    }

    /// Error category for metrics.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            RefreshError::SessionGone => "session_gone",
            RefreshError::Rejected(_) => "rejected",
            RefreshError::Http(_) => "http",
            RefreshError::InvalidResponse(_) => "invalid_response",
            RefreshError::Configuration(_) => "configuration",
        }
    }
}

/// Source of fresh join credentials.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Obtain new credentials for the current session.
    async fn refresh(&self) -> Result<Credentials, RefreshError>;
}

/// Configuration for [`HttpCredentialRefresher`].
#[derive(Clone)]
pub struct CredentialServiceConfig {
    /// Base URL of the credential service (e.g., `https://api.example.com`).
    pub endpoint: String,
    /// Name of the room being rejoined.
    pub room_name: String,
    /// User bearer token.
    pub auth_token: SecretString,
    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl fmt::Debug for CredentialServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("room_name", &self.room_name)
            .field("auth_token", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl CredentialServiceConfig {
    /// Create a configuration with the default timeout.
    #[must_use]
    pub fn new(endpoint: String, room_name: String, auth_token: SecretString) -> Self {
        Self {
            endpoint,
            room_name,
            auth_token,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Credential response from the service.
#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    url: String,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("url", &self.url)
            .finish()
    }
}

/// Refreshes credentials from the room token endpoint over HTTP.
pub struct HttpCredentialRefresher {
    token_url: reqwest::Url,
    auth_token: SecretString,
    http_client: reqwest::Client,
}

impl fmt::Debug for HttpCredentialRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCredentialRefresher")
            .field("token_url", &self.token_url.as_str())
            .field("auth_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpCredentialRefresher {
    /// Build a refresher.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::Configuration` if the endpoint is not a valid base
    /// URL or the HTTP client cannot be built.
    pub fn new(config: &CredentialServiceConfig) -> Result<Self, RefreshError> {
        let token_url = token_url(&config.endpoint, &config.room_name)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RefreshError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            token_url,
            auth_token: config.auth_token.clone(),
            http_client,
        })
    }
}

/// `{endpoint}/api/v1/rooms/{room}/token`, with the room name percent-encoded.
fn token_url(endpoint: &str, room_name: &str) -> Result<reqwest::Url, RefreshError> {
    let mut url = reqwest::Url::parse(endpoint)
        .map_err(|e| RefreshError::Configuration(format!("Invalid endpoint: {e}")))?;

    url.path_segments_mut()
        .map_err(|()| RefreshError::Configuration("Endpoint cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(["api", "v1", "rooms", room_name, "token"]);

    Ok(url)
}

#[async_trait]
impl CredentialRefresher for HttpCredentialRefresher {
    #[instrument(skip_all, name = "call.credentials.refresh")]
    async fn refresh(&self) -> Result<Credentials, RefreshError> {
        debug!(
            target: "call.credentials",
            url = %self.token_url,
            "Requesting fresh session credentials"
        );

        let response = self
            .http_client
            .post(self.token_url.clone())
            .bearer_auth(self.auth_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                debug!(target: "call.credentials", error = %e, "HTTP request failed");
                RefreshError::Http(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                warn!(target: "call.credentials", error = %e, "Failed to parse credential response");
                RefreshError::InvalidResponse(e.to_string())
            })?;

            if body.token.is_empty() || body.url.is_empty() {
                return Err(RefreshError::InvalidResponse(
                    "empty token or url".to_string(),
                ));
            }

            debug!(target: "call.credentials", url = %body.url, "Credentials refreshed");
            Ok(Credentials::new(body.token, body.url))
        } else if status.as_u16() == 404 || status.as_u16() == 410 {
            warn!(
                target: "call.credentials",
                status = %status,
                "Session no longer exists"
            );
            Err(RefreshError::SessionGone)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "call.credentials", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "call.credentials",
                status = %status,
                "Credential refresh rejected"
            );
            // Body at trace level only; it may echo request details
            trace!(target: "call.credentials", body = %body, "Rejection response body");
            Err(RefreshError::Rejected(format!("Status {status}")))
        } else {
            warn!(
                target: "call.credentials",
                status = %status,
                "Unexpected response from credential service"
            );
            Err(RefreshError::Http(format!("Unexpected status: {status}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresher_for(server: &MockServer, room: &str) -> HttpCredentialRefresher {
        let config = CredentialServiceConfig::new(
            server.uri(),
            room.to_string(),
            SecretString::from("user-bearer"),
        );
        HttpCredentialRefresher::new(&config).unwrap()
    }

    #[test]
    fn test_token_url_building() {
        let url = token_url("https://api.example.com", "standup").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v1/rooms/standup/token"
        );

        let url = token_url("https://api.example.com/", "design review").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v1/rooms/design%20review/token"
        );

        assert!(matches!(
            token_url("not a url", "room"),
            Err(RefreshError::Configuration(_))
        ));
        assert!(matches!(
            token_url("mailto:ops@example.com", "room"),
            Err(RefreshError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = CredentialServiceConfig::new(
            "https://api.example.com".to_string(),
            "room".to_string(),
            SecretString::from("very-secret-bearer"),
        )
        .with_http_timeout(Duration::from_secs(3));

        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret-bearer"));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_only_session_gone_is_terminal() {
        assert!(RefreshError::SessionGone.is_terminal());
        assert!(!RefreshError::Rejected("401".to_string()).is_terminal());
        assert!(!RefreshError::Http("timeout".to_string()).is_terminal());
        assert!(!RefreshError::InvalidResponse("x".to_string()).is_terminal());
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/rooms/standup/token"))
            .and(header("authorization", "Bearer user-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "fresh-access-token",
                "url": "wss://rtc.example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = refresher_for(&server, "standup").refresh().await.unwrap();
        assert_eq!(creds.token.expose_secret(), "fresh-access-token");
        assert_eq!(creds.url, "wss://rtc.example.com");
    }

    #[tokio::test]
    async fn test_refresh_not_found_is_session_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "gone").refresh().await.unwrap_err();
        assert_eq!(err, RefreshError::SessionGone);
    }

    #[tokio::test]
    async fn test_refresh_gone_is_session_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "ended").refresh().await.unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_refresh_unauthorized_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "room").refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::Rejected(_)));
        assert!(!err.is_terminal());
        // Body is never part of the error message
        assert!(!err.to_string().contains("token expired"));
    }

    #[tokio::test]
    async fn test_refresh_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "room").refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::Http(_)));
        assert_eq!(err.error_type(), "http");
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "wrong-shape"
            })))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "room").refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_refresh_empty_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "",
                "url": "wss://rtc.example.com"
            })))
            .mount(&server)
            .await;

        let err = refresher_for(&server, "room").refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_refresh_unreachable_server() {
        let config = CredentialServiceConfig::new(
            "http://127.0.0.1:1".to_string(),
            "room".to_string(),
            SecretString::from("bearer"),
        )
        .with_http_timeout(Duration::from_millis(500));
        let refresher = HttpCredentialRefresher::new(&config).unwrap();

        let err = refresher.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::Http(_)));
    }
}
