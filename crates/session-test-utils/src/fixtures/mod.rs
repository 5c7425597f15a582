//! Pre-configured test data fixtures.

use call_session::transport::ParticipantRecord;
use call_session::{Credentials, SessionConfig};
use uuid::Uuid;

/// Media server URL used by [`test_credentials`].
pub const TEST_MEDIA_URL: &str = "wss://media.example.test";

/// Credentials accepted by a default `MockTransport`.
#[must_use]
pub fn test_credentials() -> Credentials {
    Credentials::new("test-access-token", TEST_MEDIA_URL)
}

/// Fresh credentials with a unique token, as a refresh would return.
#[must_use]
pub fn refreshed_credentials() -> Credentials {
    Credentials::new(format!("refreshed-{}", Uuid::new_v4()), TEST_MEDIA_URL)
}

/// Production defaults: 5 attempts, 2s rejoin delay, 1s..10s backoff, 500ms caption expiry.
#[must_use]
pub fn test_session_config() -> SessionConfig {
    SessionConfig::default()
}

/// Profile metadata JSON as published by a well-behaved client.
#[must_use]
pub fn profile_json(display_name: &str) -> String {
    format!(r#"{{"displayName":"{display_name}"}}"#)
}

/// The local participant with profile metadata.
#[must_use]
pub fn local_record(identity: &str, display_name: &str) -> ParticipantRecord {
    ParticipantRecord::new(identity).with_metadata(profile_json(display_name))
}

/// A remote participant with profile metadata.
#[must_use]
pub fn remote_record(identity: &str, display_name: &str) -> ParticipantRecord {
    ParticipantRecord::new(identity).with_metadata(profile_json(display_name))
}
