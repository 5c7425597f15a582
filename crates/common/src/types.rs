//! Common data types for the call-session crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-assigned identity of a participant.
///
/// Stable for the lifetime of a session. Used as the key for caption entries,
/// chat attribution and the participant snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantIdentity(String);

impl ParticipantIdentity {
    /// Wrap a raw identity string.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let id = ParticipantIdentity::new("user-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-42\"");

        let parsed: ParticipantIdentity = serde_json::from_str("\"user-42\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_identity_display() {
        let id = ParticipantIdentity::from("alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.as_str(), "alice");
    }
}
