//! Real-time transport collaborator.
//!
//! The media runtime (signaling, media routing, NAT traversal, codecs) is an
//! external dependency. The session only consumes its connect/publish/event
//! surface through the traits in this module.
//!
//! [`Transport`] is owned by the session
//! controller, which is the only component allowed to connect, disconnect or
//! publish. The participant registry and the peer channel receive the
//! read-only [`ParticipantSource`] view plus an event subscription.

use async_trait::async_trait;
use bytes::Bytes;
use common::secret::SecretString;
use common::types::ParticipantIdentity;
use session_protocol::DeliveryClass;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors reported by the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connecting to the media server failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Operation requires an established connection.
    #[error("Transport is not connected")]
    NotConnected,

    /// Publishing on the data channel failed.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Other(String),
}

/// A participant as listed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    /// Stable identity for the session lifetime.
    pub identity: ParticipantIdentity,
    /// Raw, remotely supplied metadata (expected to be profile JSON).
    pub metadata: Option<String>,
}

impl ParticipantRecord {
    /// Create a record with no metadata.
    #[must_use]
    pub fn new(identity: impl Into<ParticipantIdentity>) -> Self {
        Self {
            identity: identity.into(),
            metadata: None,
        }
    }

    /// Attach raw metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Events emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote participant joined.
    ParticipantJoined { identity: ParticipantIdentity },
    /// A remote participant left.
    ParticipantLeft { identity: ParticipantIdentity },
    /// A participant republished its metadata.
    MetadataChanged { identity: ParticipantIdentity },
    /// A data channel payload arrived from a remote participant.
    DataReceived {
        sender: ParticipantIdentity,
        payload: Bytes,
    },
    /// The connection was lost and the transport gave up on it.
    Disconnected { reason: String },
    /// The transport is repairing the connection internally.
    Reconnecting,
    /// The transport repaired the connection internally.
    Reconnected,
}

impl TransportEvent {
    /// Returns the event kind as a string for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            TransportEvent::ParticipantJoined { .. } => "participant_joined",
            TransportEvent::ParticipantLeft { .. } => "participant_left",
            TransportEvent::MetadataChanged { .. } => "metadata_changed",
            TransportEvent::DataReceived { .. } => "data_received",
            TransportEvent::Disconnected { .. } => "disconnected",
            TransportEvent::Reconnecting => "reconnecting",
            TransportEvent::Reconnected => "reconnected",
        }
    }
}

/// Read-only view of the transport's participant listing.
pub trait ParticipantSource: Send + Sync {
    /// The local participant, once connected.
    fn local_participant(&self) -> Option<ParticipantRecord>;

    /// Remote participants currently in the session, in join order.
    fn remote_participants(&self) -> Vec<ParticipantRecord>;

    /// Subscribe to transport events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// The real-time transport surface driven by the session controller.
#[async_trait]
pub trait Transport: ParticipantSource {
    /// Connect to the media server.
    async fn connect(&self, url: &str, token: &SecretString) -> Result<(), TransportError>;

    /// Disconnect and release media resources. Safe to call when not connected.
    async fn disconnect(&self);

    /// Broadcast a payload to every other participant.
    async fn publish_data(
        &self,
        payload: Bytes,
        delivery: DeliveryClass,
    ) -> Result<(), TransportError>;

    /// Replace the local participant's metadata.
    async fn set_local_metadata(&self, metadata: String) -> Result<(), TransportError>;

    /// Enable or disable the microphone track.
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    /// Enable or disable the camera track.
    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    /// Start or stop screen sharing.
    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = ParticipantRecord::new("alice").with_metadata(r#"{"displayName":"A"}"#);
        assert_eq!(record.identity.as_str(), "alice");
        assert!(record.metadata.is_some());
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(TransportEvent::Reconnecting.kind(), "reconnecting");
        assert_eq!(
            TransportEvent::Disconnected {
                reason: "network".to_string()
            }
            .kind(),
            "disconnected"
        );
    }
}
