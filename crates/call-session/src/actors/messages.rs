//! Message types for actor communication.
//!
//! Handles talk to their actor over `tokio::sync::mpsc`. Request-reply uses
//! `tokio::sync::oneshot`.

use crate::captions::{CaptionEntry, TranscriptLine};
use crate::chat::ChatMessage;
use crate::credentials::Credentials;
use crate::errors::SessionError;
use crate::participants::ProfileMetadata;
use session_protocol::MessageEnvelope;
use tokio::sync::oneshot;

/// Media tracks the local participant can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaToggle {
    Microphone,
    Camera,
    ScreenShare,
}

impl MediaToggle {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaToggle::Microphone => "microphone",
            MediaToggle::Camera => "camera",
            MediaToggle::ScreenShare => "screen_share",
        }
    }
}

/// Messages sent to the `SessionController`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Start a session with the given credentials.
    Connect { credentials: Credentials },

    /// Tear the session down and return to `Idle`.
    Leave {
        /// Completes once teardown has finished.
        respond_to: oneshot::Sender<()>,
    },

    /// Broadcast an envelope to every other participant.
    Publish {
        envelope: MessageEnvelope,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Enable or disable a local media track.
    SetMedia {
        toggle: MediaToggle,
        enabled: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Republish the local participant's profile metadata.
    UpdateProfile {
        profile: ProfileMetadata,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Messages sent to the `PeerChannelActor`.
#[derive(Debug)]
pub enum PeerChannelMessage {
    /// A transcript fragment produced by the local speech-to-text engine.
    LocalCaption {
        text: String,
        is_final: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Send a chat message to the session.
    SendChat {
        text: String,
        respond_to: oneshot::Sender<Result<ChatMessage, SessionError>>,
    },

    /// Turn captions on or off.
    SetCaptionsEnabled {
        enabled: bool,
        respond_to: oneshot::Sender<()>,
    },

    /// Live caption entries.
    GetCaptions {
        respond_to: oneshot::Sender<Vec<CaptionEntry>>,
    },

    /// Session transcript so far.
    GetTranscript {
        respond_to: oneshot::Sender<Vec<TranscriptLine>>,
    },

    /// Chat history so far.
    GetChatHistory {
        respond_to: oneshot::Sender<Vec<ChatMessage>>,
    },
}
