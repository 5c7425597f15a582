//! Envelope types carried over the peer data channel.

use common::types::ParticipantIdentity;
use serde::Deserialize;

/// A peer broadcast message.
///
/// Wire format (JSON, field names are part of the interop contract):
///
/// ```text
/// { "type": "chat", "message": string }
/// { "type": "subtitle", "text": string, "speakerId": string,
///   "speakerName": string, "isFinal": boolean }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum MessageEnvelope {
    /// Text chat message. The sender is taken from the transport, not the payload.
    #[serde(rename = "chat")]
    Chat {
        /// Message body.
        #[serde(rename = "message")]
        text: String,
    },

    /// Caption fragment attributed to a speaker.
    #[serde(rename = "subtitle", rename_all = "camelCase")]
    Caption {
        /// Transcribed text so far for the current utterance.
        text: String,
        /// Identity of the speaking participant.
        speaker_id: ParticipantIdentity,
        /// Display name of the speaker at the time of speaking.
        speaker_name: String,
        /// Whether the speech engine has finalised this utterance.
        is_final: bool,
    },
}

impl MessageEnvelope {
    /// Wire tag for this envelope.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            MessageEnvelope::Chat { .. } => "chat",
            MessageEnvelope::Caption { .. } => "subtitle",
        }
    }

    /// Build a chat envelope.
    #[must_use]
    pub fn chat(text: impl Into<String>) -> Self {
        MessageEnvelope::Chat { text: text.into() }
    }

    /// Build a caption envelope.
    #[must_use]
    pub fn caption(
        text: impl Into<String>,
        speaker_id: ParticipantIdentity,
        speaker_name: impl Into<String>,
        is_final: bool,
    ) -> Self {
        MessageEnvelope::Caption {
            text: text.into(),
            speaker_id,
            speaker_name: speaker_name.into(),
            is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        assert_eq!(MessageEnvelope::chat("hi").type_tag(), "chat");
        assert_eq!(
            MessageEnvelope::caption("hi", ParticipantIdentity::new("a"), "A", false).type_tag(),
            "subtitle"
        );
    }
}
