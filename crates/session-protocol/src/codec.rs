//! Codec for encoding and decoding peer broadcast envelopes.

use crate::envelope::MessageEnvelope;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::debug;

/// Largest payload accepted on either side of the wire.
///
/// Data channel packets are far smaller in practice; anything above this is
/// not from a well-behaved peer. `encode_bounded` refuses to produce it and
/// `decode` refuses to parse it.
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

/// Error type for codec operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Payload contained no bytes
    #[error("Empty payload")]
    EmptyPayload,

    /// Payload exceeds `MAX_ENVELOPE_BYTES`
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Payload is not a valid envelope (bad JSON, missing or mistyped fields)
    #[error("Invalid envelope format: {0}")]
    InvalidFormat(String),

    /// Envelope `type` is not one this peer understands
    #[error("Unknown envelope type: {0}")]
    UnknownType(String),
}

impl CodecError {
    /// Short reason label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            CodecError::EmptyPayload => "empty",
            CodecError::PayloadTooLarge(_) => "too_large",
            CodecError::InvalidFormat(_) => "invalid_format",
            CodecError::UnknownType(_) => "unknown_type",
        }
    }
}

/// Encode an envelope to its wire bytes.
///
/// Encoding is total: every envelope has a JSON representation. Peers drop
/// payloads above [`MAX_ENVELOPE_BYTES`], so outgoing messages go through
/// [`encode_bounded`].
#[must_use]
pub fn encode(envelope: &MessageEnvelope) -> Bytes {
    let value = match envelope {
        MessageEnvelope::Chat { text } => json!({
            "type": "chat",
            "message": text,
        }),
        MessageEnvelope::Caption {
            text,
            speaker_id,
            speaker_name,
            is_final,
        } => json!({
            "type": "subtitle",
            "text": text,
            "speakerId": speaker_id.as_str(),
            "speakerName": speaker_name,
            "isFinal": is_final,
        }),
    };

    Bytes::from(value.to_string())
}

/// Encode an envelope for sending.
///
/// # Errors
///
/// Returns `CodecError::PayloadTooLarge` if the encoded form exceeds
/// [`MAX_ENVELOPE_BYTES`]; no peer would accept it.
pub fn encode_bounded(envelope: &MessageEnvelope) -> Result<Bytes, CodecError> {
    let payload = encode(envelope);
    if payload.len() > MAX_ENVELOPE_BYTES {
        debug!(
            target: "session.protocol",
            kind = envelope.type_tag(),
            len = payload.len(),
            "Refusing to encode oversized envelope"
        );
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    Ok(payload)
}

/// Decode an envelope from wire bytes.
///
/// # Errors
///
/// Returns an error for empty, oversized, non-JSON, unknown-type, or
/// incomplete payloads. Callers drop the message; a bad payload from one peer
/// never affects the session.
pub fn decode(payload: &[u8]) -> Result<MessageEnvelope, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    if payload.len() > MAX_ENVELOPE_BYTES {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let value: Value =
        serde_json::from_slice(payload).map_err(|e| CodecError::InvalidFormat(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::InvalidFormat("missing string field `type`".to_string()))?;

    if !matches!(tag, "chat" | "subtitle") {
        return Err(CodecError::UnknownType(tag.to_string()));
    }

    serde_json::from_value(value).map_err(|e| CodecError::InvalidFormat(e.to_string()))
}
