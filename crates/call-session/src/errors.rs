//! Call session error types.
//!
//! Only terminal state-machine outcomes reach the UI as [`TerminalReason`].
//! Control-surface calls fail with [`SessionError`]; internal details are logged
//! but the user-facing text comes from `client_message()`.

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Why a session reached a terminal `Error` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalReason {
    /// The credential service reported the room no longer exists.
    #[error("Session ended")]
    SessionEnded,

    /// The rejoin budget was spent without reconnecting.
    #[error("Recovery exhausted after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    /// The very first connect failed. Never retried.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
}

impl TerminalReason {
    /// Text shown to the user.
    ///
    /// Session-gone and recovery exhaustion must read differently.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            TerminalReason::SessionEnded => "The session has ended",
            TerminalReason::RecoveryExhausted { .. } => "Could not recover the connection",
            TerminalReason::ConnectFailed(_) => "Could not connect to the session",
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::SessionEnded => "session_ended",
            TerminalReason::RecoveryExhausted { .. } => "recovery_exhausted",
            TerminalReason::ConnectFailed(_) => "connect_failed",
        }
    }
}

/// Error returned by the session control surface.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs a `Connected` session.
    #[error("Session is not connected")]
    NotConnected,

    /// The transport rejected the operation.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Captions are turned off.
    #[error("Captions are disabled")]
    CaptionsDisabled,

    /// Input was rejected before reaching the transport.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Actor channel failure or similar.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns a user-safe message.
    ///
    /// Internal details are not exposed.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::NotConnected => "You are not connected to the session".to_string(),
            SessionError::Transport(_) => "The action could not be completed".to_string(),
            SessionError::CaptionsDisabled => "Captions are turned off".to_string(),
            SessionError::InvalidInput(reason) => reason.clone(),
            SessionError::Config(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
