//! Session lifecycle state.

use crate::errors::TerminalReason;
use std::fmt;

/// The one authoritative lifecycle state, owned by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    /// Terminal. Only `connect()` or `leave()` move the session out of it.
    Error(TerminalReason),
}

impl SessionState {
    /// Returns the state name for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Disconnected => "disconnected",
            SessionState::Error(_) => "error",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Error(_))
    }

    /// Whether the UI should show a transient "reconnecting" indicator.
    #[must_use]
    pub const fn is_recovering(&self) -> bool {
        matches!(
            self,
            SessionState::Disconnected | SessionState::Reconnecting
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error(reason) => write!(f, "error({})", reason.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Snapshot published on every change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Rejoin attempts made since the last successful connect.
    pub rejoin_attempts: u32,
    /// The transport is repairing media internally while still connected.
    pub media_recovering: bool,
}

/// A single edge taken by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
}
