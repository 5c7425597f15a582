//! Call Session Library
//!
//! The client-side controller for a live multi-party call running on top of
//! an external real-time transport:
//!
//! - Session lifecycle state machine with bounded, automatic rejoin
//! - Credential refresh that tells "session gone" apart from transient failure
//! - Peer-broadcast chat and live captions over the transport data channel
//! - A participant snapshot derived from transport events and profile metadata
//!
//! # Architecture
//!
//! ```text
//! CallSession
//! ├── SessionController   (actors::session)
//! ├── PeerChannelActor    (actors::peer_channel)
//! └── ParticipantRegistry (participants)
//! ```
//!
//! Media capture, signaling and speech-to-text are external. The crate only
//! consumes the [`transport::Transport`] and [`credentials::CredentialRefresher`]
//! seams.
//!
//! # Modules
//!
//! - [`actors`] - Session controller and peer channel actors
//! - [`call`] - `CallSession` facade
//! - [`captions`] - Per-speaker caption aggregation
//! - [`config`] - Configuration from environment
//! - [`credentials`] - Credential refresh
//! - [`errors`] - Error types and user-facing messages
//! - [`participants`] - Participant registry and profile metadata

pub mod actors;
pub mod call;
pub mod captions;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod observability;
pub mod participants;
pub mod state;
pub mod transport;

pub use call::CallSession;
pub use config::{Config, ConfigError, SessionConfig};
pub use credentials::{CredentialRefresher, Credentials, HttpCredentialRefresher, RefreshError};
pub use errors::{SessionError, TerminalReason};
pub use state::{SessionState, SessionStatus, StateTransition};
