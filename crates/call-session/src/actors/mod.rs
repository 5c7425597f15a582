//! Actors that make up a running call session.
//!
//! ```text
//! CallSession (root CancellationToken)
//! ├── SessionController   owns SessionState, the transport and the rejoin loop
//! ├── PeerChannelActor    chat + captions, publishes through SessionHandle
//! └── ParticipantRegistry snapshot task (see `participants`)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: only the `SessionController` mutates `SessionState` or
//!   calls connect/disconnect/publish on the transport
//! - **Read-only fan-out**: other actors get a `ParticipantSource` and their own
//!   event subscription
//! - **CancellationToken propagation**: the facade hands each actor a child token
//! - **Message passing**: control calls go over `tokio::sync::mpsc`, state
//!   changes are published on `watch`/`broadcast` channels
//!
//! # Modules
//!
//! - [`session`] - `SessionController`, the lifecycle state machine
//! - [`peer_channel`] - `PeerChannelActor`, chat and captions
//! - [`messages`] - Message types for actor communication

pub mod messages;
pub mod peer_channel;
pub mod session;

// Re-export primary types
pub use messages::*;
pub use peer_channel::{PeerChannelActor, PeerChannelHandle};
pub use session::{SessionController, SessionHandle};
