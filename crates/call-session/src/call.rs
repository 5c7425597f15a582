//! `CallSession` - wires the actors of one call together.

use crate::actors::{PeerChannelActor, PeerChannelHandle, SessionController, SessionHandle};
use crate::config::{Config, ConfigError, SessionConfig};
use crate::credentials::{CredentialRefresher, Credentials, HttpCredentialRefresher};
use crate::errors::SessionError;
use crate::participants::{Participant, ParticipantRegistry, ParticipantsReceiver};
use crate::transport::{ParticipantSource, Transport};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A running call session.
///
/// Dropping it cancels every actor. Prefer [`CallSession::shutdown`], which
/// leaves the session cleanly first.
pub struct CallSession {
    session: SessionHandle,
    peer_channel: PeerChannelHandle,
    participants: ParticipantsReceiver,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CallSession {
    /// Spawn the session controller, peer channel and participant registry.
    ///
    /// The session starts `Idle`; call [`CallSession::connect`] to join.
    pub fn start<T>(
        config: &SessionConfig,
        transport: Arc<T>,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let cancel_token = CancellationToken::new();
        let source: Arc<dyn ParticipantSource> = transport.clone();

        let (session, session_task) = SessionController::spawn(
            config.clone(),
            transport,
            refresher,
            cancel_token.child_token(),
        );

        let (peer_channel, peer_task) = PeerChannelActor::spawn(
            config,
            session.clone(),
            Arc::clone(&source),
            cancel_token.child_token(),
        );

        let (participants, registry_task) = ParticipantRegistry::spawn(
            source,
            session.subscribe_status(),
            cancel_token.child_token(),
        );

        debug!(
            target: "call.session",
            session_id = %session.session_id(),
            "Call session started"
        );

        Self {
            session,
            peer_channel,
            participants,
            cancel_token,
            tasks: vec![session_task, peer_task, registry_task],
        }
    }

    /// Start a session that refreshes credentials over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the credential endpoint is unusable.
    pub fn from_config<T>(config: &Config, transport: Arc<T>) -> Result<Self, SessionError>
    where
        T: Transport + 'static,
    {
        let refresher = HttpCredentialRefresher::new(&config.credential_service())
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        Ok(Self::start(&config.session, transport, Arc::new(refresher)))
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn peer_channel(&self) -> &PeerChannelHandle {
        &self.peer_channel
    }

    /// Watch the participant snapshot.
    #[must_use]
    pub fn participants(&self) -> ParticipantsReceiver {
        self.participants.clone()
    }

    /// Current participants, local first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.borrow().clone()
    }

    pub async fn connect(&self, credentials: Credentials) -> Result<(), SessionError> {
        self.session.connect(credentials).await
    }

    /// Leave the session. Idempotent.
    pub async fn leave(&self) {
        self.session.leave().await;
    }

    /// Leave, stop every actor and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.session.leave().await;
        self.cancel_token.cancel();

        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(target: "call.session", error = %e, "Call session task failed");
            }
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
