//! `SessionController` - owns the call lifecycle state machine.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ok──▶ Connected ──disconnect event──▶ Disconnected
//!                       │                  ▲                                │
//!                       │ err, never       │ ok                             │ after rejoin delay
//!                       ▼ connected        │                                ▼
//!                     Error ◀──gone/exhausted── Reconnecting ◀──refresh err, backoff
//!                                              │      ▲
//!                                   refreshed  ▼      │ connect err
//!                                           Connecting
//! ```
//!
//! `leave()` moves every state to `Idle`.
//!
//! # Concurrency
//!
//! Everything runs on one task. Transport events, control messages, the rejoin
//! timer and the single in-flight async operation (connect or credential
//! refresh) are multiplexed with `tokio::select!`. Because the in-flight
//! operation is a future owned by the actor, teardown drops it, and a second
//! rejoin cannot start while one is pending. Results are still checked
//! against the current state before they are applied.
//!
//! # Rejoin budget
//!
//! Each refresh + connect pair counts as one attempt. The counter is reset
//! only when the session reaches `Connected`.

use super::messages::{MediaToggle, SessionMessage};
use crate::config::SessionConfig;
use crate::credentials::{CredentialRefresher, Credentials, RefreshError};
use crate::errors::{SessionError, TerminalReason};
use crate::observability::metrics;
use crate::participants::ProfileMetadata;
use crate::state::{SessionState, SessionStatus, StateTransition};
use crate::transport::{Transport, TransportError, TransportEvent};

use session_protocol::{encode_bounded, MessageEnvelope};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Capacity of the state transition broadcast.
const TRANSITION_CHANNEL_BUFFER: usize = 64;

/// Handle to the `SessionController`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    status: watch::Receiver<SessionStatus>,
    transitions: broadcast::Sender<StateTransition>,
    cancel_token: CancellationToken,
    session_id: String,
}

impl SessionHandle {
    /// Unique id of this controller, used in log spans.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start connecting.
    ///
    /// A no-op unless the session is `Idle` or in `Error`. Connect failures
    /// show up as a state change, not as an error here.
    pub async fn connect(&self, credentials: Credentials) -> Result<(), SessionError> {
        self.sender
            .send(SessionMessage::Connect { credentials })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))
    }

    /// Leave the session.
    ///
    /// Always succeeds and is idempotent. Returns once teardown is complete.
    pub async fn leave(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionMessage::Leave { respond_to: tx })
            .await
            .is_err()
        {
            debug!(target: "call.session", "Session controller already stopped");
            return;
        }
        let _ = rx.await;
    }

    /// Broadcast an envelope using its delivery class.
    pub async fn publish(&self, envelope: MessageEnvelope) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Publish {
            envelope,
            respond_to,
        })
        .await
    }

    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_media(MediaToggle::Microphone, enabled).await
    }

    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_media(MediaToggle::Camera, enabled).await
    }

    pub async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_media(MediaToggle::ScreenShare, enabled).await
    }

    /// Republish the local participant's profile metadata.
    pub async fn update_profile(&self, profile: ProfileMetadata) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::UpdateProfile {
            profile,
            respond_to,
        })
        .await
    }

    async fn set_media(&self, toggle: MediaToggle, enabled: bool) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::SetMedia {
            toggle,
            enabled,
            respond_to,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.status.borrow().state.clone()
    }

    /// Watch status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Receive every state transition as it happens.
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Wait until the status satisfies `predicate` and return it.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, SessionError> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|e| SessionError::Internal(format!("status channel closed: {e}")))?;
        Ok(matched.clone())
    }

    /// Cancel the controller. It tears down and stops.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Result of the single in-flight async operation.
enum Completion {
    Connect(Result<(), TransportError>),
    Refresh {
        result: Result<Credentials, RefreshError>,
        elapsed: Duration,
    },
}

type InFlight = Pin<Box<dyn Future<Output = Completion> + Send>>;

/// The `SessionController` implementation.
pub struct SessionController {
    session_id: String,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    refresher: Arc<dyn CredentialRefresher>,
    receiver: mpsc::Receiver<SessionMessage>,
    events: broadcast::Receiver<TransportEvent>,
    status: watch::Sender<SessionStatus>,
    transitions: broadcast::Sender<StateTransition>,
    cancel_token: CancellationToken,
    state: SessionState,
    rejoin_attempts: u32,
    /// Set once the current session has reached `Connected`. Separates a
    /// lost connection (rejoin) from one that never came up (terminal).
    has_connected: bool,
    media_recovering: bool,
    /// Whether `Transport::disconnect` is owed on teardown.
    transport_held: bool,
    rejoin_at: Option<Instant>,
    in_flight: Option<InFlight>,
}

impl SessionController {
    /// Spawn a new session controller.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn CredentialRefresher>,
        cancel_token: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_BUFFER);
        let session_id = Uuid::new_v4().to_string();

        // Subscribe before spawning so no event emitted after spawn is missed
        let events = transport.subscribe();

        let actor = Self {
            session_id: session_id.clone(),
            config,
            transport,
            refresher,
            receiver,
            events,
            status: status_tx,
            transitions: transitions.clone(),
            cancel_token: cancel_token.clone(),
            state: SessionState::Idle,
            rejoin_attempts: 0,
            has_connected: false,
            media_recovering: false,
            transport_held: false,
            rejoin_at: None,
            in_flight: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            status: status_rx,
            transitions,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "call.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        debug!(target: "call.session", "SessionController started");

        let mut events_open = true;

        loop {
            // Completions go before transport events: a connect that finished
            // in the same poll as a disconnect must be applied first
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.session", "SessionController received cancellation signal");
                    self.handle_leave().await;
                    break;
                }

                completion = next_completion(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.handle_completion(completion).await;
                }

                msg = self.receiver.recv() => {
                    if let Some(message) = msg {
                        self.handle_message(message).await;
                    } else {
                        debug!(target: "call.session", "SessionController channel closed, exiting");
                        self.handle_leave().await;
                        break;
                    }
                }

                event = self.events.recv(), if events_open => {
                    match event {
                        Ok(event) => self.handle_transport_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "call.session",
                                skipped = skipped,
                                "Session controller lagged behind transport events"
                            );
                        }
                        Err(RecvError::Closed) => {
                            warn!(target: "call.session", "Transport event stream closed");
                            events_open = false;
                        }
                    }
                }

                () = sleep_until_deadline(self.rejoin_at), if self.rejoin_at.is_some() => {
                    self.rejoin_at = None;
                    self.start_rejoin_attempt();
                }
            }
        }

        info!(
            target: "call.session",
            state = %self.state,
            "SessionController stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Connect { credentials } => self.handle_connect(credentials),

            SessionMessage::Leave { respond_to } => {
                self.handle_leave().await;
                let _ = respond_to.send(());
            }

            SessionMessage::Publish {
                envelope,
                respond_to,
            } => {
                let result = self.handle_publish(&envelope).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SetMedia {
                toggle,
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_media(toggle, enabled).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::UpdateProfile {
                profile,
                respond_to,
            } => {
                let result = self.handle_update_profile(&profile).await;
                let _ = respond_to.send(result);
            }
        }
    }

    fn handle_connect(&mut self, credentials: Credentials) {
        match self.state {
            SessionState::Idle | SessionState::Error(_) => {
                info!(
                    target: "call.session",
                    url = %credentials.url,
                    "Connecting to session"
                );
                self.has_connected = false;
                self.start_connect(credentials);
            }
            _ => {
                debug!(
                    target: "call.session",
                    state = %self.state,
                    "Connect ignored, session already active"
                );
            }
        }
    }

    fn start_connect(&mut self, credentials: Credentials) {
        let transport = Arc::clone(&self.transport);
        self.transport_held = true;
        self.in_flight = Some(Box::pin(async move {
            Completion::Connect(transport.connect(&credentials.url, &credentials.token).await)
        }));
        self.transition(SessionState::Connecting);
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connect(result) => self.on_connect_result(result).await,
            Completion::Refresh { result, elapsed } => {
                self.on_refresh_result(result, elapsed).await;
            }
        }
    }

    async fn on_connect_result(&mut self, result: Result<(), TransportError>) {
        if self.state != SessionState::Connecting {
            debug!(
                target: "call.session",
                state = %self.state,
                "Discarding stale connect result"
            );
            return;
        }

        match result {
            Ok(()) => {
                let recovered = self.has_connected;
                self.has_connected = true;
                self.rejoin_attempts = 0;
                self.media_recovering = false;
                if recovered {
                    metrics::record_rejoin_attempt("succeeded");
                    info!(target: "call.session", "Session recovered");
                }
                self.transition(SessionState::Connected);
            }
            Err(e) => {
                // A failed connect leaves nothing to release
                self.transport_held = false;

                if self.has_connected {
                    warn!(
                        target: "call.session",
                        error = %e,
                        attempt = self.rejoin_attempts,
                        "Rejoin connect failed"
                    );
                    metrics::record_rejoin_attempt("failed");
                    self.schedule_retry().await;
                } else {
                    warn!(target: "call.session", error = %e, "Initial connect failed");
                    self.fail(TerminalReason::ConnectFailed(e.to_string())).await;
                }
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        trace!(target: "call.session", kind = event.kind(), "Transport event");

        match event {
            TransportEvent::Disconnected { reason } => self.on_disconnected(&reason).await,
            TransportEvent::Reconnecting => self.set_media_recovering(true),
            TransportEvent::Reconnected => self.set_media_recovering(false),
            TransportEvent::ParticipantJoined { .. }
            | TransportEvent::ParticipantLeft { .. }
            | TransportEvent::MetadataChanged { .. }
            | TransportEvent::DataReceived { .. } => {}
        }
    }

    /// The only path that schedules a rejoin.
    async fn on_disconnected(&mut self, reason: &str) {
        if self.state != SessionState::Connected {
            debug!(
                target: "call.session",
                state = %self.state,
                reason = %reason,
                "Ignoring disconnect outside Connected"
            );
            return;
        }

        warn!(target: "call.session", reason = %reason, "Connection lost");
        self.transport_held = false;
        self.media_recovering = false;
        self.transition(SessionState::Disconnected);

        if self.rejoin_attempts >= self.config.max_rejoin_attempts {
            metrics::record_rejoin_attempt("exhausted");
            self.fail(TerminalReason::RecoveryExhausted {
                attempts: self.rejoin_attempts,
            })
            .await;
            return;
        }

        debug!(
            target: "call.session",
            delay = ?self.config.rejoin_delay,
            "Scheduling rejoin"
        );
        self.rejoin_at = Some(Instant::now() + self.config.rejoin_delay);
        metrics::record_rejoin_attempt("scheduled");
        self.transition(SessionState::Reconnecting);
    }

    fn start_rejoin_attempt(&mut self) {
        if self.state != SessionState::Reconnecting || self.in_flight.is_some() {
            return;
        }

        self.rejoin_attempts = self.rejoin_attempts.saturating_add(1);
        info!(
            target: "call.session",
            attempt = self.rejoin_attempts,
            max_attempts = self.config.max_rejoin_attempts,
            "Refreshing credentials for rejoin"
        );

        let refresher = Arc::clone(&self.refresher);
        self.in_flight = Some(Box::pin(async move {
            let started = Instant::now();
            let result = refresher.refresh().await;
            Completion::Refresh {
                result,
                elapsed: started.elapsed(),
            }
        }));
        self.publish_status();
    }

    async fn on_refresh_result(
        &mut self,
        result: Result<Credentials, RefreshError>,
        elapsed: Duration,
    ) {
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        metrics::record_credential_refresh(status, elapsed);

        if self.state != SessionState::Reconnecting {
            debug!(
                target: "call.session",
                state = %self.state,
                "Discarding stale credential refresh"
            );
            return;
        }

        match result {
            Ok(credentials) => {
                debug!(target: "call.session", url = %credentials.url, "Credentials refreshed");
                self.start_connect(credentials);
            }
            Err(e) if e.is_terminal() => {
                warn!(target: "call.session", error = %e, "Session no longer exists");
                self.fail(TerminalReason::SessionEnded).await;
            }
            Err(e) => {
                warn!(
                    target: "call.session",
                    error = %e,
                    attempt = self.rejoin_attempts,
                    "Credential refresh failed"
                );
                metrics::record_rejoin_attempt("failed");
                self.schedule_retry().await;
            }
        }
    }

    /// Back off before the next attempt, or give up when the budget is spent.
    async fn schedule_retry(&mut self) {
        if self.rejoin_attempts >= self.config.max_rejoin_attempts {
            metrics::record_rejoin_attempt("exhausted");
            self.fail(TerminalReason::RecoveryExhausted {
                attempts: self.rejoin_attempts,
            })
            .await;
            return;
        }

        let delay = self.config.backoff_delay(self.rejoin_attempts);
        debug!(
            target: "call.session",
            attempt = self.rejoin_attempts,
            delay = ?delay,
            "Scheduling rejoin retry"
        );
        self.rejoin_at = Some(Instant::now() + delay);
        self.transition(SessionState::Reconnecting);
    }

    fn set_media_recovering(&mut self, recovering: bool) {
        if self.state != SessionState::Connected || self.media_recovering == recovering {
            return;
        }

        debug!(
            target: "call.session",
            recovering = recovering,
            "Transport media recovery state changed"
        );
        self.media_recovering = recovering;
        self.publish_status();
    }

    async fn handle_publish(&mut self, envelope: &MessageEnvelope) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let delivery = envelope.delivery_class();
        let payload = encode_bounded(envelope).map_err(|e| {
            warn!(
                target: "call.session",
                kind = envelope.type_tag(),
                error = %e,
                "Refusing to publish envelope peers would drop"
            );
            SessionError::InvalidInput("Message is too large".to_string())
        })?;

        self.transport
            .publish_data(payload, delivery)
            .await
            .map_err(|e| {
                if delivery.is_reliable() {
                    warn!(
                        target: "call.session",
                        kind = envelope.type_tag(),
                        error = %e,
                        "Reliable publish failed"
                    );
                } else {
                    debug!(
                        target: "call.session",
                        kind = envelope.type_tag(),
                        error = %e,
                        "Best-effort publish failed"
                    );
                }
                SessionError::from(e)
            })
    }

    async fn handle_set_media(
        &mut self,
        toggle: MediaToggle,
        enabled: bool,
    ) -> Result<(), SessionError> {
        self.ensure_connected()?;

        match toggle {
            MediaToggle::Microphone => self.transport.set_microphone_enabled(enabled).await?,
            MediaToggle::Camera => self.transport.set_camera_enabled(enabled).await?,
            MediaToggle::ScreenShare => self.transport.set_screen_share_enabled(enabled).await?,
        }

        debug!(
            target: "call.session",
            track = toggle.as_str(),
            enabled = enabled,
            "Local media toggled"
        );
        Ok(())
    }

    async fn handle_update_profile(&mut self, profile: &ProfileMetadata) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.transport.set_local_metadata(profile.to_json()).await?;
        debug!(target: "call.session", "Local profile metadata updated");
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Single teardown path. Safe to run from any state, any number of times.
    async fn handle_leave(&mut self) {
        if self.state == SessionState::Idle {
            debug!(target: "call.session", "Leave ignored, session already idle");
            return;
        }

        info!(target: "call.session", state = %self.state, "Leaving session");
        self.teardown().await;
        self.transition(SessionState::Idle);
    }

    async fn fail(&mut self, reason: TerminalReason) {
        warn!(
            target: "call.session",
            reason = reason.as_str(),
            detail = %reason,
            "Session ended with terminal error"
        );
        self.teardown().await;
        self.transition(SessionState::Error(reason));
    }

    async fn teardown(&mut self) {
        self.rejoin_at = None;
        self.media_recovering = false;

        if self.in_flight.take().is_some() {
            debug!(target: "call.session", "Cancelled in-flight operation");
        }

        if self.transport_held {
            self.transport.disconnect().await;
            self.transport_held = false;
        }
    }

    fn transition(&mut self, to: SessionState) {
        if self.state == to {
            self.publish_status();
            return;
        }

        let from = std::mem::replace(&mut self.state, to);
        info!(
            target: "call.session",
            from = %from,
            to = %self.state,
            rejoin_attempts = self.rejoin_attempts,
            "Session state changed"
        );
        metrics::record_transition(self.state.as_str());

        // No subscribers is fine
        let _ = self.transitions.send(StateTransition {
            from,
            to: self.state.clone(),
        });
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state.clone(),
            rejoin_attempts: self.rejoin_attempts,
            media_recovering: self.media_recovering,
        });
    }
}

async fn next_completion(in_flight: &mut Option<InFlight>) -> Completion {
    match in_flight {
        Some(operation) => operation.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
