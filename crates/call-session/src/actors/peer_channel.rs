//! `PeerChannelActor` - chat and live captions over the data channel.
//!
//! Incoming payloads are decoded once here. A payload that does not decode is
//! logged and dropped; it never reaches the session controller. Outgoing
//! envelopes go through the `SessionHandle`, which is the only writer to the
//! transport.

use super::messages::PeerChannelMessage;
use super::session::SessionHandle;
use crate::captions::{CaptionAggregator, CaptionEntry, CaptionFragment, TranscriptLine};
use crate::chat::{ChatLog, ChatMessage};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::observability::metrics;
use crate::participants::Participant;
use crate::transport::{ParticipantSource, TransportEvent};

use common::types::ParticipantIdentity;
use session_protocol::{decode, encode_bounded, MessageEnvelope};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Default channel buffer size for the peer channel mailbox.
const PEER_CHANNEL_BUFFER: usize = 128;

/// Capacity of the incoming chat broadcast.
const CHAT_BROADCAST_BUFFER: usize = 256;

/// Handle to the `PeerChannelActor`.
#[derive(Clone, Debug)]
pub struct PeerChannelHandle {
    sender: mpsc::Sender<PeerChannelMessage>,
    captions: watch::Receiver<Vec<CaptionEntry>>,
    chat: broadcast::Sender<ChatMessage>,
    cancel_token: CancellationToken,
}

impl PeerChannelHandle {
    /// Feed a fragment from the local speech-to-text engine.
    ///
    /// The fragment is broadcast (interim best-effort, final reliably) and
    /// then applied to the local entry. Nothing is recorded locally if the
    /// broadcast fails.
    pub async fn publish_caption(
        &self,
        text: impl Into<String>,
        is_final: bool,
    ) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|respond_to| PeerChannelMessage::LocalCaption {
            text,
            is_final,
            respond_to,
        })
        .await?
    }

    /// Send a chat message. Returns the message as recorded in history.
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        self.request(|respond_to| PeerChannelMessage::SendChat { text, respond_to })
            .await?
    }

    pub async fn set_captions_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|respond_to| PeerChannelMessage::SetCaptionsEnabled {
            enabled,
            respond_to,
        })
        .await
    }

    /// Live caption entries, expired ones excluded.
    pub async fn captions(&self) -> Result<Vec<CaptionEntry>, SessionError> {
        self.request(|respond_to| PeerChannelMessage::GetCaptions { respond_to })
            .await
    }

    pub async fn transcript(&self) -> Result<Vec<TranscriptLine>, SessionError> {
        self.request(|respond_to| PeerChannelMessage::GetTranscript { respond_to })
            .await
    }

    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        self.request(|respond_to| PeerChannelMessage::GetChatHistory { respond_to })
            .await
    }

    /// Watch live caption entries. Updated on every fragment and at each
    /// entry's expiry deadline.
    #[must_use]
    pub fn subscribe_captions(&self) -> watch::Receiver<Vec<CaptionEntry>> {
        self.captions.clone()
    }

    /// Receive chat messages, local and remote, as they are recorded.
    #[must_use]
    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PeerChannelMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }
}

/// The `PeerChannelActor` implementation.
pub struct PeerChannelActor {
    receiver: mpsc::Receiver<PeerChannelMessage>,
    events: broadcast::Receiver<TransportEvent>,
    session: SessionHandle,
    source: Arc<dyn ParticipantSource>,
    captions: CaptionAggregator,
    chat: ChatLog,
    captions_tx: watch::Sender<Vec<CaptionEntry>>,
    chat_tx: broadcast::Sender<ChatMessage>,
    cancel_token: CancellationToken,
}

impl PeerChannelActor {
    /// Spawn the peer channel actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: &SessionConfig,
        session: SessionHandle,
        source: Arc<dyn ParticipantSource>,
        cancel_token: CancellationToken,
    ) -> (PeerChannelHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PEER_CHANNEL_BUFFER);
        let (captions_tx, captions_rx) = watch::channel(Vec::new());
        let (chat_tx, _) = broadcast::channel(CHAT_BROADCAST_BUFFER);
        let events = source.subscribe();

        let actor = Self {
            receiver,
            events,
            session,
            source,
            captions: CaptionAggregator::new(config.caption_expiry, config.caption_interim_ttl),
            chat: ChatLog::new(),
            captions_tx,
            chat_tx: chat_tx.clone(),
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PeerChannelHandle {
            sender,
            captions: captions_rx,
            chat: chat_tx,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "call.peer_channel",
        fields(session_id = %self.session.session_id())
    )]
    async fn run(mut self) {
        debug!(target: "call.peer_channel", "PeerChannelActor started");

        let mut events_open = true;

        loop {
            // Wake exactly when the earliest caption entry expires
            let next_expiry = self.captions.next_expiry();

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.peer_channel", "PeerChannelActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    if let Some(message) = msg {
                        self.handle_message(message).await;
                    } else {
                        debug!(target: "call.peer_channel", "PeerChannelActor channel closed, exiting");
                        break;
                    }
                }

                event = self.events.recv(), if events_open => {
                    match event {
                        Ok(TransportEvent::DataReceived { sender, payload }) => {
                            self.handle_data(sender, &payload);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "call.peer_channel",
                                skipped = skipped,
                                "Peer channel lagged behind transport events"
                            );
                            metrics::record_peer_message_dropped("lagged");
                        }
                        Err(RecvError::Closed) => {
                            debug!(target: "call.peer_channel", "Transport event stream closed");
                            events_open = false;
                        }
                    }
                }

                () = sleep_until_expiry(next_expiry), if next_expiry.is_some() => {
                    let removed = self.captions.sweep(Instant::now());
                    if removed > 0 {
                        trace!(target: "call.peer_channel", removed = removed, "Expired captions swept");
                        self.publish_captions();
                    }
                }
            }
        }

        info!(
            target: "call.peer_channel",
            chat_messages = self.chat.len(),
            transcript_lines = self.captions.transcript().len(),
            "PeerChannelActor stopped"
        );
    }

    async fn handle_message(&mut self, message: PeerChannelMessage) {
        match message {
            PeerChannelMessage::LocalCaption {
                text,
                is_final,
                respond_to,
            } => {
                let result = self.handle_local_caption(text, is_final).await;
                let _ = respond_to.send(result);
            }

            PeerChannelMessage::SendChat { text, respond_to } => {
                let result = self.handle_send_chat(text).await;
                let _ = respond_to.send(result);
            }

            PeerChannelMessage::SetCaptionsEnabled {
                enabled,
                respond_to,
            } => {
                self.captions.set_enabled(enabled);
                info!(target: "call.peer_channel", enabled = enabled, "Captions toggled");
                self.publish_captions();
                let _ = respond_to.send(());
            }

            PeerChannelMessage::GetCaptions { respond_to } => {
                let _ = respond_to.send(self.captions.entries(Instant::now()));
            }

            PeerChannelMessage::GetTranscript { respond_to } => {
                let _ = respond_to.send(self.captions.transcript().to_vec());
            }

            PeerChannelMessage::GetChatHistory { respond_to } => {
                let _ = respond_to.send(self.chat.messages().to_vec());
            }
        }
    }

    async fn handle_local_caption(
        &mut self,
        text: String,
        is_final: bool,
    ) -> Result<(), SessionError> {
        if !self.captions.is_enabled() {
            return Err(SessionError::CaptionsDisabled);
        }

        let speaker = self.local_participant()?;
        let fragment = CaptionFragment {
            speaker_id: speaker.identity,
            speaker_name: speaker.display_name,
            text,
            is_final,
        };
        let envelope = fragment.to_envelope();
        check_size(&envelope, "Caption is too long")?;

        self.session.publish(envelope).await?;

        self.captions.apply(fragment, Instant::now());
        metrics::record_caption_fragment(true, is_final);
        self.publish_captions();
        Ok(())
    }

    async fn handle_send_chat(&mut self, text: String) -> Result<ChatMessage, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Chat message is empty".to_string(),
            ));
        }

        let envelope = MessageEnvelope::chat(text.clone());
        check_size(&envelope, "Chat message is too long")?;

        let sender = self.local_participant()?;
        self.session.publish(envelope).await?;

        let message = ChatMessage::new(sender.identity, sender.display_name, text, true);
        self.record_chat(message.clone());
        Ok(message)
    }

    fn handle_data(&mut self, sender: ParticipantIdentity, payload: &[u8]) {
        let envelope = match decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    target: "call.peer_channel",
                    sender = %sender,
                    reason = e.reason(),
                    error = %e,
                    "Dropping malformed peer message"
                );
                metrics::record_peer_message_dropped(e.reason());
                return;
            }
        };

        match envelope {
            MessageEnvelope::Chat { text } => {
                let sender_name = self.display_name_of(&sender);
                debug!(target: "call.peer_channel", sender = %sender, "Chat message received");
                self.record_chat(ChatMessage::new(sender, sender_name, text, false));
            }
            caption @ MessageEnvelope::Caption { .. } => {
                let Some(fragment) = CaptionFragment::from_envelope(caption) else {
                    return;
                };
                if fragment.speaker_id != sender {
                    debug!(
                        target: "call.peer_channel",
                        sender = %sender,
                        speaker_id = %fragment.speaker_id,
                        "Caption relayed for another speaker"
                    );
                }

                let is_final = fragment.is_final;
                if self.captions.apply(fragment, Instant::now()) {
                    metrics::record_caption_fragment(false, is_final);
                    self.publish_captions();
                } else {
                    trace!(target: "call.peer_channel", "Captions disabled, fragment ignored");
                }
            }
        }
    }

    fn local_participant(&self) -> Result<Participant, SessionError> {
        self.source
            .local_participant()
            .map(|record| Participant::from_record(record, true))
            .ok_or(SessionError::NotConnected)
    }

    fn display_name_of(&self, identity: &ParticipantIdentity) -> String {
        self.source
            .remote_participants()
            .into_iter()
            .find(|record| &record.identity == identity)
            .map_or_else(
                || identity.to_string(),
                |record| Participant::from_record(record, false).display_name,
            )
    }

    fn record_chat(&mut self, message: ChatMessage) {
        self.chat.push(message.clone());
        // No subscribers is fine
        let _ = self.chat_tx.send(message);
    }

    fn publish_captions(&self) {
        self.captions_tx
            .send_replace(self.captions.entries(Instant::now()));
    }
}

/// Reject envelopes no peer would accept, before anything is recorded.
fn check_size(envelope: &MessageEnvelope, reason: &str) -> Result<(), SessionError> {
    encode_bounded(envelope)
        .map(drop)
        .map_err(|_| SessionError::InvalidInput(reason.to_string()))
}

async fn sleep_until_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
