//! In-memory transport for session tests.
//!
//! `MockTransport` records every call made by the session and lets the test
//! inject transport events (disconnects, joins, incoming data).
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! let transport = MockTransport::new()
//!     .with_local_participant(local_record("me", "Me"))
//!     .with_connect_results(vec![Ok(()), Err(TransportError::ConnectFailed("boom".into()))]);
//!
//! transport.drop_connection("network lost");
//! assert_eq!(transport.connect_calls().len(), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use call_session::transport::{
    ParticipantRecord, ParticipantSource, Transport, TransportError, TransportEvent,
};
use common::secret::{ExposeSecret, SecretString};
use common::types::ParticipantIdentity;
use session_protocol::{decode, encode, DeliveryClass, MessageEnvelope};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Event channel capacity. Large enough that tests never lag.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A recorded `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectCall {
    pub url: String,
    pub token: String,
}

/// A recorded `publish_data` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPayload {
    pub payload: Bytes,
    pub delivery: DeliveryClass,
}

/// A recorded media toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCall {
    Microphone(bool),
    Camera(bool),
    ScreenShare(bool),
}

#[derive(Debug, Default)]
struct MockState {
    connect_results: VecDeque<Result<(), TransportError>>,
    connect_delay: Option<Duration>,
    connected: bool,
    local: Option<ParticipantRecord>,
    remotes: Vec<ParticipantRecord>,
    connect_calls: Vec<ConnectCall>,
    disconnect_calls: usize,
    published: Vec<PublishedPayload>,
    metadata_updates: Vec<String>,
    media_calls: Vec<MediaCall>,
}

/// Scriptable mock of the real-time transport.
#[derive(Debug)]
pub struct MockTransport {
    events: broadcast::Sender<TransportEvent>,
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            state: Mutex::new(MockState::default()),
        }
    }
}

impl MockTransport {
    /// A transport where every connect succeeds.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the local participant reported once connected.
    #[must_use]
    pub fn with_local_participant(self: Arc<Self>, record: ParticipantRecord) -> Arc<Self> {
        self.state.lock().unwrap().local = Some(record);
        self
    }

    /// Set remote participants already in the room.
    #[must_use]
    pub fn with_remote_participants(self: Arc<Self>, records: Vec<ParticipantRecord>) -> Arc<Self> {
        self.state.lock().unwrap().remotes = records;
        self
    }

    /// Script connect outcomes in order. Once exhausted, connects succeed.
    #[must_use]
    pub fn with_connect_results(
        self: Arc<Self>,
        results: Vec<Result<(), TransportError>>,
    ) -> Arc<Self> {
        self.state.lock().unwrap().connect_results = results.into();
        self
    }

    /// Make every connect take `delay` before resolving.
    #[must_use]
    pub fn with_connect_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.state.lock().unwrap().connect_delay = Some(delay);
        self
    }

    /// Queue more connect outcomes.
    pub fn push_connect_result(&self, result: Result<(), TransportError>) {
        self.state.lock().unwrap().connect_results.push_back(result);
    }

    // ------------------------------------------------------------------
    // Event injection
    // ------------------------------------------------------------------

    /// Emit a raw transport event.
    pub fn emit(&self, event: TransportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Simulate the transport giving up on the connection.
    pub fn drop_connection(&self, reason: &str) {
        self.state.lock().unwrap().connected = false;
        self.emit(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Add a remote participant and emit the join event.
    pub fn add_remote(&self, record: ParticipantRecord) {
        let identity = record.identity.clone();
        self.state.lock().unwrap().remotes.push(record);
        self.emit(TransportEvent::ParticipantJoined { identity });
    }

    /// Remove a remote participant and emit the leave event.
    pub fn remove_remote(&self, identity: &str) {
        let identity = ParticipantIdentity::new(identity);
        self.state
            .lock()
            .unwrap()
            .remotes
            .retain(|record| record.identity != identity);
        self.emit(TransportEvent::ParticipantLeft { identity });
    }

    /// Replace a remote participant's metadata and emit the change event.
    pub fn update_remote_metadata(&self, identity: &str, metadata: &str) {
        let identity = ParticipantIdentity::new(identity);
        {
            let mut state = self.state.lock().unwrap();
            for record in state.remotes.iter_mut().filter(|r| r.identity == identity) {
                record.metadata = Some(metadata.to_string());
            }
        }
        self.emit(TransportEvent::MetadataChanged { identity });
    }

    /// Deliver an envelope as if `sender` had broadcast it.
    pub fn deliver(&self, sender: &str, envelope: &MessageEnvelope) {
        self.deliver_raw(sender, encode(envelope));
    }

    /// Deliver raw bytes as if `sender` had broadcast them.
    pub fn deliver_raw(&self, sender: &str, payload: impl Into<Bytes>) {
        self.emit(TransportEvent::DataReceived {
            sender: ParticipantIdentity::new(sender),
            payload: payload.into(),
        });
    }

    // ------------------------------------------------------------------
    // Recorded calls
    // ------------------------------------------------------------------

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    #[must_use]
    pub fn connect_calls(&self) -> Vec<ConnectCall> {
        self.state.lock().unwrap().connect_calls.clone()
    }

    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnect_calls
    }

    #[must_use]
    pub fn published(&self) -> Vec<PublishedPayload> {
        self.state.lock().unwrap().published.clone()
    }

    /// Published payloads decoded back to envelopes.
    #[must_use]
    pub fn published_envelopes(&self) -> Vec<(MessageEnvelope, DeliveryClass)> {
        self.published()
            .into_iter()
            .map(|p| (decode(&p.payload).unwrap(), p.delivery))
            .collect()
    }

    #[must_use]
    pub fn metadata_updates(&self) -> Vec<String> {
        self.state.lock().unwrap().metadata_updates.clone()
    }

    #[must_use]
    pub fn media_calls(&self) -> Vec<MediaCall> {
        self.state.lock().unwrap().media_calls.clone()
    }

    /// Total number of calls that touch the connection.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.connect_calls.len() + state.disconnect_calls + state.published.len()
    }

    fn require_connected(&self) -> Result<(), TransportError> {
        if self.state.lock().unwrap().connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl ParticipantSource for MockTransport {
    fn local_participant(&self) -> Option<ParticipantRecord> {
        let state = self.state.lock().unwrap();
        if state.connected {
            state.local.clone()
        } else {
            None
        }
    }

    fn remote_participants(&self) -> Vec<ParticipantRecord> {
        let state = self.state.lock().unwrap();
        if state.connected {
            state.remotes.clone()
        } else {
            Vec::new()
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str, token: &SecretString) -> Result<(), TransportError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.connect_calls.push(ConnectCall {
                url: url.to_string(),
                token: token.expose_secret().to_string(),
            });
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let result = state.connect_results.pop_front().unwrap_or(Ok(()));
        state.connected = result.is_ok();
        result
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        state.connected = false;
    }

    async fn publish_data(
        &self,
        payload: Bytes,
        delivery: DeliveryClass,
    ) -> Result<(), TransportError> {
        self.require_connected()?;
        self.state
            .lock()
            .unwrap()
            .published
            .push(PublishedPayload { payload, delivery });
        Ok(())
    }

    async fn set_local_metadata(&self, metadata: String) -> Result<(), TransportError> {
        self.require_connected()?;
        let mut state = self.state.lock().unwrap();
        if let Some(local) = state.local.as_mut() {
            local.metadata = Some(metadata.clone());
        }
        state.metadata_updates.push(metadata);
        Ok(())
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.require_connected()?;
        self.state
            .lock()
            .unwrap()
            .media_calls
            .push(MediaCall::Microphone(enabled));
        Ok(())
    }

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.require_connected()?;
        self.state
            .lock()
            .unwrap()
            .media_calls
            .push(MediaCall::Camera(enabled));
        Ok(())
    }

    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.require_connected()?;
        self.state
            .lock()
            .unwrap()
            .media_calls
            .push(MediaCall::ScreenShare(enabled));
        Ok(())
    }
}
