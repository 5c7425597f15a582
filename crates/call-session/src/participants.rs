//! Participant registry.
//!
//! A derived, read-mostly view of everyone in the session. The registry task
//! listens to transport participant events and session status, rebuilds the
//! snapshot from the transport listing and publishes it on a watch channel.
//!
//! Participant metadata is remotely supplied JSON:
//!
//! ```json
//! { "displayName": "Ada Lovelace", "profileImageUrl": "https://..." }
//! ```
//!
//! Anything unparseable degrades to an anonymous participant shown by identity.

use crate::observability::metrics;
use crate::state::{SessionState, SessionStatus};
use crate::transport::{ParticipantRecord, ParticipantSource, TransportEvent};
use common::types::ParticipantIdentity;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A participant as rendered by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: ParticipantIdentity,
    pub display_name: String,
    pub profile_image_url: Option<String>,
    pub is_local: bool,
}

impl Participant {
    /// Build a participant from a transport record, parsing its metadata.
    #[must_use]
    pub fn from_record(record: ParticipantRecord, is_local: bool) -> Self {
        let profile = record.metadata.as_deref().and_then(ProfileMetadata::parse);

        match profile {
            Some(profile) => Self {
                identity: record.identity,
                display_name: profile.display_name,
                profile_image_url: profile.profile_image_url,
                is_local,
            },
            None => Self {
                display_name: record.identity.to_string(),
                identity: record.identity,
                profile_image_url: None,
                is_local,
            },
        }
    }

    /// Whether no usable profile metadata was published.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.profile_image_url.is_none() && self.display_name == self.identity.as_str()
    }
}

/// Profile metadata published by each participant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl ProfileMetadata {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            profile_image_url: None,
        }
    }

    #[must_use]
    pub fn with_profile_image_url(mut self, url: impl Into<String>) -> Self {
        self.profile_image_url = Some(url.into());
        self
    }

    /// Parse remote metadata. Returns `None` for malformed JSON or a blank name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut profile: Self = serde_json::from_str(raw).ok()?;

        profile.display_name = profile.display_name.trim().to_string();
        if profile.display_name.is_empty() {
            return None;
        }

        profile.profile_image_url = profile
            .profile_image_url
            .filter(|url| !url.trim().is_empty());

        Some(profile)
    }

    /// Wire form for `Transport::set_local_metadata`.
    #[must_use]
    pub fn to_json(&self) -> String {
        let value = match &self.profile_image_url {
            Some(url) => json!({ "displayName": self.display_name, "profileImageUrl": url }),
            None => json!({ "displayName": self.display_name }),
        };
        value.to_string()
    }
}

/// Local participant first, then remotes in transport order, de-duplicated by
/// identity.
#[must_use]
pub fn build_snapshot(
    local: Option<ParticipantRecord>,
    remotes: Vec<ParticipantRecord>,
) -> Vec<Participant> {
    let mut seen = HashSet::new();
    let mut snapshot = Vec::with_capacity(remotes.len() + 1);

    if let Some(local) = local {
        seen.insert(local.identity.clone());
        snapshot.push(Participant::from_record(local, true));
    }

    for remote in remotes {
        if seen.insert(remote.identity.clone()) {
            snapshot.push(Participant::from_record(remote, false));
        }
    }

    snapshot
}

/// Receiver side of the participant snapshot.
pub type ParticipantsReceiver = watch::Receiver<Vec<Participant>>;

/// Keeps the participant snapshot current.
pub struct ParticipantRegistry {
    source: Arc<dyn ParticipantSource>,
    status: watch::Receiver<SessionStatus>,
    snapshot: watch::Sender<Vec<Participant>>,
    cancel_token: CancellationToken,
}

impl ParticipantRegistry {
    /// Spawn the registry task.
    ///
    /// The snapshot is empty until the session reaches `Connected` and is
    /// cleared again on `Idle` and `Error`.
    pub fn spawn(
        source: Arc<dyn ParticipantSource>,
        status: watch::Receiver<SessionStatus>,
        cancel_token: CancellationToken,
    ) -> (ParticipantsReceiver, JoinHandle<()>) {
        let (snapshot, receiver) = watch::channel(Vec::new());

        let registry = Self {
            source,
            status,
            snapshot,
            cancel_token,
        };

        let task_handle = tokio::spawn(registry.run());

        (receiver, task_handle)
    }

    #[instrument(skip_all, name = "call.participants")]
    async fn run(mut self) {
        let mut events = self.source.subscribe();
        let mut events_open = true;
        let mut status_open = true;

        // The session may already be connected
        let initial = self.status.borrow_and_update().state.clone();
        self.on_state(&initial);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.participants", "Participant registry cancelled");
                    break;
                }

                changed = self.status.changed(), if status_open => {
                    if changed.is_err() {
                        status_open = false;
                        continue;
                    }
                    let state = self.status.borrow_and_update().state.clone();
                    self.on_state(&state);
                }

                event = events.recv(), if events_open => {
                    match event {
                        Ok(
                            TransportEvent::ParticipantJoined { .. }
                            | TransportEvent::ParticipantLeft { .. }
                            | TransportEvent::MetadataChanged { .. }
                            | TransportEvent::Reconnected,
                        ) => {
                            if self.is_connected() {
                                self.refresh();
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "call.participants",
                                skipped = skipped,
                                "Participant registry lagged behind transport events"
                            );
                            if self.is_connected() {
                                self.refresh();
                            }
                        }
                        Err(RecvError::Closed) => {
                            debug!(target: "call.participants", "Transport event stream closed");
                            events_open = false;
                        }
                    }
                }
            }

            if !events_open && !status_open {
                break;
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.status.borrow().state == SessionState::Connected
    }

    fn on_state(&self, state: &SessionState) {
        match state {
            SessionState::Connected => self.refresh(),
            SessionState::Idle | SessionState::Error(_) => self.publish(Vec::new()),
            state if state.is_recovering() => {
                debug!(
                    target: "call.participants",
                    state = %state,
                    "Keeping last snapshot while the session recovers"
                );
            }
            _ => {}
        }
    }

    fn refresh(&self) {
        let snapshot = build_snapshot(
            self.source.local_participant(),
            self.source.remote_participants(),
        );
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: Vec<Participant>) {
        let count = snapshot.len();
        let changed = self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        if changed {
            metrics::set_participants_active(count);
            debug!(target: "call.participants", count = count, "Participant snapshot updated");
        }
    }
}
