//! Per-speaker live caption aggregation.
//!
//! `CaptionAggregator` is a TTL cache keyed by speaker identity. It is pure:
//! callers pass the current instant, so expiry can be driven by a periodic
//! [`CaptionAggregator::sweep`] or checked lazily on read.
//!
//! Expiry rules:
//! - A final fragment keeps its entry visible for `expiry_delay`.
//! - An interim fragment that is never followed by another update is dropped
//!   after `interim_ttl`, so a speaker who vanishes mid-utterance does not
//!   leave a caption on screen forever.

use chrono::{DateTime, Utc};
use common::types::ParticipantIdentity;
use session_protocol::MessageEnvelope;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// An incremental or final piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionFragment {
    pub speaker_id: ParticipantIdentity,
    pub speaker_name: String,
    pub text: String,
    pub is_final: bool,
}

impl CaptionFragment {
    /// Extract a fragment from a caption envelope. Chat envelopes yield `None`.
    #[must_use]
    pub fn from_envelope(envelope: MessageEnvelope) -> Option<Self> {
        match envelope {
            MessageEnvelope::Caption {
                text,
                speaker_id,
                speaker_name,
                is_final,
            } => Some(Self {
                speaker_id,
                speaker_name,
                text,
                is_final,
            }),
            MessageEnvelope::Chat { .. } => None,
        }
    }

    #[must_use]
    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope::caption(
            self.text.clone(),
            self.speaker_id.clone(),
            self.speaker_name.clone(),
            self.is_final,
        )
    }
}

/// The caption currently shown for one speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionEntry {
    pub speaker_id: ParticipantIdentity,
    pub speaker_name: String,
    pub text: String,
    pub last_updated_at: Instant,
    pub is_final: bool,
}

/// One finalised utterance. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub speaker_id: ParticipantIdentity,
    pub speaker_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CachedEntry {
    entry: CaptionEntry,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Ephemeral caption state plus the session transcript.
#[derive(Debug)]
pub struct CaptionAggregator {
    entries: HashMap<ParticipantIdentity, CachedEntry>,
    transcript: Vec<TranscriptLine>,
    expiry_delay: Duration,
    interim_ttl: Duration,
    enabled: bool,
}

impl CaptionAggregator {
    /// Create a disabled aggregator.
    #[must_use]
    pub fn new(expiry_delay: Duration, interim_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            transcript: Vec::new(),
            expiry_delay,
            interim_ttl,
            enabled: false,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn captions on or off.
    ///
    /// Disabling drops every live entry. The transcript is kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.entries.clear();
        }
    }

    /// Fold a fragment into the speaker's entry.
    ///
    /// Returns `false` when captions are disabled and the fragment was ignored.
    pub fn apply(&mut self, fragment: CaptionFragment, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }

        if fragment.is_final {
            self.transcript.push(TranscriptLine {
                speaker_id: fragment.speaker_id.clone(),
                speaker_name: fragment.speaker_name.clone(),
                text: fragment.text.clone(),
                created_at: Utc::now(),
            });
        }

        let ttl = if fragment.is_final {
            self.expiry_delay
        } else {
            self.interim_ttl
        };

        self.entries.insert(
            fragment.speaker_id.clone(),
            CachedEntry {
                entry: CaptionEntry {
                    speaker_id: fragment.speaker_id,
                    speaker_name: fragment.speaker_name,
                    text: fragment.text,
                    last_updated_at: now,
                    is_final: fragment.is_final,
                },
                expires_at: now + ttl,
            },
        );

        true
    }

    /// All unexpired entries, oldest update first.
    #[must_use]
    pub fn entries(&self, now: Instant) -> Vec<CaptionEntry> {
        let mut live: Vec<CaptionEntry> = self
            .entries
            .values()
            .filter(|cached| !cached.is_expired(now))
            .map(|cached| cached.entry.clone())
            .collect();
        live.sort_by(|a, b| {
            a.last_updated_at
                .cmp(&b.last_updated_at)
                .then_with(|| a.speaker_id.cmp(&b.speaker_id))
        });
        live
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| !cached.is_expired(now));
        before - self.entries.len()
    }

    /// Earliest instant at which some entry expires.
    #[must_use]
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.values().map(|cached| cached.expires_at).min()
    }

    #[must_use]
    pub fn transcript(&self) -> &[TranscriptLine] {
        &self.transcript
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const EXPIRY: Duration = Duration::from_millis(500);
    const INTERIM_TTL: Duration = Duration::from_secs(5);

    fn enabled() -> CaptionAggregator {
        let mut aggregator = CaptionAggregator::new(EXPIRY, INTERIM_TTL);
        aggregator.set_enabled(true);
        aggregator
    }

    fn fragment(speaker: &str, text: &str, is_final: bool) -> CaptionFragment {
        CaptionFragment {
            speaker_id: ParticipantIdentity::new(speaker),
            speaker_name: speaker.to_uppercase(),
            text: text.to_string(),
            is_final,
        }
    }

    fn entry(
        aggregator: &CaptionAggregator,
        speaker: &ParticipantIdentity,
        now: Instant,
    ) -> Option<CaptionEntry> {
        aggregator
            .entries(now)
            .into_iter()
            .find(|entry| &entry.speaker_id == speaker)
    }

    #[test]
    fn test_disabled_by_default_ignores_fragments() {
        let mut aggregator = CaptionAggregator::new(EXPIRY, INTERIM_TTL);
        let now = Instant::now();

        assert!(!aggregator.apply(fragment("ana", "hello", true), now));
        assert!(aggregator.entries(now).is_empty());
        assert!(aggregator.transcript().is_empty());
    }

    #[test]
    fn test_interim_updates_replace_text() {
        let mut aggregator = enabled();
        let now = Instant::now();

        aggregator.apply(fragment("ana", "hel", false), now);
        aggregator.apply(
            fragment("ana", "hello wor", false),
            now + Duration::from_millis(100),
        );

        let later = now + Duration::from_millis(150);
        let live = entry(&aggregator, &ParticipantIdentity::new("ana"), later).unwrap();
        assert_eq!(live.text, "hello wor");
        assert!(!live.is_final);
        assert!(aggregator.transcript().is_empty());
    }

    #[test]
    fn test_final_fragment_expires_after_delay() {
        let mut aggregator = enabled();
        let now = Instant::now();
        let ana = ParticipantIdentity::new("ana");

        aggregator.apply(fragment("ana", "hello", false), now);
        aggregator.apply(fragment("ana", "hello world", true), now);

        assert!(entry(&aggregator, &ana, now + EXPIRY - Duration::from_millis(1)).is_some());
        assert!(entry(&aggregator, &ana, now + EXPIRY + Duration::from_millis(1)).is_none());

        assert_eq!(aggregator.sweep(now + EXPIRY + Duration::from_millis(1)), 1);
        assert_eq!(aggregator.next_expiry(), None);
    }

    #[test]
    fn test_final_without_interim_is_recorded_and_shown() {
        let mut aggregator = enabled();
        let now = Instant::now();

        aggregator.apply(fragment("bo", "yes", true), now);

        assert_eq!(aggregator.entries(now).len(), 1);
        let line = aggregator.transcript().first().unwrap();
        assert_eq!(line.speaker_id.as_str(), "bo");
        assert_eq!(line.text, "yes");
    }

    #[test]
    fn test_stale_interim_is_dropped() {
        let mut aggregator = enabled();
        let now = Instant::now();

        aggregator.apply(fragment("ana", "and then", false), now);

        assert_eq!(aggregator.entries(now + INTERIM_TTL - Duration::from_millis(1)).len(), 1);
        assert!(aggregator.entries(now + INTERIM_TTL).is_empty());
    }

    #[test]
    fn test_interim_after_final_starts_new_utterance() {
        let mut aggregator = enabled();
        let now = Instant::now();
        let ana = ParticipantIdentity::new("ana");

        aggregator.apply(fragment("ana", "first", true), now);
        let later = now + Duration::from_millis(200);
        aggregator.apply(fragment("ana", "sec", false), later);

        // Interim TTL now governs the entry, not the earlier final expiry
        let live = entry(&aggregator, &ana, now + EXPIRY + Duration::from_millis(10)).unwrap();
        assert_eq!(live.text, "sec");
        assert_eq!(aggregator.transcript().len(), 1);
    }

    #[test]
    fn test_speakers_are_independent() {
        let mut aggregator = enabled();
        let now = Instant::now();

        aggregator.apply(fragment("ana", "good morning", false), now);
        aggregator.apply(
            fragment("bo", "hi all", false),
            now + Duration::from_millis(10),
        );
        aggregator.apply(
            fragment("ana", "good morning everyone", false),
            now + Duration::from_millis(20),
        );

        let entries = aggregator.entries(now + Duration::from_millis(30));
        assert_eq!(entries.len(), 2);

        let bo = entries.first().unwrap();
        assert_eq!(bo.speaker_id.as_str(), "bo");
        assert_eq!(bo.text, "hi all");

        let ana = entries.get(1).unwrap();
        assert_eq!(ana.speaker_id.as_str(), "ana");
        assert_eq!(ana.speaker_name, "ANA");
        assert_eq!(ana.text, "good morning everyone");
    }

    #[test]
    fn test_disable_clears_entries_but_keeps_transcript() {
        let mut aggregator = enabled();
        let now = Instant::now();

        aggregator.apply(fragment("ana", "done", true), now);
        aggregator.apply(fragment("bo", "still talk", false), now);
        aggregator.set_enabled(false);

        assert!(aggregator.entries(now).is_empty());
        assert_eq!(aggregator.transcript().len(), 1);
        assert!(!aggregator.apply(fragment("bo", "ignored", true), now));
        assert_eq!(aggregator.transcript().len(), 1);
    }

    #[test]
    fn test_fragment_envelope_conversion() {
        let original = fragment("ana", "hi", true);
        let back = CaptionFragment::from_envelope(original.to_envelope()).unwrap();
        assert_eq!(back, original);
        assert!(CaptionFragment::from_envelope(MessageEnvelope::chat("hi")).is_none());
    }
}
