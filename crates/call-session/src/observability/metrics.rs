//! Metrics definitions for the call session.
//!
//! All metrics follow Prometheus naming conventions:
//! - `call_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! The embedding application installs the recorder. Without one these calls
//! are no-ops.
//!
//! # Cardinality
//!
//! - `state`: 6 values (`SessionState` variants)
//! - `outcome`: 4 values (scheduled, succeeded, failed, exhausted)
//! - `status`: bounded by `RefreshError::error_type` plus `success`
//! - `reason`: bounded by `CodecError::reason`
//! - `origin`: 2 values (local, remote); `finality`: 2 values (interim, final)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Session lifecycle
// ============================================================================

/// Record a state transition.
///
/// Metric: `call_session_transitions_total`
/// Labels: `state` (the state entered)
pub fn record_transition(state: &'static str) {
    counter!("call_session_transitions_total", "state" => state).increment(1);
}

/// Record a rejoin attempt outcome.
///
/// Metric: `call_rejoin_attempts_total`
/// Labels: `outcome`
pub fn record_rejoin_attempt(outcome: &'static str) {
    counter!("call_rejoin_attempts_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Credential refresh
// ============================================================================

/// Record a credential refresh attempt with its outcome and latency.
///
/// Metrics: `call_credential_refresh_total`, `call_credential_refresh_duration_seconds`
/// Labels: `status`
pub fn record_credential_refresh(status: &'static str, duration: Duration) {
    counter!("call_credential_refresh_total", "status" => status).increment(1);
    histogram!("call_credential_refresh_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Peer channel
// ============================================================================

/// Record a dropped peer payload.
///
/// Metric: `call_peer_messages_dropped_total`
/// Labels: `reason`
pub fn record_peer_message_dropped(reason: &'static str) {
    counter!("call_peer_messages_dropped_total", "reason" => reason).increment(1);
}

/// Record a caption fragment entering the aggregator.
///
/// Metric: `call_caption_fragments_total`
/// Labels: `origin`, `finality`
pub fn record_caption_fragment(is_local: bool, is_final: bool) {
    let origin = if is_local { "local" } else { "remote" };
    let finality = if is_final { "final" } else { "interim" };
    counter!(
        "call_caption_fragments_total",
        "origin" => origin,
        "finality" => finality
    )
    .increment(1);
}

// ============================================================================
// Participants
// ============================================================================

/// Set the number of participants in the latest snapshot.
///
/// Metric: `call_participants_active`
pub fn set_participants_active(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_participants_active").set(count as f64);
}
