//! Observability for the call session.
//!
//! Tracing targets:
//! - `call.session` - lifecycle state machine and rejoin
//! - `call.peer_channel` - chat and caption traffic
//! - `call.participants` - participant snapshots
//! - `call.credentials` - credential refresh
//!
//! Log fields never include tokens, chat text or caption text.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `call_session_transitions_total` | Counter | `state` | State machine activity |
//! | `call_rejoin_attempts_total` | Counter | `outcome` | Rejoin scheduling and results |
//! | `call_credential_refresh_total` | Counter | `status` | Credential refresh results |
//! | `call_credential_refresh_duration_seconds` | Histogram | none | Credential refresh latency |
//! | `call_peer_messages_dropped_total` | Counter | `reason` | Malformed peer payloads |
//! | `call_caption_fragments_total` | Counter | `origin`, `finality` | Caption traffic |
//! | `call_participants_active` | Gauge | none | Participants in the latest snapshot |

pub mod metrics;

pub use metrics::{
    record_caption_fragment, record_credential_refresh, record_peer_message_dropped,
    record_rejoin_attempt, record_transition, set_participants_active,
};
