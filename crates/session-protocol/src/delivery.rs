//! Delivery classes offered by the transport's data channel.

use crate::envelope::MessageEnvelope;

/// How the transport should deliver a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryClass {
    /// Ordered per sender and retried until delivered.
    Reliable,
    /// Unordered, may be dropped. Lowest latency.
    BestEffort,
}

impl DeliveryClass {
    /// Returns the delivery class as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeliveryClass::Reliable => "reliable",
            DeliveryClass::BestEffort => "best_effort",
        }
    }

    /// Whether the transport must retry this payload.
    #[must_use]
    pub const fn is_reliable(&self) -> bool {
        matches!(self, DeliveryClass::Reliable)
    }
}

impl MessageEnvelope {
    /// Delivery class this envelope must be published with.
    ///
    /// Chat and final caption fragments are reliable; finality must never be
    /// lost. Interim caption fragments are best-effort since a newer one
    /// supersedes them.
    #[must_use]
    pub const fn delivery_class(&self) -> DeliveryClass {
        match self {
            MessageEnvelope::Chat { .. }
            | MessageEnvelope::Caption { is_final: true, .. } => DeliveryClass::Reliable,
            MessageEnvelope::Caption { is_final: false, .. } => DeliveryClass::BestEffort,
        }
    }
}
