//! Peer broadcast protocol for call sessions.
//!
//! Chat and live caption messages travel between participants over the
//! transport's data channel as small JSON envelopes. This crate owns the
//! envelope type, its wire encoding, and the delivery class each envelope
//! must be sent with.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod delivery;
pub mod envelope;

pub use codec::{decode, encode, encode_bounded, CodecError, MAX_ENVELOPE_BYTES};
pub use delivery::DeliveryClass;
pub use envelope::MessageEnvelope;
