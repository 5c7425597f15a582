//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types for
//! every credential that passes through a call session: the transport access
//! token, the user bearer token sent to the credential service, and anything
//! else that must never appear in a log line.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` while holding a secret gets safe logging for free.
//! Tracing fields formatted with `?` are therefore safe as well.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinGrant {
//!     url: String,
//!     token: SecretString,
//! }
//!
//! let grant = JoinGrant {
//!     url: "wss://rtc.example.com".to_string(),
//!     token: SecretString::from("eyJhbGciOi"),
//! };
//!
//! assert!(!format!("{grant:?}").contains("eyJhbGciOi"));
//! assert_eq!(grant.token.expose_secret(), "eyJhbGciOi");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
