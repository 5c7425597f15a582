//! # Session Test Utilities
//!
//! Mocks and fixtures for testing the call session without a real media
//! runtime or credential service.
//!
//! ## Modules
//!
//! - `mock_transport` - Scriptable in-memory `Transport`
//! - `mock_refresher` - Scripted `CredentialRefresher`
//! - `fixtures` - Credentials, configs and participant records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let transport = MockTransport::new().with_local_participant(local_record("me", "Me"));
//!     let refresher = MockCredentialRefresher::succeeding();
//!
//!     let call = CallSession::start(&test_session_config(), transport.clone(), refresher);
//!     call.connect(test_credentials()).await.unwrap();
//!
//!     // Simulate network loss
//!     transport.drop_connection("network");
//! }
//! ```

pub mod fixtures;
pub mod mock_refresher;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_refresher::*;
pub use mock_transport::*;
