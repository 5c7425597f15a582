//! Mock credential refresher.
//!
//! Returns scripted outcomes in order. The last outcome repeats once the
//! script is exhausted.

use crate::fixtures::refreshed_credentials;
use async_trait::async_trait;
use call_session::{CredentialRefresher, Credentials, RefreshError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted `CredentialRefresher`.
#[derive(Debug)]
pub struct MockCredentialRefresher {
    outcomes: Mutex<VecDeque<Result<Credentials, RefreshError>>>,
    call_count: AtomicUsize,
}

impl MockCredentialRefresher {
    /// Refresher returning `outcomes` in order, repeating the last one.
    #[must_use]
    pub fn scripted(outcomes: Vec<Result<Credentials, RefreshError>>) -> Arc<Self> {
        assert!(!outcomes.is_empty(), "script needs at least one outcome");
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            call_count: AtomicUsize::new(0),
        })
    }

    /// Always returns fresh credentials.
    #[must_use]
    pub fn succeeding() -> Arc<Self> {
        Self::scripted(vec![Ok(refreshed_credentials())])
    }

    /// Always reports the session as gone.
    #[must_use]
    pub fn session_gone() -> Arc<Self> {
        Self::scripted(vec![Err(RefreshError::SessionGone)])
    }

    /// Always fails with a retryable network error.
    #[must_use]
    pub fn failing() -> Arc<Self> {
        Self::scripted(vec![Err(RefreshError::Http(
            "connection reset".to_string(),
        ))])
    }

    /// Number of `refresh` calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for MockCredentialRefresher {
    async fn refresh(&self) -> Result<Credentials, RefreshError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes.front().cloned().unwrap()
        }
    }
}
