//! HTTP dispatch port.
//!
//! A [`Dispatcher`] owns how sessions are opened and how one attempt is sent.
//! Retry, admission and deadline logic stay in the transport.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Reply, Request, WorkerId};
use crate::error::ConfigError;

/// Failure of a single attempt before any HTTP status was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("attempt timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request could not be built: {0}")]
    Request(String),
}

impl DispatchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Request(_))
    }
}

/// Executes single HTTP attempts over worker-bound sessions.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Connection context reused by one worker.
    type Session: Send + Sync;

    /// Open a new session for `worker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    fn open_session(&self, worker: WorkerId) -> Result<Self::Session, ConfigError>;

    /// Send one attempt of `request`, giving up after `timeout`.
    async fn dispatch(
        &self,
        session: &Self::Session,
        request: &Request,
        timeout: Duration,
    ) -> Result<Reply, DispatchError>;
}
