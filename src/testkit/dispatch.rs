//! Scripted [`Dispatcher`] for transport tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Reply, Request, WorkerId};
use crate::error::ConfigError;
use crate::port::{DispatchError, Dispatcher};

use super::clock::ManualClock;

/// A dispatcher that replays queued outcomes.
///
/// Each `dispatch()` pops the next outcome; once the queue is empty every
/// attempt gets a `200` with an empty body. Sessions are numbered in the
/// order they were opened.
pub struct ScriptedDispatcher {
    replies: Mutex<VecDeque<Result<Reply, DispatchError>>>,
    dispatch_count: AtomicU32,
    sessions_opened: AtomicU32,
    timeouts: Mutex<Vec<Duration>>,
    latency: Option<(Arc<ManualClock>, Duration)>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            dispatch_count: AtomicU32::new(0),
            sessions_opened: AtomicU32::new(0),
            timeouts: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    #[must_use]
    pub fn with_replies(self, replies: Vec<Result<Reply, DispatchError>>) -> Self {
        *self.replies.lock() = replies.into();
        self
    }

    /// Advance `clock` by `latency` on every attempt.
    #[must_use]
    pub fn with_latency(mut self, clock: Arc<ManualClock>, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    pub fn push(&self, reply: Result<Reply, DispatchError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> u32 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Per-attempt timeouts passed by the transport, in order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().clone()
    }
}

impl Default for ScriptedDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    type Session = u32;

    fn open_session(&self, _worker: WorkerId) -> Result<u32, ConfigError> {
        Ok(self.sessions_opened.fetch_add(1, Ordering::SeqCst))
    }

    async fn dispatch(
        &self,
        _session: &u32,
        _request: &Request,
        timeout: Duration,
    ) -> Result<Reply, DispatchError> {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().push(timeout);
        if let Some((clock, latency)) = &self.latency {
            clock.advance(*latency);
        }
        let next = self.replies.lock().pop_front();
        tokio::task::yield_now().await;
        next.unwrap_or_else(|| Ok(Reply::new(200, "")))
    }
}
