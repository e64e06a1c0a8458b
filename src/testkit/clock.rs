//! Virtual time for deterministic tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::port::Clock;

/// A [`Clock`] that only moves when told to.
///
/// `sleep` yields once and then advances virtual time by the requested
/// amount, so a limiter wait of 30 seconds completes instantly while
/// [`elapsed`](Self::elapsed) reports 30 seconds. A sleep dropped while
/// yielding (the losing side of a `select!`) leaves time untouched.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Virtual time since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::task::yield_now().await;
        self.advance(duration);
    }
}
