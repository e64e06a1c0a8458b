//! System clock backed by the tokio timer.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::port::Clock;

/// Wall-clock time with `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
