//! Clock port.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Source of time for limiter refills, deadlines and backoff sleeps.
///
/// Production code uses the system clock; tests inject a virtual clock so
/// multi-second waits complete instantly.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}
