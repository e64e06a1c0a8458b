//! Periodic limiter status line.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::infrastructure::scheduler::PeriodicTask;

use super::LimiterRegistry;

/// Logs the state of every limiter on a fixed interval.
///
/// Read-only: a beat never refills, debits or decays anything.
pub struct Heartbeat {
    registry: Arc<LimiterRegistry>,
    task: PeriodicTask,
}

impl Heartbeat {
    pub fn new(registry: Arc<LimiterRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            task: PeriodicTask::new("limiter-heartbeat", interval),
        }
    }

    pub fn start(&mut self) {
        let registry = Arc::clone(&self.registry);
        self.task.start(move || {
            info!(
                rate_limited_total = registry.rate_limited_total(),
                "[RateLimiter] {}",
                status_line(&registry)
            );
        });
    }

    pub async fn stop(&mut self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// The line a beat would log right now.
    pub fn line(&self) -> String {
        status_line(&self.registry)
    }
}

fn status_line(registry: &LimiterRegistry) -> String {
    registry
        .snapshots()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::limiter::RateLimiter;
    use crate::domain::PenaltyPolicy;
    use crate::infrastructure::config::WindowConfig;
    use crate::testkit::clock::ManualClock;

    fn registry() -> Arc<LimiterRegistry> {
        let clock = Arc::new(ManualClock::new());
        let limiter = |name: &str, capacity: f64| {
            Arc::new(
                RateLimiter::new(
                    name,
                    &[WindowConfig::per("per-10s", capacity, 10.0)],
                    PenaltyPolicy::default(),
                    clock.clone(),
                )
                .unwrap(),
            )
        };
        Arc::new(LimiterRegistry::single(limiter("default", 8.0)).with_bucket("book", limiter("book", 40.0)))
    }

    #[test]
    fn test_line_lists_every_limiter() {
        let heartbeat = Heartbeat::new(registry(), Duration::from_secs(30));
        assert_eq!(heartbeat.line(), "default[per-10s:8/8] | book[per-10s:40/40]");
    }

    #[test]
    fn test_line_does_not_consume_tokens() {
        let registry = registry();
        let heartbeat = Heartbeat::new(Arc::clone(&registry), Duration::from_secs(30));
        let before = registry.snapshots();
        let _ = heartbeat.line();
        let _ = heartbeat.line();
        assert_eq!(registry.snapshots(), before);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let mut heartbeat = Heartbeat::new(registry(), Duration::from_millis(5));
        heartbeat.start();
        assert!(heartbeat.is_running());
        tokio::time::sleep(Duration::from_millis(20)).await;
        heartbeat.stop().await;
        assert!(!heartbeat.is_running());
    }
}
