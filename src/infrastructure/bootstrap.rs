//! Composition root: builds the limiter registry, transport, tracker and
//! background tasks from a [`Config`].

use std::sync::Arc;

use tracing::info;

use crate::adapter::outbound::http::ReqwestDispatcher;
use crate::application::limiter::{Heartbeat, LimiterRegistry};
use crate::application::perf::{PerfSummary, PerformanceTracker, SummaryFlusher};
use crate::application::transport::ResilientTransport;
use crate::error::Result;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::settings::Config;
use crate::port::{Clock, Dispatcher};

/// Fully wired access layer with its background tasks.
pub struct Gateway<D: Dispatcher = ReqwestDispatcher> {
    transport: Arc<ResilientTransport<D>>,
    tracker: Arc<PerformanceTracker>,
    heartbeat: Heartbeat,
    flusher: SummaryFlusher,
}

impl Gateway<ReqwestDispatcher> {
    /// Wire the production `reqwest` dispatcher and system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if a limiter bucket is misconfigured.
    pub fn build(config: &Config) -> Result<Self> {
        let dispatcher = ReqwestDispatcher::new(&config.transport);
        Self::build_with(config, dispatcher, Arc::new(SystemClock))
    }
}

impl<D: Dispatcher> Gateway<D> {
    /// Wire an arbitrary dispatcher and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if a limiter bucket is misconfigured.
    pub fn build_with(config: &Config, dispatcher: D, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let limiters = Arc::new(LimiterRegistry::from_config(&config.limits, Arc::clone(&clock))?);
        let tracker = Arc::new(PerformanceTracker::new(&config.perf));
        let transport = ResilientTransport::new(
            dispatcher,
            Arc::clone(&limiters),
            config.transport.clone(),
            clock,
        )
        .with_recorder(Arc::clone(&tracker) as _);

        for snapshot in limiters.snapshots() {
            info!(limiter = %snapshot, "Rate limiter configured");
        }

        Ok(Self {
            transport: Arc::new(transport),
            heartbeat: Heartbeat::new(Arc::clone(&limiters), config.limits.heartbeat_interval()),
            flusher: SummaryFlusher::new(Arc::clone(&tracker), config.perf.flush_interval()),
            tracker,
        })
    }

    /// Start the limiter heartbeat and the summary flusher.
    pub fn start(&mut self) {
        self.heartbeat.start();
        self.flusher.start();
        info!("Gateway background tasks started");
    }

    /// Stop background tasks and flush the final summary.
    pub async fn shutdown(&mut self) -> PerfSummary {
        self.heartbeat.stop().await;
        let summary = self.flusher.stop().await;
        info!("Gateway stopped");
        summary
    }

    pub fn transport(&self) -> &Arc<ResilientTransport<D>> {
        &self.transport
    }

    pub fn limiters(&self) -> &Arc<LimiterRegistry> {
        self.transport.limiters()
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    pub fn is_running(&self) -> bool {
        self.heartbeat.is_running() && self.flusher.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Reply, Request, WorkerId};
    use crate::testkit::clock::ManualClock;
    use crate::testkit::dispatch::ScriptedDispatcher;

    #[tokio::test]
    async fn test_requests_flow_into_final_summary() {
        let dispatcher = ScriptedDispatcher::new().with_replies(vec![
            Ok(Reply::new(200, "")),
            Ok(Reply::new(404, "")),
        ]);
        let mut gateway =
            Gateway::build_with(&Config::default(), dispatcher, ManualClock::shared()).unwrap();
        gateway.start();
        assert!(gateway.is_running());

        let request = || {
            Request::get("https://clob.polymarket.com/book")
                .unwrap()
                .with_bucket("clob_book")
                .with_worker(WorkerId::Task(1))
        };
        gateway.transport().execute(request()).await.unwrap();
        gateway.transport().execute(request()).await.unwrap_err();

        let summary = gateway.shutdown().await;
        assert!(!gateway.is_running());
        assert_eq!(summary.overall.count, 2);
        assert_eq!(summary.overall.failed, 1);
        assert_eq!(summary.endpoints["/book"].count, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.transport.max_attempts = 0;
        let result = Gateway::build_with(&config, ScriptedDispatcher::new(), ManualClock::shared());
        assert!(result.is_err());
    }
}
