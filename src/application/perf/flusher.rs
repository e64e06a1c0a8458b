//! Background flushing of a [`PerformanceTracker`].
//!
//! Flushes may append to the report file, so they run on tokio's blocking
//! pool rather than on a runtime worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::infrastructure::scheduler::PeriodicTask;

use super::summary::PerfSummary;
use super::tracker::PerformanceTracker;

/// Flushes a tracker on an interval, early when it fills, and once on stop.
pub struct SummaryFlusher {
    tracker: Arc<PerformanceTracker>,
    task: PeriodicTask,
}

impl SummaryFlusher {
    pub fn new(tracker: Arc<PerformanceTracker>, interval: Duration) -> Self {
        let task = PeriodicTask::with_waker("perf-flusher", interval, tracker.waker());
        Self { tracker, task }
    }

    pub fn start(&mut self) {
        let tracker = Arc::clone(&self.tracker);
        self.task.start(move || {
            let tracker = Arc::clone(&tracker);
            tokio::task::spawn_blocking(move || tracker.flush_summary());
        });
    }

    /// Stop the schedule and flush whatever is still buffered.
    pub async fn stop(&mut self) -> PerfSummary {
        self.task.stop().await;
        let tracker = Arc::clone(&self.tracker);
        match tokio::task::spawn_blocking(move || tracker.flush_summary()).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "Final performance flush failed");
                let now = Utc::now();
                PerfSummary::from_samples(&[], now, now)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}
