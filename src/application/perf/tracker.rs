//! Outcome sample buffer and summary emission.
//!
//! [`PerformanceTracker::record`] only appends under a short lock. Summaries
//! are computed by [`PerformanceTracker::flush_summary`], normally driven by
//! a [`SummaryFlusher`](super::SummaryFlusher) on a fixed interval or when
//! the buffer fills up.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::domain::OutcomeSample;
use crate::error::Result;
use crate::infrastructure::config::PerfConfig;
use crate::port::OutcomeRecorder;

use super::summary::PerfSummary;

struct Window {
    started: DateTime<Utc>,
    samples: Vec<OutcomeSample>,
}

/// Buffers outcome samples and turns them into periodic summaries.
pub struct PerformanceTracker {
    window: Mutex<Window>,
    flush_every: usize,
    report_path: Option<PathBuf>,
    wake: Arc<Notify>,
}

impl PerformanceTracker {
    pub fn new(config: &PerfConfig) -> Self {
        Self {
            window: Mutex::new(Window {
                started: Utc::now(),
                samples: Vec::new(),
            }),
            flush_every: config.flush_every.max(1),
            report_path: config.report_path.clone(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Append a sample. Wakes the flusher once the buffer reaches `flush_every`.
    pub fn record(&self, sample: OutcomeSample) {
        let pending = {
            let mut window = self.window.lock();
            window.samples.push(sample);
            window.samples.len()
        };
        if pending >= self.flush_every {
            self.wake.notify_one();
        }
    }

    /// Samples recorded since the last flush.
    pub fn pending(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Notified when the buffer reaches the flush threshold.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Summarize and clear the current window.
    ///
    /// An empty window yields an empty summary and is neither logged nor
    /// written to the report file. Appending to the report is blocking file
    /// I/O; [`SummaryFlusher`](super::SummaryFlusher) calls this on the
    /// blocking pool.
    pub fn flush_summary(&self) -> PerfSummary {
        let now = Utc::now();
        let (started, samples) = {
            let mut window = self.window.lock();
            let started = std::mem::replace(&mut window.started, now);
            (started, std::mem::take(&mut window.samples))
        };

        let summary = PerfSummary::from_samples(&samples, started, now);
        if summary.is_empty() {
            debug!("[Perf] no samples since last flush");
            return summary;
        }

        log_summary(&summary);
        if let Some(path) = &self.report_path {
            if let Err(err) = append_report(path, &summary) {
                warn!(path = %path.display(), error = %err, "Failed to write performance report");
            }
        }
        summary
    }
}

impl OutcomeRecorder for PerformanceTracker {
    fn record(&self, sample: OutcomeSample) {
        PerformanceTracker::record(self, sample);
    }
}

fn log_summary(summary: &PerfSummary) {
    let window_secs = (summary.window_end - summary.window_start).num_seconds();
    let s = &summary.overall;
    info!(
        window_secs,
        count = s.count,
        avg_ms = millis(s.avg),
        p50_ms = millis(s.p50),
        p90_ms = millis(s.p90),
        p95_ms = millis(s.p95),
        max_ms = millis(s.max),
        success = s.success,
        retried = s.retried_success,
        rate_limited = s.rate_limited,
        failed = s.failed,
        err_rate = s.err_rate,
        "[Perf] summary"
    );
    for (endpoint, s) in &summary.endpoints {
        info!(
            endpoint = %endpoint,
            count = s.count,
            avg_ms = millis(s.avg),
            p50_ms = millis(s.p50),
            p95_ms = millis(s.p95),
            max_ms = millis(s.max),
            err_rate = s.err_rate,
            "[Perf] endpoint"
        );
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Append `summary` as one JSON line.
fn append_report(path: &Path, summary: &PerfSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(summary)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}
