//! Aggregate statistics over a window of outcome samples.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::sample::serialize_millis;
use crate::domain::{OutcomeSample, StatusCategory};

/// Latency percentiles and outcome counts for a set of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    #[serde(rename = "avg_ms", serialize_with = "serialize_millis")]
    pub avg: Duration,
    #[serde(rename = "p50_ms", serialize_with = "serialize_millis")]
    pub p50: Duration,
    #[serde(rename = "p90_ms", serialize_with = "serialize_millis")]
    pub p90: Duration,
    #[serde(rename = "p95_ms", serialize_with = "serialize_millis")]
    pub p95: Duration,
    #[serde(rename = "max_ms", serialize_with = "serialize_millis")]
    pub max: Duration,
    pub success: usize,
    pub retried_success: usize,
    pub rate_limited: usize,
    pub failed: usize,
    /// (rate limited + failed) / count.
    pub err_rate: f64,
}

impl LatencyStats {
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a OutcomeSample>,
    {
        let mut stats = Self::default();
        let mut latencies = Vec::new();

        for sample in samples {
            latencies.push(sample.latency);
            match sample.category {
                StatusCategory::Success => stats.success += 1,
                StatusCategory::RetriedSuccess => stats.retried_success += 1,
                StatusCategory::RateLimited => stats.rate_limited += 1,
                StatusCategory::Failed => stats.failed += 1,
            }
        }

        if latencies.is_empty() {
            return stats;
        }

        latencies.sort_unstable();
        let total: Duration = latencies.iter().sum();

        stats.count = latencies.len();
        stats.avg = total / stats.count as u32;
        stats.p50 = percentile(&latencies, 0.50);
        stats.p90 = percentile(&latencies, 0.90);
        stats.p95 = percentile(&latencies, 0.95);
        stats.max = latencies[latencies.len() - 1];
        stats.err_rate = (stats.rate_limited + stats.failed) as f64 / stats.count as f64;
        stats
    }
}

/// Value at percentile `p` (0.0 to 1.0) of sorted `samples`.
fn percentile(samples: &[Duration], p: f64) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    let index = ((samples.len() as f64 - 1.0) * p).round() as usize;
    samples[index.min(samples.len() - 1)]
}

/// One flushed accumulation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub overall: LatencyStats,
    pub endpoints: BTreeMap<String, LatencyStats>,
}

impl PerfSummary {
    pub fn from_samples(
        samples: &[OutcomeSample],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        let mut grouped: BTreeMap<&str, Vec<&OutcomeSample>> = BTreeMap::new();
        for sample in samples {
            grouped.entry(sample.endpoint.as_str()).or_default().push(sample);
        }

        Self {
            window_start,
            window_end,
            overall: LatencyStats::from_samples(samples),
            endpoints: grouped
                .into_iter()
                .map(|(endpoint, group)| {
                    (endpoint.to_string(), LatencyStats::from_samples(group))
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.overall.count == 0
    }
}
