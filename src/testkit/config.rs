//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use crate::infrastructure::config::{
    BucketConfig, LimitsConfig, PenaltyConfig, PerfConfig, TransportConfig, WindowConfig,
};

/// Transport config with short, jitter-free backoff.
pub fn transport() -> TransportConfig {
    TransportConfig {
        max_attempts: 3,
        backoff_base_ms: 10,
        backoff_cap_ms: 100,
        jitter_ratio: 0.0,
        connect_timeout_ms: 1_000,
        attempt_timeout_ms: 5_000,
        total_timeout_ms: 90_000,
        session_max_uses: 0,
        workers: Some(1),
        response_logs: false,
    }
}

/// Limits with one default window of `capacity` per `seconds` and no safety margin.
pub fn limits(capacity: f64, seconds: f64) -> LimitsConfig {
    LimitsConfig {
        safety_pct: 1.0,
        default: BucketConfig::new(vec![WindowConfig::per("per-window", capacity, seconds)]),
        buckets: Default::default(),
        penalty: PenaltyConfig::default(),
        heartbeat_secs: 30,
    }
}

/// Perf config that never flushes on its own.
pub fn perf() -> PerfConfig {
    PerfConfig {
        flush_every: usize::MAX,
        flush_interval_secs: 3600,
        report_path: None,
    }
}
