//! Request outcome samples recorded by the performance tracker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a logical request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// Succeeded on the first attempt.
    Success,
    /// Succeeded after one or more retries.
    RetriedSuccess,
    /// Failed with the upstream still rejecting with 429.
    RateLimited,
    /// Any other terminal failure.
    Failed,
}

impl StatusCategory {
    /// Categorize a terminal outcome.
    pub fn classify(succeeded: bool, attempts: u32, last_status: Option<u16>) -> Self {
        match (succeeded, last_status) {
            (true, _) if attempts > 1 => Self::RetriedSuccess,
            (true, _) => Self::Success,
            (false, Some(429)) => Self::RateLimited,
            (false, _) => Self::Failed,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::RateLimited | Self::Failed)
    }
}

/// One immutable observation of a logical request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeSample {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub category: StatusCategory,
    pub attempts: u32,
    pub status: Option<u16>,
}

impl OutcomeSample {
    pub fn new(
        endpoint: impl Into<String>,
        latency: Duration,
        category: StatusCategory,
        attempts: u32,
        status: Option<u16>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            latency,
            category,
            attempts,
            status,
        }
    }
}

/// Serialize a duration as fractional milliseconds.
pub(crate) fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}
