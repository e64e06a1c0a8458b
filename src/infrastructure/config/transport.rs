//! HTTP transport configuration: timeouts, retries and session pooling.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Resilient transport configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransportConfig {
    /// Maximum dispatch attempts per logical request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt (milliseconds).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound on any single backoff delay (milliseconds).
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Maximum random jitter as a fraction of the delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    /// TCP/TLS connect timeout (milliseconds).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout for one attempt, further bounded by the remaining deadline.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Default end-to-end deadline when a request sets none.
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    /// Requests served by one session before it is recycled (0 = never).
    #[serde(default = "default_session_max_uses")]
    pub session_max_uses: u64,
    /// Concurrent workers, used to size idle connection pools.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Log one line per response.
    #[serde(default)]
    pub response_logs: bool,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_base_ms() -> u64 {
    500
}

const fn default_backoff_cap_ms() -> u64 {
    30_000
}

const fn default_jitter_ratio() -> f64 {
    0.2
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_attempt_timeout_ms() -> u64 {
    45_000
}

const fn default_total_timeout_ms() -> u64 {
    90_000
}

const fn default_session_max_uses() -> u64 {
    1000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            jitter_ratio: default_jitter_ratio(),
            connect_timeout_ms: default_connect_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            session_max_uses: default_session_max_uses(),
            workers: None,
            response_logs: false,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Idle connections kept per host by each session.
    pub fn pool_size(&self) -> usize {
        let workers = self.workers.unwrap_or_else(num_cpus::get).max(1);
        (workers * 2).max(10)
    }

    /// Apply an `HTTP_TIMEOUT` value.
    ///
    /// Accepts `connect,read,total` seconds or a single value used for both
    /// connect and read with a total of `max(30, 2 * value)`. Values are
    /// clamped to connect >= 0.1s, read >= 0.5s and total >= read.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the value cannot be parsed.
    pub fn apply_http_timeout(&mut self, raw: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            field: "HTTP_TIMEOUT",
            reason,
        };
        let parse = |s: &str| -> Result<f64, ConfigError> {
            let v: f64 = s
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{s}' is not a number")))?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(invalid(format!("'{s}' is not finite")))
            }
        };

        let parts: Vec<&str> = raw.trim().split(',').collect();
        let (connect, read, total) = match parts.as_slice() {
            [single] => {
                let v = parse(single)?.max(0.5);
                (v, v, (2.0 * v).max(30.0))
            }
            [c, r, t] => {
                let connect = parse(c)?.max(0.1);
                let read = parse(r)?.max(0.5);
                let total = parse(t)?.max(read);
                (connect, read, total)
            }
            _ => {
                return Err(invalid(format!(
                    "expected 1 or 3 comma-separated values, got '{raw}'"
                )))
            }
        };

        self.connect_timeout_ms = (connect * 1000.0) as u64;
        self.attempt_timeout_ms = (read * 1000.0) as u64;
        self.total_timeout_ms = (total * 1000.0) as u64;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be >= 1".into(),
            });
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "backoff_cap_ms",
                reason: format!(
                    "cap {} is below base {}",
                    self.backoff_cap_ms, self.backoff_base_ms
                ),
            });
        }
        if !self.jitter_ratio.is_finite() || !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "jitter_ratio",
                reason: format!("must be in [0, 1], got {}", self.jitter_ratio),
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "attempt_timeout_ms",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}
