//! Rate limit window and penalty configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::PenaltyPolicy;
use crate::error::ConfigError;

/// Name of the bucket used when a request names no configured bucket.
pub const DEFAULT_BUCKET: &str = "default";

/// One token bucket window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowConfig {
    /// Window identifier, unique within a bucket.
    pub name: String,
    /// Maximum burst size in tokens.
    pub capacity: f64,
    /// Tokens restored per second.
    pub refill_per_sec: f64,
}

impl WindowConfig {
    pub fn new(name: impl Into<String>, capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            name: name.into(),
            capacity,
            refill_per_sec,
        }
    }

    /// A window allowing `limit` requests per `seconds`.
    pub fn per(name: impl Into<String>, limit: f64, seconds: f64) -> Self {
        Self::new(name, limit, limit / seconds)
    }

    /// Parse a `limit/seconds` pair such as `50/10`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWindow`] on malformed input.
    pub fn parse_limit(name: &str, value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidWindow {
            window: name.to_string(),
            reason: format!("{reason} in '{value}' (expected limit/seconds)"),
        };

        let (limit, seconds) = value.trim().split_once('/').ok_or_else(|| invalid("missing '/'"))?;
        let limit: f64 = limit.trim().parse().map_err(|_| invalid("bad limit"))?;
        let seconds: f64 = seconds.trim().parse().map_err(|_| invalid("bad seconds"))?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(invalid("seconds must be > 0"));
        }
        Ok(Self::per(name, limit, seconds))
    }

    /// Apply a safety fraction to both limit and rate.
    ///
    /// Capacity is floored to whole tokens but never below one, so a tiny
    /// limit stays usable.
    #[must_use]
    pub fn scaled(&self, safety: f64) -> Self {
        if self.capacity <= 0.0 {
            return self.clone();
        }
        let capacity = (self.capacity * safety).floor().max(1.0);
        let ratio = capacity / self.capacity;
        Self {
            name: self.name.clone(),
            capacity,
            refill_per_sec: self.refill_per_sec * ratio,
        }
    }
}

/// Windows enforced together for one bucket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BucketConfig {
    pub windows: Vec<WindowConfig>,
}

impl BucketConfig {
    pub fn new(windows: Vec<WindowConfig>) -> Self {
        Self { windows }
    }

    /// Drop a window by name, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.windows.len();
        self.windows.retain(|w| w.name != name);
        self.windows.len() != before
    }

    /// Insert or replace a window by name.
    pub fn upsert(&mut self, window: WindowConfig) {
        match self.windows.iter_mut().find(|w| w.name == window.name) {
            Some(existing) => *existing = window,
            None => self.windows.push(window),
        }
    }
}

/// Penalty behaviour after upstream 429 responses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PenaltyConfig {
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    #[serde(default = "default_decay_secs")]
    pub decay_secs: u64,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Longest pause a single 429 may impose, whatever `Retry-After` says.
    #[serde(default = "default_max_pause_ms")]
    pub max_pause_ms: u64,
}

const fn default_growth_factor() -> f64 {
    2.0
}

const fn default_max_multiplier() -> f64 {
    8.0
}

const fn default_decay_secs() -> u64 {
    60
}

const fn default_pause_ms() -> u64 {
    5000
}

const fn default_max_pause_ms() -> u64 {
    300_000
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            growth_factor: default_growth_factor(),
            max_multiplier: default_max_multiplier(),
            decay_secs: default_decay_secs(),
            pause_ms: default_pause_ms(),
            max_pause_ms: default_max_pause_ms(),
        }
    }
}

impl From<&PenaltyConfig> for PenaltyPolicy {
    fn from(config: &PenaltyConfig) -> Self {
        Self {
            growth_factor: config.growth_factor,
            max_multiplier: config.max_multiplier,
            decay_interval: Duration::from_secs(config.decay_secs),
            pause_base: Duration::from_millis(config.pause_ms),
            max_pause: Duration::from_millis(config.max_pause_ms),
        }
    }
}

/// Limiter configuration: buckets, safety margin, penalty and heartbeat.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LimitsConfig {
    /// Fraction of each published limit actually used (0, 1].
    #[serde(default = "default_safety_pct")]
    pub safety_pct: f64,
    /// Windows for requests whose bucket is not configured.
    #[serde(default = "default_bucket")]
    pub default: BucketConfig,
    /// Named buckets, usually one per upstream endpoint family.
    #[serde(default = "default_buckets")]
    pub buckets: BTreeMap<String, BucketConfig>,
    #[serde(default)]
    pub penalty: PenaltyConfig,
    /// Seconds between heartbeat log lines.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

const fn default_safety_pct() -> f64 {
    0.8
}

const fn default_heartbeat_secs() -> u64 {
    30
}

fn default_bucket() -> BucketConfig {
    BucketConfig::new(vec![WindowConfig::per("per-10s", 10.0, 10.0)])
}

fn default_buckets() -> BTreeMap<String, BucketConfig> {
    [
        ("clob_book", 50.0),
        ("clob_prices_history", 40.0),
        ("data_activity", 40.0),
        ("data_closed_positions", 40.0),
        ("data_holders", 40.0),
        ("data_positions", 40.0),
        ("gamma_markets", 125.0),
    ]
    .into_iter()
    .map(|(name, limit)| {
        (
            name.to_string(),
            BucketConfig::new(vec![WindowConfig::per("per-10s", limit, 10.0)]),
        )
    })
    .collect()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            safety_pct: default_safety_pct(),
            default: default_bucket(),
            buckets: default_buckets(),
            penalty: PenaltyConfig::default(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Windows for `bucket` with the safety fraction applied.
    pub fn effective_windows(&self, bucket: &BucketConfig) -> Vec<WindowConfig> {
        bucket
            .windows
            .iter()
            .map(|w| w.scaled(self.safety_pct))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.safety_pct > 0.0 && self.safety_pct <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "safety_pct",
                reason: format!("must be in (0, 1], got {}", self.safety_pct),
            });
        }
        if self.heartbeat_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "heartbeat_secs",
                reason: "must be > 0".into(),
            });
        }
        if !self.penalty.max_multiplier.is_finite() || self.penalty.max_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "penalty.max_multiplier",
                reason: format!("must be >= 1, got {}", self.penalty.max_multiplier),
            });
        }
        if !self.penalty.growth_factor.is_finite() || self.penalty.growth_factor < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "penalty.growth_factor",
                reason: format!("must be >= 1, got {}", self.penalty.growth_factor),
            });
        }
        if self.penalty.max_pause_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "penalty.max_pause_ms",
                reason: "must be > 0".into(),
            });
        }

        for (name, bucket) in std::iter::once((DEFAULT_BUCKET, &self.default))
            .chain(self.buckets.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if bucket.windows.is_empty() {
                return Err(ConfigError::InvalidWindow {
                    window: name.to_string(),
                    reason: "bucket has no windows".into(),
                });
            }
            for window in &bucket.windows {
                if !window.capacity.is_finite() || window.capacity <= 0.0 {
                    return Err(ConfigError::InvalidWindow {
                        window: format!("{name}.{}", window.name),
                        reason: format!("capacity must be > 0, got {}", window.capacity),
                    });
                }
                if !window.refill_per_sec.is_finite() || window.refill_per_sec < 0.0 {
                    return Err(ConfigError::InvalidWindow {
                        window: format!("{name}.{}", window.name),
                        reason: format!("refill rate must be >= 0, got {}", window.refill_per_sec),
                    });
                }
            }
        }
        Ok(())
    }
}
