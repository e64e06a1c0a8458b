//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file, then overridden by
//! environment variables. Every field has a default, so a missing file
//! section or variable never prevents startup.
//!
//! # Example
//!
//! ```no_run
//! use floodgate::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use super::limits::{LimitsConfig, WindowConfig, DEFAULT_BUCKET};
use super::logging::LoggingConfig;
use super::telemetry::PerfConfig;
use super::transport::TransportConfig;
use crate::error::{ConfigError, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limit buckets, penalty and heartbeat.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Retries, timeouts and session pooling.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Performance summary cadence and report file.
    #[serde(default)]
    pub perf: PerfConfig,
}

impl Config {
    /// Load from a TOML file, apply environment overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config = Self::parse_toml(&content)?;
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Build from defaults and the process environment (including `.env`).
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without environment overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn parse_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content).map_err(ConfigError::Parse)?)
    }

    /// Apply environment-style overrides.
    ///
    /// Unknown keys are ignored. Malformed values are logged and skipped so a
    /// bad variable never prevents startup.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let value = clean(value.as_ref());
            if let Err(err) = self.apply_var(key, value) {
                warn!(key, value, error = %err, "Ignoring invalid environment override");
            }
        }
    }

    fn apply_var(&mut self, key: &str, value: &str) -> std::result::Result<(), ConfigError> {
        match key {
            "RL_SAFETY_PCT" => self.limits.safety_pct = parse("RL_SAFETY_PCT", value)?,
            "RL_HEARTBEAT_SECS" => self.limits.heartbeat_secs = parse("RL_HEARTBEAT_SECS", value)?,
            "RL_PENALTY_MAX" => self.limits.penalty.max_multiplier = parse("RL_PENALTY_MAX", value)?,
            "RL_PENALTY_DECAY_SECS" => self.limits.penalty.decay_secs = parse("RL_PENALTY_DECAY_SECS", value)?,
            "RL_PENALTY_PAUSE_MS" => self.limits.penalty.pause_ms = parse("RL_PENALTY_PAUSE_MS", value)?,
            "RL_PENALTY_MAX_PAUSE_MS" => {
                self.limits.penalty.max_pause_ms = parse("RL_PENALTY_MAX_PAUSE_MS", value)?;
            }
            "HTTP_TIMEOUT" => self.transport.apply_http_timeout(value)?,
            "HTTP_RETRY_TOTAL" => self.transport.max_attempts = parse("HTTP_RETRY_TOTAL", value)?,
            "HTTP_BACKOFF_BASE_MS" => self.transport.backoff_base_ms = parse("HTTP_BACKOFF_BASE_MS", value)?,
            "HTTP_BACKOFF_CAP_MS" => self.transport.backoff_cap_ms = parse("HTTP_BACKOFF_CAP_MS", value)?,
            "HTTP_SESSION_MAX_USES" => self.transport.session_max_uses = parse("HTTP_SESSION_MAX_USES", value)?,
            "WORKERS" => self.transport.workers = Some(parse("WORKERS", value)?),
            "RESPONSE_LOGS" => self.transport.response_logs = truthy(value),
            "PERF_FLUSH_EVERY" => self.perf.flush_every = parse("PERF_FLUSH_EVERY", value)?,
            "PERF_FLUSH_INTERVAL_SECS" => self.perf.flush_interval_secs = parse("PERF_FLUSH_INTERVAL_SECS", value)?,
            "PERF_REPORT_PATH" => {
                self.perf.report_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "LOG_LEVEL" => self.logging.level = value.to_string(),
            "LOG_FORMAT" => self.logging.format = value.to_string(),
            _ => self.apply_window_var(key, value)?,
        }
        Ok(())
    }

    /// Window overrides:
    ///
    /// - `RL_WINDOW_<NAME>=limit/seconds` for the default bucket
    /// - `RL_BUCKET_<BUCKET>__<NAME>=limit/seconds` for a named bucket
    /// - `RL_<BUCKET>_PER_<N>S=limit` shorthand for a named bucket; a limit
    ///   of 0 removes that window
    fn apply_window_var(&mut self, key: &str, value: &str) -> std::result::Result<(), ConfigError> {
        if let Some(name) = key.strip_prefix("RL_WINDOW_") {
            let window = WindowConfig::parse_limit(&window_name(name), value)?;
            self.limits.default.upsert(window);
        } else if let Some(rest) = key.strip_prefix("RL_BUCKET_") {
            let Some((bucket, name)) = rest.split_once("__") else {
                return Err(ConfigError::InvalidValue {
                    field: "RL_BUCKET_",
                    reason: format!("'{key}' must be RL_BUCKET_<BUCKET>__<WINDOW>"),
                });
            };
            let window = WindowConfig::parse_limit(&window_name(name), value)?;
            self.bucket_mut(&bucket.to_ascii_lowercase()).upsert(window);
        } else if let Some((bucket, seconds)) = per_seconds_key(key) {
            let limit: f64 = parse("RL_<BUCKET>_PER_<N>S", value)?;
            let name = format!("per-{seconds}s");
            if limit == 0.0 {
                if let Some(existing) = self.limits.buckets.get_mut(&bucket) {
                    existing.remove(&name);
                }
            } else {
                self.bucket_mut(&bucket).upsert(WindowConfig::per(name, limit, seconds as f64));
            }
        }
        Ok(())
    }

    fn bucket_mut(&mut self, bucket: &str) -> &mut super::limits::BucketConfig {
        if bucket == DEFAULT_BUCKET {
            return &mut self.limits.default;
        }
        self.limits
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| super::limits::BucketConfig::new(Vec::new()))
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.transport.validate()?;
        self.perf.validate()?;
        Ok(())
    }

    /// Initialize the tracing subscriber based on logging config.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

fn clean(value: &str) -> &str {
    value.trim().trim_matches('"').trim_matches('\'')
}

fn truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse<T: std::str::FromStr>(field: &'static str, value: &str) -> std::result::Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field,
        reason: format!("cannot parse '{value}'"),
    })
}

/// `PER_10S` -> `per-10s`.
fn window_name(raw: &str) -> String {
    raw.to_ascii_lowercase().replace('_', "-")
}

/// Split `RL_CLOB_BOOK_PER_10S` into (`clob_book`, 10).
fn per_seconds_key(key: &str) -> Option<(String, u64)> {
    let rest = key.strip_prefix("RL_")?;
    let (bucket, period) = rest.rsplit_once("_PER_")?;
    let seconds: u64 = period.strip_suffix('S')?.parse().ok()?;
    if bucket.is_empty() || seconds == 0 {
        return None;
    }
    Some((bucket.to_ascii_lowercase(), seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env(vars: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        config.apply_env(vars.iter().copied());
        config
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_scalar_overrides() {
        let config = with_env(&[
            ("RL_SAFETY_PCT", "0.5"),
            ("RL_HEARTBEAT_SECS", "5"),
            ("HTTP_RETRY_TOTAL", "5"),
            ("RESPONSE_LOGS", "yes"),
            ("PERF_FLUSH_EVERY", "\"100\""),
        ]);

        assert!((config.limits.safety_pct - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.limits.heartbeat_secs, 5);
        assert_eq!(config.transport.max_attempts, 5);
        assert!(config.transport.response_logs);
        assert_eq!(config.perf.flush_every, 100);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let config = with_env(&[("HTTP_RETRY_TOTAL", "lots"), ("RL_WINDOW_PER_MINUTE", "60")]);
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.limits.default.windows.len(), 1);
    }

    #[test]
    fn test_default_bucket_window_override() {
        let config = with_env(&[("RL_WINDOW_PER_MINUTE", "100/60")]);
        let names: Vec<_> = config
            .limits
            .default
            .windows
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["per-10s", "per-minute"]);
    }

    #[test]
    fn test_named_bucket_window_override() {
        let config = with_env(&[("RL_BUCKET_DATA_TRADES__PER_60S", "120/60")]);
        let bucket = &config.limits.buckets["data_trades"];
        assert_eq!(bucket.windows.len(), 1);
        assert_eq!(bucket.windows[0].name, "per-60s");
        assert!((bucket.windows[0].refill_per_sec - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_minute_window_adds_to_seeded_bucket() {
        let config = with_env(&[("RL_DATA_ACTIVITY_PER_60S", "150")]);
        let names: Vec<_> = config.limits.buckets["data_activity"]
            .windows
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["per-10s", "per-60s"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_shorthand_removes_window() {
        let config = with_env(&[
            ("RL_DATA_ACTIVITY_PER_60S", "150"),
            ("RL_DATA_ACTIVITY_PER_60S", "0"),
        ]);
        assert_eq!(config.limits.buckets["data_activity"].windows.len(), 1);
        assert!(config.validate().is_ok());

        let config = with_env(&[("RL_DATA_TRADES_PER_60S", "0")]);
        assert!(!config.limits.buckets.contains_key("data_trades"));
    }

    #[test]
    fn test_penalty_overrides() {
        let config = with_env(&[
            ("RL_PENALTY_MAX", "4"),
            ("RL_PENALTY_MAX_PAUSE_MS", "1500"),
            ("RL_PENALTY_PAUSE_MS", "not-a-number"),
        ]);
        assert!((config.limits.penalty.max_multiplier - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.limits.penalty.max_pause_ms, 1500);
        assert_eq!(config.limits.penalty.pause_ms, 5000);
    }

    #[test]
    fn test_per_seconds_shorthand() {
        let config = with_env(&[("RL_CLOB_BOOK_PER_10S", "100")]);
        let bucket = &config.limits.buckets["clob_book"];
        assert_eq!(bucket.windows.len(), 1);
        assert!((bucket.windows[0].capacity - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_per_seconds_key_parsing() {
        assert_eq!(
            per_seconds_key("RL_GAMMA_MARKETS_PER_10S"),
            Some(("gamma_markets".to_string(), 10))
        );
        assert_eq!(per_seconds_key("RL_SAFETY_PCT"), None);
        assert_eq!(per_seconds_key("RL_X_PER_0S"), None);
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = Config::parse_toml(
            r#"
[logging]
level = "debug"

[limits]
safety_pct = 1.0

[limits.default]
windows = [{ name = "per-second", capacity = 10, refill_per_sec = 10 }]

[transport]
max_attempts = 4
"#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.limits.default.windows[0].name, "per-second");
        assert!(config.limits.buckets.contains_key("clob_book"));
        assert_eq!(config.transport.max_attempts, 4);
        assert!(config.validate().is_ok());
    }
}
