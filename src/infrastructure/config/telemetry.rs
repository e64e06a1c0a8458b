//! Performance summary configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Performance tracker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PerfConfig {
    /// Buffered samples that trigger an early flush.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Seconds between scheduled flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Append each summary as a JSON line to this file.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

const fn default_flush_every() -> usize {
    800
}

const fn default_flush_interval_secs() -> u64 {
    600
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
            flush_interval_secs: default_flush_interval_secs(),
            report_path: None,
        }
    }
}

impl PerfConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "flush_interval_secs",
                reason: "must be > 0".into(),
            });
        }
        if self.flush_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "flush_every",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}
