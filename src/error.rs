use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid window '{window}': {reason}")]
    InvalidWindow { window: String, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("failed to build HTTP session: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Reasons a rate limiter wait ended without admission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimiterError {
    #[error("deadline exceeded after waiting {waited:?} for {weight} token(s)")]
    DeadlineExceeded { waited: Duration, weight: u32 },

    #[error("acquire cancelled after waiting {waited:?}")]
    Cancelled { waited: Duration },

    #[error("weight {weight} exceeds capacity {capacity} of window '{window}'")]
    WeightExceedsCapacity {
        window: String,
        capacity: f64,
        weight: u32,
    },
}

/// Terminal failures surfaced by the resilient transport.
///
/// Individual failed attempts are never surfaced; each variant describes the
/// single outcome of a logical request.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(
        "transient failure after {attempts} attempt(s) in {elapsed:?} (last status: {}): {message}",
        display_status(*last_status)
    )]
    TransientFailure {
        attempts: u32,
        elapsed: Duration,
        last_status: Option<u16>,
        message: String,
    },

    #[error(
        "stalled: deadline of {budget:?} exceeded after {elapsed:?} and {attempts} attempt(s) (last status: {})",
        display_status(*last_status)
    )]
    StallTimeout {
        budget: Duration,
        elapsed: Duration,
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("client error {status} after {attempts} attempt(s) in {elapsed:?}")]
    ClientError {
        status: u16,
        attempts: u32,
        elapsed: Duration,
        body: String,
    },

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("request cancelled after {elapsed:?} and {attempts} attempt(s)")]
    Cancelled { elapsed: Duration, attempts: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session unavailable: {0}")]
    Session(ConfigError),
}

fn display_status(status: Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl TransportError {
    /// Number of dispatch attempts made before the failure, if known.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::TransientFailure { attempts, .. }
            | Self::StallTimeout { attempts, .. }
            | Self::ClientError { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
            Self::ProtocolError(_) | Self::InvalidRequest(_) | Self::Session(_) => 0,
        }
    }

    /// Last HTTP status observed, if any.
    pub fn last_status(&self) -> Option<u16> {
        match self {
            Self::TransientFailure { last_status, .. } | Self::StallTimeout { last_status, .. } => {
                *last_status
            }
            Self::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_timeout_message_includes_context() {
        let err = TransportError::StallTimeout {
            budget: Duration::from_secs(1),
            elapsed: Duration::from_millis(1200),
            attempts: 2,
            last_status: Some(503),
        };

        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("2 attempt"));
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.last_status(), Some(503));
    }

    #[test]
    fn client_error_reports_status() {
        let err = TransportError::ClientError {
            status: 404,
            attempts: 1,
            elapsed: Duration::from_millis(12),
            body: String::new(),
        };
        assert_eq!(err.last_status(), Some(404));
    }

    #[test]
    fn missing_status_renders_none() {
        let err = TransportError::TransientFailure {
            attempts: 3,
            elapsed: Duration::ZERO,
            last_status: None,
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("last status: none"));
    }
}
