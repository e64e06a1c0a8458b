//! Request descriptors and responses exchanged with the transport.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread::ThreadId;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::TransportError;

/// Identity of the worker a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    /// An OS thread, e.g. a tokio runtime worker.
    Thread(ThreadId),
    /// A caller-assigned id, e.g. a polling task index.
    Task(u64),
}

impl WorkerId {
    /// The worker running the current code.
    pub fn current() -> Self {
        Self::Thread(std::thread::current().id())
    }

    /// Short numeric label for logs.
    pub fn label(&self) -> u64 {
        match self {
            Self::Task(id) => *id,
            Self::Thread(id) => {
                let mut hasher = DefaultHasher::new();
                id.hash(&mut hasher);
                hasher.finish() % 10_000
            }
        }
    }
}

/// Everything the transport needs to run one logical request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Label used for telemetry.
    pub endpoint: String,
    /// Limiter bucket; falls back to `endpoint` when unset.
    pub bucket: Option<String>,
    /// Tokens debited from every window of the bucket.
    pub weight: u32,
    /// Deadline budget across limiter wait and all attempts.
    pub total_timeout: Option<Duration>,
    /// Session affinity; defaults to [`WorkerId::current`].
    pub worker: Option<WorkerId>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        let endpoint = url.path().to_string();
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            endpoint,
            bucket: None,
            weight: 1,
            total_timeout: None,
            worker: None,
        }
    }

    /// Build a `GET` for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` cannot be parsed.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    #[must_use]
    pub fn with_query<K, V>(mut self, pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        {
            let mut query = self.url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, total_timeout: Duration) -> Self {
        self.total_timeout = Some(total_timeout);
        self
    }

    #[must_use]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Limiter bucket this request is admitted through.
    pub fn bucket(&self) -> &str {
        self.bucket.as_deref().unwrap_or(&self.endpoint)
    }
}

/// Result of a single HTTP attempt.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Whether the status is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, 408 | 429) || (500..600).contains(&self.status)
    }

    /// `Retry-After` in seconds, when present and numeric.
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.headers.get(RETRY_AFTER)?.to_str().ok()?;
        let secs: f64 = raw.trim().parse().ok()?;
        if secs.is_nan() || secs < 0.0 {
            return None;
        }
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    pub fn content_length(&self) -> usize {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len())
    }
}

/// Terminal response of a logical request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Dispatch attempts used, including the successful one.
    pub attempts: u32,
    /// Wall-clock time across limiter wait and all attempts.
    pub elapsed: Duration,
}

impl Response {
    pub(crate) fn from_reply(reply: Reply, attempts: u32, elapsed: Duration) -> Self {
        Self {
            status: reply.status,
            headers: reply.headers,
            body: reply.body,
            attempts,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolError`] when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            TransportError::ProtocolError(format!("status {} body did not decode: {e}", self.status))
        })
    }

    /// Decode the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolError`] on invalid UTF-8.
    pub fn text(&self) -> Result<&str, TransportError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| TransportError::ProtocolError(format!("body is not UTF-8: {e}")))
    }
}
