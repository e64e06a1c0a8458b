//! `reqwest` implementation of the [`Dispatcher`] port.
//!
//! Each session is its own [`reqwest::Client`] with a private connection
//! pool, so workers never share keep-alive connections.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use crate::domain::{Reply, Request, WorkerId};
use crate::error::ConfigError;
use crate::infrastructure::config::TransportConfig;
use crate::port::{DispatchError, Dispatcher};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Sends attempts over per-worker `reqwest` clients.
#[derive(Debug, Clone)]
pub struct ReqwestDispatcher {
    connect_timeout: Duration,
    pool_size: usize,
    user_agent: String,
}

impl ReqwestDispatcher {
    #[must_use]
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            pool_size: config.pool_size(),
            user_agent: USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

#[async_trait]
impl Dispatcher for ReqwestDispatcher {
    type Session = HttpClient;

    fn open_session(&self, worker: WorkerId) -> Result<HttpClient, ConfigError> {
        debug!(
            worker = worker.label(),
            pool_size = self.pool_size,
            "Building HTTP client"
        );
        HttpClient::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_size)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(ConfigError::HttpClient)
    }

    async fn dispatch(
        &self,
        session: &HttpClient,
        request: &Request,
        timeout: Duration,
    ) -> Result<Reply, DispatchError> {
        let mut builder = session
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                DispatchError::Timeout(err.to_string())
            } else {
                DispatchError::Body(err.to_string())
            }
        })?;

        Ok(Reply {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> DispatchError {
    let message = err.to_string();
    if err.is_timeout() {
        DispatchError::Timeout(message)
    } else if err.is_builder() {
        DispatchError::Request(message)
    } else if err.is_body() || err.is_decode() {
        DispatchError::Body(message)
    } else {
        DispatchError::Connect(message)
    }
}
