//! Resilient HTTP transport.
//!
//! [`ResilientTransport::execute`] runs one logical request: admission
//! through the request's limiter bucket, dispatch over the worker's session,
//! classification of the reply, and bounded retries with backoff. Limiter
//! waits, attempts and backoff sleeps all share a single deadline. Callers
//! only ever see the terminal outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::limiter::LimiterRegistry;
use crate::domain::{OutcomeSample, Reply, Request, Response, StatusCategory, WorkerId};
use crate::error::{LimiterError, TransportError};
use crate::infrastructure::config::TransportConfig;
use crate::port::{Clock, DispatchError, Dispatcher, OutcomeRecorder};

use super::backoff::Backoff;
use super::session::SessionPool;

/// Longest client error body kept on [`TransportError::ClientError`].
const MAX_ERROR_BODY: usize = 512;

/// Upper bound on any request budget, keeping deadline arithmetic in range.
const MAX_BUDGET: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Rate-limited, retrying HTTP executor.
pub struct ResilientTransport<D: Dispatcher> {
    dispatcher: D,
    limiters: Arc<LimiterRegistry>,
    sessions: SessionPool<D::Session>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    config: TransportConfig,
    recorder: Option<Arc<dyn OutcomeRecorder>>,
}

impl<D: Dispatcher> ResilientTransport<D> {
    pub fn new(
        dispatcher: D,
        limiters: Arc<LimiterRegistry>,
        config: TransportConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            limiters,
            sessions: SessionPool::new(config.session_max_uses),
            clock,
            backoff: Backoff::from_config(&config),
            config,
            recorder: None,
        }
    }

    /// Record an [`OutcomeSample`] for every terminal outcome.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn limiters(&self) -> &Arc<LimiterRegistry> {
        &self.limiters
    }

    pub fn sessions(&self) -> &SessionPool<D::Session> {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Run `request` to a terminal outcome.
    ///
    /// # Errors
    ///
    /// - [`TransportError::StallTimeout`] when the deadline passes, including
    ///   time spent waiting for rate limit tokens
    /// - [`TransportError::TransientFailure`] when every attempt failed with a
    ///   retryable error
    /// - [`TransportError::ClientError`] on a non-429 4xx
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.execute_inner(&request, None).await
    }

    /// Like [`Self::execute`], abandoned with [`TransportError::Cancelled`]
    /// as soon as `cancel` holds `true`.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Response, TransportError> {
        self.execute_inner(&request, Some(&mut cancel)).await
    }

    async fn execute_inner(
        &self,
        request: &Request,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<Response, TransportError> {
        let start = self.clock.now();
        let result = self.run(request, start, cancel).await;
        self.record(request, start, &result);
        result
    }

    async fn run(
        &self,
        request: &Request,
        start: Instant,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<Response, TransportError> {
        let budget = request
            .total_timeout
            .unwrap_or_else(|| self.config.total_timeout())
            .min(MAX_BUDGET);
        let deadline = start + budget;
        let mut attempts = 0u32;
        let mut last_status: Option<u16> = None;

        if budget.is_zero() {
            return Err(self.stall(budget, start, attempts, last_status));
        }

        let worker = request.worker.unwrap_or_else(WorkerId::current);
        let limiter = self.limiters.get(request.bucket());

        loop {
            limiter
                .acquire_with(request.weight, Some(deadline), cancel.as_deref_mut())
                .await
                .map_err(|err| match err {
                    LimiterError::DeadlineExceeded { .. } => {
                        self.stall(budget, start, attempts, last_status)
                    }
                    LimiterError::Cancelled { .. } => self.cancelled(start, attempts),
                    LimiterError::WeightExceedsCapacity { .. } => {
                        TransportError::InvalidRequest(err.to_string())
                    }
                })?;

            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return Err(self.stall(budget, start, attempts, last_status));
            }

            let session = self
                .sessions
                .checkout(worker, || self.dispatcher.open_session(worker))
                .map_err(TransportError::Session)?;
            let attempt_timeout = self.config.attempt_timeout().min(remaining);
            attempts += 1;

            let sent_at = self.clock.now();
            let dispatch = self.attempt(session.inner(), request, attempt_timeout);
            let outcome = match cancel.as_deref_mut() {
                Some(rx) => tokio::select! {
                    outcome = dispatch => outcome,
                    () = cancelled(rx) => return Err(self.cancelled(start, attempts)),
                },
                None => dispatch.await,
            };
            let overran = self.clock.now() >= deadline;

            let failure = match outcome {
                Ok(reply) => {
                    self.log_response(request, &reply, sent_at, attempts);
                    last_status = Some(reply.status);

                    if reply.is_rate_limited() {
                        limiter.report_rate_limited(reply.retry_after());
                    }
                    if overran {
                        return Err(self.overrun(request, budget, start, attempts, last_status));
                    }
                    if !reply.is_retryable() {
                        return self.terminal(reply, start, attempts);
                    }
                    format!("upstream returned {}", reply.status)
                }
                Err(err) => {
                    if matches!(err, DispatchError::Timeout(_)) {
                        self.sessions.reset(worker);
                    }
                    if !err.is_retryable() {
                        return Err(TransportError::InvalidRequest(err.to_string()));
                    }
                    err.to_string()
                }
            };

            if overran {
                return Err(self.overrun(request, budget, start, attempts, last_status));
            }
            if attempts >= self.config.max_attempts {
                warn!(
                    endpoint = %request.endpoint,
                    attempts,
                    last_status,
                    error = %failure,
                    "HTTP request failed, retries exhausted"
                );
                return Err(TransportError::TransientFailure {
                    attempts,
                    elapsed: self.elapsed(start),
                    last_status,
                    message: failure,
                });
            }

            let delay = self.backoff.delay(attempts);
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if delay >= remaining {
                warn!(
                    endpoint = %request.endpoint,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    remaining_ms = remaining.as_millis() as u64,
                    "Retry would overrun the deadline"
                );
                return Err(self.stall(budget, start, attempts, last_status));
            }

            debug!(
                endpoint = %request.endpoint,
                attempt = attempts,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "HTTP request failed, retrying"
            );

            match cancel.as_deref_mut() {
                Some(rx) => tokio::select! {
                    () = self.clock.sleep(delay) => {}
                    () = cancelled(rx) => return Err(self.cancelled(start, attempts)),
                },
                None => self.clock.sleep(delay).await,
            }
        }
    }

    /// One dispatch, abandoned once `timeout` elapses on the transport clock
    /// even if the dispatcher ignores its own timeout.
    async fn attempt(
        &self,
        session: &D::Session,
        request: &Request,
        timeout: Duration,
    ) -> Result<Reply, DispatchError> {
        tokio::select! {
            biased;
            outcome = self.dispatcher.dispatch(session, request, timeout) => outcome,
            () = self.clock.sleep(timeout) => {
                Err(DispatchError::Timeout(format!("no reply within {timeout:?}")))
            }
        }
    }

    fn overrun(
        &self,
        request: &Request,
        budget: Duration,
        start: Instant,
        attempts: u32,
        last_status: Option<u16>,
    ) -> TransportError {
        warn!(
            endpoint = %request.endpoint,
            attempts,
            last_status,
            budget_ms = budget.as_millis() as u64,
            "HTTP request overran its deadline"
        );
        self.stall(budget, start, attempts, last_status)
    }

    fn terminal(
        &self,
        reply: Reply,
        start: Instant,
        attempts: u32,
    ) -> Result<Response, TransportError> {
        let elapsed = self.elapsed(start);
        if (400..500).contains(&reply.status) {
            let body: String = String::from_utf8_lossy(&reply.body)
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(TransportError::ClientError {
                status: reply.status,
                attempts,
                elapsed,
                body,
            });
        }
        Ok(Response::from_reply(reply, attempts, elapsed))
    }

    fn log_response(&self, request: &Request, reply: &Reply, sent_at: Instant, attempt: u32) {
        if !self.config.response_logs {
            return;
        }
        info!(
            method = %request.method,
            url = %request.url,
            status = reply.status,
            duration_ms = self.elapsed(sent_at).as_millis() as u64,
            content_length = reply.content_length(),
            attempt,
            "HTTP response"
        );
    }

    fn record(&self, request: &Request, start: Instant, result: &Result<Response, TransportError>) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let (succeeded, attempts, status) = match result {
            Ok(response) => (true, response.attempts, Some(response.status)),
            Err(err) => (false, err.attempts(), err.last_status()),
        };
        recorder.record(OutcomeSample::new(
            request.endpoint.clone(),
            self.elapsed(start),
            StatusCategory::classify(succeeded, attempts, status),
            attempts,
            status,
        ));
    }

    fn elapsed(&self, since: Instant) -> Duration {
        self.clock.now().saturating_duration_since(since)
    }

    fn stall(
        &self,
        budget: Duration,
        start: Instant,
        attempts: u32,
        last_status: Option<u16>,
    ) -> TransportError {
        TransportError::StallTimeout {
            budget,
            elapsed: self.elapsed(start),
            attempts,
            last_status,
        }
    }

    fn cancelled(&self, start: Instant, attempts: u32) -> TransportError {
        TransportError::Cancelled {
            elapsed: self.elapsed(start),
            attempts,
        }
    }
}

/// Resolves once the signal holds `true`; never if the sender is dropped first.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
