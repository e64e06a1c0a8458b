//! Resilient transport against a scripted dispatcher in virtual time.

use std::sync::Arc;
use std::time::Duration;

use floodgate::application::limiter::{LimiterRegistry, RateLimiter};
use floodgate::application::perf::PerformanceTracker;
use floodgate::application::transport::ResilientTransport;
use floodgate::domain::{PenaltyPolicy, Reply, Request, StatusCategory, WorkerId};
use floodgate::error::{ConfigError, TransportError};
use floodgate::infrastructure::clock::SystemClock;
use floodgate::infrastructure::config::{TransportConfig, WindowConfig};
use floodgate::port::{DispatchError, Dispatcher};
use floodgate::testkit::clock::ManualClock;
use floodgate::testkit::config;
use floodgate::testkit::dispatch::ScriptedDispatcher;
use floodgate::testkit::telemetry::CollectingRecorder;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use tokio::sync::watch;

struct Harness {
    clock: Arc<ManualClock>,
    transport: ResilientTransport<ScriptedDispatcher>,
    recorder: Arc<CollectingRecorder>,
}

fn harness_with(
    replies: Vec<Result<Reply, DispatchError>>,
    windows: &[WindowConfig],
    transport_config: TransportConfig,
) -> Harness {
    let clock = ManualClock::shared();
    let limiter = RateLimiter::new("default", windows, PenaltyPolicy::default(), clock.clone())
        .expect("limiter");
    let registry = Arc::new(LimiterRegistry::single(Arc::new(limiter)));
    let recorder = Arc::new(CollectingRecorder::default());
    let transport = ResilientTransport::new(
        ScriptedDispatcher::new().with_replies(replies),
        registry,
        transport_config,
        clock.clone(),
    )
    .with_recorder(recorder.clone());
    Harness {
        clock,
        transport,
        recorder,
    }
}

fn harness(replies: Vec<Result<Reply, DispatchError>>) -> Harness {
    harness_with(
        replies,
        &[WindowConfig::new("per-second", 100.0, 100.0)],
        config::transport(),
    )
}

/// Dispatcher whose attempts never complete and ignore their timeout.
struct StalledDispatcher;

#[async_trait::async_trait]
impl Dispatcher for StalledDispatcher {
    type Session = ();

    fn open_session(&self, _worker: WorkerId) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn dispatch(
        &self,
        _session: &(),
        _request: &Request,
        _timeout: Duration,
    ) -> Result<Reply, DispatchError> {
        std::future::pending().await
    }
}

fn real_time<D: Dispatcher>(dispatcher: D, transport_config: TransportConfig) -> ResilientTransport<D> {
    let clock = Arc::new(SystemClock);
    let limiter = RateLimiter::new(
        "default",
        &[WindowConfig::new("per-second", 100.0, 100.0)],
        PenaltyPolicy::default(),
        clock.clone(),
    )
    .expect("limiter");
    ResilientTransport::new(
        dispatcher,
        Arc::new(LimiterRegistry::single(Arc::new(limiter))),
        transport_config,
        clock,
    )
}

fn request() -> Request {
    Request::get("https://data-api.polymarket.com/trades")
        .unwrap()
        .with_worker(WorkerId::Task(1))
}

#[tokio::test]
async fn server_errors_on_every_attempt_exhaust_retries() {
    let h = harness(vec![
        Ok(Reply::new(500, "")),
        Ok(Reply::new(500, "")),
        Ok(Reply::new(500, "")),
    ]);

    let err = h.transport.execute(request()).await.unwrap_err();

    assert!(matches!(err, TransportError::TransientFailure { attempts: 3, .. }));
    assert_eq!(h.transport.dispatcher().dispatch_count(), 3);
    assert_eq!(err.last_status(), Some(500));
}

#[tokio::test]
async fn non_429_client_error_is_terminal_after_one_attempt() {
    let h = harness(vec![Ok(Reply::new(400, "bad market id"))]);

    let err = h.transport.execute(request()).await.unwrap_err();

    assert!(matches!(err, TransportError::ClientError { status: 400, attempts: 1, .. }));
    assert_eq!(h.transport.dispatcher().dispatch_count(), 1);
    assert_eq!(h.recorder.samples()[0].category, StatusCategory::Failed);
}

#[tokio::test]
async fn zero_total_timeout_fails_without_network_io() {
    let h = harness(vec![]);

    let err = h
        .transport
        .execute(request().with_timeout(Duration::ZERO))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::StallTimeout { attempts: 0, .. }));
    assert_eq!(h.transport.dispatcher().dispatch_count(), 0);
    assert_eq!(h.transport.dispatcher().sessions_opened(), 0);
}

#[tokio::test]
async fn limiter_wait_counts_against_deadline() {
    let h = harness_with(
        vec![],
        &[WindowConfig::new("per-minute", 1.0, 1.0 / 60.0)],
        config::transport(),
    );

    h.transport.execute(request()).await.unwrap();
    let err = h
        .transport
        .execute(request().with_timeout(Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::StallTimeout { attempts: 0, .. }));
    assert_eq!(h.transport.dispatcher().dispatch_count(), 1);
    assert!(h.clock.elapsed() <= Duration::from_secs(5));
}

#[tokio::test]
async fn rate_limited_reply_penalizes_and_retries() {
    let h = harness(vec![
        Ok(Reply::new(429, "").with_header(RETRY_AFTER, HeaderValue::from_static("1"))),
        Ok(Reply::new(200, "[]")),
    ]);

    let response = h.transport.execute(request()).await.unwrap();

    assert_eq!(response.attempts, 2);
    let snapshot = h.transport.limiters().default_limiter().snapshot();
    assert_eq!(snapshot.rate_limited_total, 1);
    assert!(snapshot.multiplier > 1.0);
    assert_eq!(h.recorder.samples()[0].category, StatusCategory::RetriedSuccess);
}

#[tokio::test]
async fn persistent_429_is_recorded_as_rate_limited() {
    let h = harness(vec![
        Ok(Reply::new(429, "")),
        Ok(Reply::new(429, "")),
        Ok(Reply::new(429, "")),
    ]);
    let tracker = Arc::new(PerformanceTracker::new(&config::perf()));

    let err = h.transport.execute(request()).await.unwrap_err();
    for sample in h.recorder.samples() {
        tracker.record(sample);
    }

    assert_eq!(err.last_status(), Some(429));
    let summary = tracker.flush_summary();
    assert_eq!(summary.overall.rate_limited, 1);
    assert!((summary.overall.err_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn attempt_timeout_is_bounded_by_remaining_budget() {
    let h = harness(vec![
        Err(DispatchError::Timeout("read".into())),
        Ok(Reply::new(200, "")),
    ]);

    h.transport
        .execute(request().with_timeout(Duration::from_secs(3)))
        .await
        .unwrap();

    let timeouts = h.transport.dispatcher().timeouts();
    assert_eq!(timeouts.len(), 2);
    assert!(timeouts.iter().all(|t| *t <= Duration::from_secs(3)));
    assert_eq!(h.transport.dispatcher().sessions_opened(), 2);
}

#[tokio::test]
async fn workers_get_separate_sessions() {
    let h = harness(vec![]);

    for worker in [1, 2, 1, 3, 2] {
        h.transport
            .execute(request().with_worker(WorkerId::Task(worker)))
            .await
            .unwrap();
    }

    assert_eq!(h.transport.sessions().len(), 3);
    assert_eq!(h.transport.dispatcher().sessions_opened(), 3);
}

#[tokio::test]
async fn cancellation_interrupts_limiter_wait() {
    let h = harness_with(
        vec![],
        &[WindowConfig::new("hard", 1.0, 0.0)],
        config::transport(),
    );
    h.transport.execute(request()).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let transport = &h.transport;
    let (result, ()) = tokio::join!(transport.execute_with_cancel(request(), rx), async move {
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
    });

    assert!(matches!(result, Err(TransportError::Cancelled { attempts: 0, .. })));
    assert_eq!(h.transport.dispatcher().dispatch_count(), 1);
}

#[tokio::test]
async fn slow_success_past_the_deadline_is_a_stall() {
    let clock = ManualClock::shared();
    let limiter = RateLimiter::new(
        "default",
        &[WindowConfig::new("per-second", 100.0, 100.0)],
        PenaltyPolicy::default(),
        clock.clone(),
    )
    .expect("limiter");
    let transport = ResilientTransport::new(
        ScriptedDispatcher::new().with_latency(clock.clone(), Duration::from_secs(10)),
        Arc::new(LimiterRegistry::single(Arc::new(limiter))),
        config::transport(),
        clock.clone(),
    );

    let err = transport
        .execute(request().with_timeout(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::StallTimeout { attempts: 1, last_status: Some(200), .. }));
    assert_eq!(transport.dispatcher().timeouts(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn transport_bounds_dispatch_that_ignores_its_timeout() {
    let transport = real_time(StalledDispatcher, config::transport());

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        transport.execute(request().with_timeout(Duration::from_millis(100))),
    )
    .await
    .expect("transport should give up on its own")
    .unwrap_err();

    assert!(matches!(err, TransportError::StallTimeout { attempts: 1, .. }));
}

#[tokio::test]
async fn budget_exhausted_on_last_attempt_is_a_stall() {
    let clock = ManualClock::shared();
    let limiter = RateLimiter::new(
        "default",
        &[WindowConfig::new("per-second", 100.0, 100.0)],
        PenaltyPolicy::default(),
        clock.clone(),
    )
    .expect("limiter");
    let transport = ResilientTransport::new(
        ScriptedDispatcher::new()
            .with_replies(vec![Err(DispatchError::Timeout("read".into()))])
            .with_latency(clock.clone(), Duration::from_secs(2)),
        Arc::new(LimiterRegistry::single(Arc::new(limiter))),
        TransportConfig {
            max_attempts: 1,
            ..config::transport()
        },
        clock.clone(),
    );

    let err = transport
        .execute(request().with_timeout(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::StallTimeout { attempts: 1, .. }), "{err}");
}

#[tokio::test]
async fn cancellation_interrupts_backoff_sleep() {
    let transport_config = TransportConfig {
        backoff_base_ms: 10_000,
        backoff_cap_ms: 10_000,
        ..config::transport()
    };
    let transport = real_time(
        ScriptedDispatcher::new().with_replies(vec![Ok(Reply::new(503, ""))]),
        transport_config,
    );

    let (tx, rx) = watch::channel(false);
    let (result, ()) = tokio::join!(transport.execute_with_cancel(request(), rx), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });

    let err = result.unwrap_err();
    assert!(matches!(err, TransportError::Cancelled { attempts: 1, .. }), "{err}");
    assert_eq!(transport.dispatcher().dispatch_count(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_in_flight_dispatch() {
    let transport = real_time(StalledDispatcher, config::transport());

    let (tx, rx) = watch::channel(false);
    let (result, ()) = tokio::join!(transport.execute_with_cancel(request(), rx), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
    });

    assert!(matches!(result, Err(TransportError::Cancelled { attempts: 1, .. })));
}

#[tokio::test]
async fn huge_retry_after_is_capped_instead_of_panicking() {
    for header in ["1e30", "18000000000000000000"] {
        let h = harness(vec![
            Ok(Reply::new(429, "").with_header(RETRY_AFTER, HeaderValue::from_static(header))),
            Ok(Reply::new(200, "")),
        ]);

        let err = h
            .transport
            .execute(request().with_timeout(Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::StallTimeout { attempts: 1, .. }), "{err}");
        let snapshot = h.transport.limiters().default_limiter().snapshot();
        assert!(snapshot.pause_remaining <= PenaltyPolicy::default().max_pause);
    }
}
