//! Owned periodic background tasks.
//!
//! A [`PeriodicTask`] runs a callback on a fixed interval until stopped. It
//! is an explicit object with a start/stop lifecycle rather than process-wide
//! state, so several instances (e.g. one heartbeat per limiter in tests) can
//! run side by side.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// A named callback driven by a tokio interval.
pub struct PeriodicTask {
    name: &'static str,
    interval: Duration,
    wake: Arc<Notify>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self::with_waker(name, interval, Arc::new(Notify::new()))
    }

    /// Task that also ticks whenever `wake` is notified.
    pub fn with_waker(name: &'static str, interval: Duration, wake: Arc<Notify>) -> Self {
        Self {
            name,
            interval,
            wake,
            shutdown: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle that triggers an out-of-schedule tick.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the task on the current tokio runtime.
    ///
    /// The first tick fires one interval after start. Starting an already
    /// running task is a no-op.
    pub fn start<F>(&mut self, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_running() {
            warn!(task = self.name, "Periodic task already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let wake = Arc::clone(&self.wake);
        let period = self.interval.max(Duration::from_millis(1));
        let name = self.name;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

            loop {
                tokio::select! {
                    _ = interval.tick() => tick(),
                    () = wake.notified() => tick(),
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!(task = name, "Periodic task stopped");
        });

        self.shutdown = Some(shutdown_tx);
        self.handle = Some(handle);
    }

    /// Signal the task to exit and wait for it.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(task = self.name, error = %err, "Periodic task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
