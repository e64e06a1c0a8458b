//! Multi-window token bucket rate limiter with 429 penalties.
//!
//! A [`RateLimiter`] owns a set of [`TokenWindow`]s and a [`PenaltyState`]
//! behind a single mutex, so a debit across all windows is all-or-nothing
//! under concurrent callers. Waiting happens outside the lock through the
//! injected [`Clock`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use floodgate::application::limiter::RateLimiter;
//! use floodgate::domain::PenaltyPolicy;
//! use floodgate::infrastructure::clock::SystemClock;
//! use floodgate::infrastructure::config::WindowConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::new(
//!     "gamma_markets",
//!     &[WindowConfig::per("per-10s", 100.0, 10.0)],
//!     PenaltyPolicy::default(),
//!     Arc::new(SystemClock),
//! )?;
//! limiter.acquire(1).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{PenaltyPolicy, PenaltyState, TokenWindow};
use crate::error::{ConfigError, LimiterError};
use crate::infrastructure::config::WindowConfig;
use crate::port::Clock;

use super::snapshot::{LimiterSnapshot, WindowSnapshot};

/// Shortest sleep between admission checks.
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Re-check period when no window can ever refill (zero rate).
const IDLE_RECHECK: Duration = Duration::from_secs(1);

/// Slack for floating point refill arithmetic.
const TOKEN_EPSILON: f64 = 1e-9;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Tokens were debited from every window.
    Admitted,
    /// Not enough tokens; retry after the given time, or never if `None`.
    Wait(Option<Duration>),
}

struct LimiterState {
    windows: Vec<TokenWindow>,
    penalty: PenaltyState,
}

/// Token bucket limiter enforcing every configured window at once.
pub struct RateLimiter {
    name: String,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Build a limiter whose windows all start full.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWindow`] when no windows are given, a
    /// name repeats, or a window has a zero capacity or invalid rate.
    pub fn new(
        name: impl Into<String>,
        windows: &[WindowConfig],
        policy: PenaltyPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if windows.is_empty() {
            return Err(ConfigError::InvalidWindow {
                window: name,
                reason: "limiter needs at least one window".into(),
            });
        }

        let now = clock.now();
        let mut seen = HashSet::new();
        let mut built = Vec::with_capacity(windows.len());
        for w in windows {
            if !seen.insert(w.name.as_str()) {
                return Err(ConfigError::InvalidWindow {
                    window: format!("{name}.{}", w.name),
                    reason: "duplicate window name".into(),
                });
            }
            built.push(TokenWindow::new(w.name.clone(), w.capacity, w.refill_per_sec, now)?);
        }

        Ok(Self {
            name,
            clock,
            state: Mutex::new(LimiterState {
                windows: built,
                penalty: PenaltyState::new(policy),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until `weight` tokens are available in every window, then debit.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::WeightExceedsCapacity`] when `weight` can never
    /// fit in some window.
    pub async fn acquire(&self, weight: u32) -> Result<(), LimiterError> {
        self.acquire_with(weight, None, None).await
    }

    /// Like [`Self::acquire`], bounded by a deadline and a cancellation signal.
    ///
    /// The signal cancels when it holds `true`. A dropped sender is treated as
    /// "never cancelled".
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::DeadlineExceeded`] once `deadline` passes
    /// without admission, or [`LimiterError::Cancelled`] when cancelled.
    pub async fn acquire_with(
        &self,
        weight: u32,
        deadline: Option<Instant>,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<(), LimiterError> {
        self.check_weight(weight)?;
        let start = self.clock.now();

        loop {
            if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                return Err(LimiterError::Cancelled {
                    waited: self.clock.now().saturating_duration_since(start),
                });
            }

            let now = self.clock.now();
            let wait = match self.poll(weight, now) {
                Admission::Admitted => return Ok(()),
                Admission::Wait(wait) => wait,
            };

            let mut sleep_for = wait.unwrap_or(IDLE_RECHECK).max(MIN_WAIT);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(now);
                if remaining.is_zero() {
                    return Err(LimiterError::DeadlineExceeded {
                        waited: now.saturating_duration_since(start),
                        weight,
                    });
                }
                sleep_for = sleep_for.min(remaining);
            }

            debug!(
                limiter = %self.name,
                weight,
                wait_ms = sleep_for.as_millis() as u64,
                "Waiting for rate limit tokens"
            );

            let mut sender_gone = false;
            match cancel.as_deref_mut() {
                Some(rx) => {
                    tokio::select! {
                        () = self.clock.sleep(sleep_for) => {}
                        changed = rx.changed() => sender_gone = changed.is_err(),
                    }
                }
                None => self.clock.sleep(sleep_for).await,
            }
            if sender_gone {
                cancel = None;
            }
        }
    }

    /// Single non-blocking admission check at the clock's current time.
    pub fn try_acquire(&self, weight: u32) -> Admission {
        if self.check_weight(weight).is_err() {
            return Admission::Wait(None);
        }
        self.poll(weight, self.clock.now())
    }

    fn check_weight(&self, weight: u32) -> Result<(), LimiterError> {
        let state = self.state.lock();
        match state
            .windows
            .iter()
            .find(|w| f64::from(weight) > w.capacity() + TOKEN_EPSILON)
        {
            Some(w) => Err(LimiterError::WeightExceedsCapacity {
                window: format!("{}.{}", self.name, w.name()),
                capacity: w.capacity(),
                weight,
            }),
            None => Ok(()),
        }
    }

    fn poll(&self, weight: u32, now: Instant) -> Admission {
        let weight = f64::from(weight);
        let mut state = self.state.lock();
        let LimiterState { windows, penalty } = &mut *state;

        penalty.decay(now);
        let multiplier = penalty.multiplier();
        for window in windows.iter_mut() {
            window.refill(now, multiplier);
        }

        let pause = penalty.pause_remaining(now);
        if !pause.is_zero() {
            return Admission::Wait(Some(pause));
        }

        if windows.iter().all(|w| w.has(weight - TOKEN_EPSILON)) {
            for window in windows.iter_mut() {
                window.debit(weight);
            }
            return Admission::Admitted;
        }

        let mut shortest: Option<Duration> = None;
        for window in windows.iter().filter(|w| !w.has(weight - TOKEN_EPSILON)) {
            if let Some(wait) = window.wait_for(weight, multiplier) {
                shortest = Some(shortest.map_or(wait, |s| s.min(wait)));
            }
        }
        Admission::Wait(shortest)
    }

    /// Record an upstream 429. Throughput drops until the penalty decays.
    pub fn report_rate_limited(&self, retry_after: Option<Duration>) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.penalty.record(now, retry_after);
        warn!(
            limiter = %self.name,
            multiplier = state.penalty.multiplier(),
            pause_ms = state.penalty.pause_remaining(now).as_millis() as u64,
            total = state.penalty.rate_limited_total(),
            "Upstream rate limited, applying penalty"
        );
    }

    /// Current penalty multiplier after decay up to now, without mutating.
    pub fn penalty_multiplier(&self) -> f64 {
        let now = self.clock.now();
        self.state.lock().penalty.projected_multiplier(now)
    }

    /// Read-only view of every window and the penalty at the current time.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let now = self.clock.now();
        let state = self.state.lock();
        let multiplier = state.penalty.projected_multiplier(now);

        LimiterSnapshot {
            name: self.name.clone(),
            windows: state
                .windows
                .iter()
                .map(|w| WindowSnapshot {
                    name: w.name().to_string(),
                    tokens: w.projected(now, multiplier),
                    capacity: w.capacity(),
                    refill_per_sec: w.refill_per_sec(),
                    effective_rate: w.effective_rate(multiplier),
                })
                .collect(),
            multiplier,
            pause_remaining: state.penalty.pause_remaining(now),
            rate_limited_total: state.penalty.rate_limited_total(),
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
