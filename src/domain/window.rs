//! Token bucket window.
//!
//! A [`TokenWindow`] is one independently enforced bucket with its own
//! capacity and refill rate. Time is always passed in by the caller so the
//! window itself stays deterministic.

use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// A single token bucket.
///
/// Tokens are fractional so refill is continuous. The token count is clamped
/// to `[0, capacity]` on every mutation.
#[derive(Debug, Clone)]
pub struct TokenWindow {
    name: String,
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenWindow {
    /// Create a full window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWindow`] when the capacity is not a
    /// positive finite number or the refill rate is negative or non-finite.
    pub fn new(
        name: impl Into<String>,
        capacity: f64,
        refill_per_sec: f64,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::InvalidWindow {
                window: name,
                reason: "name must not be empty".into(),
            });
        }
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(ConfigError::InvalidWindow {
                window: name,
                reason: format!("capacity must be > 0, got {capacity}"),
            });
        }
        if !refill_per_sec.is_finite() || refill_per_sec < 0.0 {
            return Err(ConfigError::InvalidWindow {
                window: name,
                reason: format!("refill rate must be >= 0, got {refill_per_sec}"),
            });
        }

        Ok(Self {
            name,
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: now,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Refill rate after dividing by the penalty multiplier.
    pub fn effective_rate(&self, multiplier: f64) -> f64 {
        self.refill_per_sec / multiplier.max(1.0)
    }

    /// Add tokens for the time elapsed since the last refill.
    pub fn refill(&mut self, now: Instant, multiplier: f64) {
        self.tokens = self.projected(now, multiplier);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Token count a refill at `now` would produce, without mutating.
    pub fn projected(&self, now: Instant, multiplier: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let added = elapsed * self.effective_rate(multiplier);
        (self.tokens + added).clamp(0.0, self.capacity)
    }

    pub fn has(&self, weight: f64) -> bool {
        self.tokens >= weight
    }

    /// Remove `weight` tokens. Callers check [`Self::has`] first; the count is
    /// still clamped at zero.
    pub fn debit(&mut self, weight: f64) {
        self.tokens = (self.tokens - weight).clamp(0.0, self.capacity);
    }

    /// Time until `weight` tokens are available at the current penalty.
    ///
    /// Returns `None` when the window can never refill (zero rate) or the wait
    /// is too long to represent.
    pub fn wait_for(&self, weight: f64, multiplier: f64) -> Option<Duration> {
        let needed = weight - self.tokens;
        if needed <= 0.0 {
            return Some(Duration::ZERO);
        }
        let rate = self.effective_rate(multiplier);
        if rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(needed / rate).ok()
    }
}
