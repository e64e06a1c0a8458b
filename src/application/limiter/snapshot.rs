//! Read-only limiter views for logging and tests.

use std::fmt;
use std::time::Duration;

/// Point-in-time view of one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub name: String,
    pub tokens: f64,
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub effective_rate: f64,
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSnapshot {
    pub name: String,
    pub windows: Vec<WindowSnapshot>,
    pub multiplier: f64,
    pub pause_remaining: Duration,
    pub rate_limited_total: u64,
}

impl fmt::Display for LimiterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.name)?;
        for (i, w) in self.windows.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}:{}/{}", w.name, w.tokens.floor(), w.capacity)?;
        }
        write!(f, "]")?;
        if self.multiplier > 1.0 {
            write!(f, " x{:.1}", self.multiplier)?;
        }
        if !self.pause_remaining.is_zero() {
            write!(f, " paused {}ms", self.pause_remaining.as_millis())?;
        }
        Ok(())
    }
}
