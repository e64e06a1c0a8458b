//! Exponential backoff with jitter between transport attempts.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::TransportConfig;

/// Delay schedule for retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter_ratio: f64) -> Self {
        Self {
            base,
            cap: cap.max(base),
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_cap_ms),
            config.jitter_ratio,
        )
    }

    /// Delay before retry number `retry` (1-based) without jitter.
    ///
    /// `min(cap, base * 2^(retry - 1))`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }

    /// Delay before retry number `retry` with up to `jitter_ratio` extra.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_ratio == 0.0 || base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        base + base.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_and_cap() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3), 0.0);

        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_millis(1000));
        assert_eq!(backoff.delay(3), Duration::from_millis(2000));
        assert_eq!(backoff.delay(4), Duration::from_secs(3));
        assert_eq!(backoff.delay(40), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 0.2);
        for _ in 0..200 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(120));
        }
    }

    #[test]
    fn test_zero_base_has_no_jitter() {
        let backoff = Backoff::new(Duration::ZERO, Duration::ZERO, 0.5);
        assert_eq!(backoff.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let backoff = Backoff::from_config(&TransportConfig::default());
        assert_eq!(backoff.base_delay(1), Duration::from_millis(500));
        assert_eq!(backoff.base_delay(10), Duration::from_secs(30));
    }
}
