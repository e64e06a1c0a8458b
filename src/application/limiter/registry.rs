//! Named limiter buckets.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::PenaltyPolicy;
use crate::error::ConfigError;
use crate::infrastructure::config::{LimitsConfig, DEFAULT_BUCKET};
use crate::port::Clock;

use super::{LimiterSnapshot, RateLimiter};

/// Maps bucket names to shared limiters, with a fallback for unknown names.
#[derive(Debug, Clone)]
pub struct LimiterRegistry {
    default: Arc<RateLimiter>,
    buckets: BTreeMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// Registry with only a default limiter.
    pub fn single(default: Arc<RateLimiter>) -> Self {
        Self {
            default,
            buckets: BTreeMap::new(),
        }
    }

    /// Build every configured bucket with the safety margin applied.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any bucket has an invalid window.
    pub fn from_config(config: &LimitsConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let policy = PenaltyPolicy::from(&config.penalty);

        let default = RateLimiter::new(
            DEFAULT_BUCKET,
            &config.effective_windows(&config.default),
            policy.clone(),
            Arc::clone(&clock),
        )?;

        let mut registry = Self::single(Arc::new(default));
        for (name, bucket) in &config.buckets {
            let limiter = RateLimiter::new(
                name.clone(),
                &config.effective_windows(bucket),
                policy.clone(),
                Arc::clone(&clock),
            )?;
            registry = registry.with_bucket(name.clone(), Arc::new(limiter));
        }
        Ok(registry)
    }

    #[must_use]
    pub fn with_bucket(mut self, name: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        self.buckets.insert(name.into(), limiter);
        self
    }

    /// Limiter for `bucket`, or the default when the bucket is unknown.
    pub fn get(&self, bucket: &str) -> &Arc<RateLimiter> {
        self.buckets.get(bucket).unwrap_or(&self.default)
    }

    pub fn default_limiter(&self) -> &Arc<RateLimiter> {
        &self.default
    }

    /// Default limiter first, then named buckets in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RateLimiter>> {
        std::iter::once(&self.default).chain(self.buckets.values())
    }

    pub fn snapshots(&self) -> Vec<LimiterSnapshot> {
        self.iter().map(|l| l.snapshot()).collect()
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.snapshots().iter().map(|s| s.rate_limited_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::clock::ManualClock;

    #[test]
    fn test_from_default_config() {
        let clock = Arc::new(ManualClock::new());
        let registry = LimiterRegistry::from_config(&LimitsConfig::default(), clock).unwrap();

        let names: Vec<_> = registry.iter().map(|l| l.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "default",
                "clob_book",
                "clob_prices_history",
                "data_activity",
                "data_closed_positions",
                "data_holders",
                "data_positions",
                "gamma_markets",
            ]
        );

        let book = registry.get("clob_book").snapshot();
        assert!((book.windows[0].capacity - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_bucket_falls_back() {
        let clock = Arc::new(ManualClock::new());
        let registry = LimiterRegistry::from_config(&LimitsConfig::default(), clock).unwrap();
        assert_eq!(registry.get("data_trades").name(), "default");
    }

    #[test]
    fn test_counts_rate_limits_across_buckets() {
        let clock = Arc::new(ManualClock::new());
        let registry = LimiterRegistry::from_config(&LimitsConfig::default(), clock).unwrap();

        registry.get("clob_book").report_rate_limited(None);
        registry.get("gamma_markets").report_rate_limited(None);
        assert_eq!(registry.rate_limited_total(), 2);
    }
}
