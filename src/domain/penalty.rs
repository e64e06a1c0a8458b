//! Throttling state applied after upstream rate-limit rejections.

use std::time::{Duration, Instant};

/// How a limiter reacts to HTTP 429 responses.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyPolicy {
    /// Factor the multiplier grows by per 429, and shrinks by per decay step.
    pub growth_factor: f64,
    /// Upper bound on the multiplier.
    pub max_multiplier: f64,
    /// Quiet period after which the multiplier relaxes one step.
    pub decay_interval: Duration,
    /// Pause per unit of multiplier when no `Retry-After` is given.
    pub pause_base: Duration,
    /// Ceiling on any single pause, including upstream `Retry-After`.
    pub max_pause: Duration,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            growth_factor: 2.0,
            max_multiplier: 8.0,
            decay_interval: Duration::from_secs(60),
            pause_base: Duration::from_secs(5),
            max_pause: Duration::from_secs(300),
        }
    }
}

/// Mutable penalty state owned by a limiter.
///
/// The multiplier only grows in [`Self::record`] and only shrinks in
/// [`Self::decay`].
#[derive(Debug, Clone)]
pub struct PenaltyState {
    policy: PenaltyPolicy,
    multiplier: f64,
    last_penalty: Option<Instant>,
    decay_marker: Option<Instant>,
    pause_until: Option<Instant>,
    rate_limited_total: u64,
}

impl PenaltyState {
    pub fn new(policy: PenaltyPolicy) -> Self {
        Self {
            policy,
            multiplier: 1.0,
            last_penalty: None,
            decay_marker: None,
            pause_until: None,
            rate_limited_total: 0,
        }
    }

    pub fn policy(&self) -> &PenaltyPolicy {
        &self.policy
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn last_penalty(&self) -> Option<Instant> {
        self.last_penalty
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.rate_limited_total
    }

    /// Register a 429 observed at `now`.
    pub fn record(&mut self, now: Instant, retry_after: Option<Duration>) {
        self.rate_limited_total += 1;
        self.multiplier =
            (self.multiplier * self.policy.growth_factor).min(self.policy.max_multiplier.max(1.0));
        self.last_penalty = Some(now);
        self.decay_marker = Some(now);

        let pause = retry_after
            .unwrap_or_else(|| self.default_pause())
            .min(self.policy.max_pause);
        if pause.is_zero() {
            return;
        }
        if let Some(until) = now.checked_add(pause) {
            self.pause_until = Some(self.pause_until.map_or(until, |prev| prev.max(until)));
        }
    }

    fn default_pause(&self) -> Duration {
        let secs = self.policy.pause_base.as_secs_f64() * self.multiplier;
        Duration::try_from_secs_f64(secs).unwrap_or(self.policy.max_pause)
    }

    /// Relax the multiplier one step per full quiet interval since the last
    /// penalty or decay step.
    pub fn decay(&mut self, now: Instant) {
        let Some(mut marker) = self.decay_marker else {
            return;
        };
        let interval = self.policy.decay_interval;
        if interval.is_zero() {
            self.multiplier = 1.0;
            self.decay_marker = None;
            return;
        }

        while self.multiplier > 1.0 && now.saturating_duration_since(marker) >= interval {
            self.multiplier = (self.multiplier / self.policy.growth_factor.max(1.0)).max(1.0);
            marker += interval;
        }

        self.decay_marker = if self.multiplier > 1.0 {
            Some(marker)
        } else {
            None
        };
    }

    /// Multiplier a decay at `now` would produce, without mutating.
    pub fn projected_multiplier(&self, now: Instant) -> f64 {
        let mut copy = self.clone();
        copy.decay(now);
        copy.multiplier
    }

    /// Remaining enforced pause at `now`.
    pub fn pause_remaining(&self, now: Instant) -> Duration {
        self.pause_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }
}

impl Default for PenaltyState {
    fn default() -> Self {
        Self::new(PenaltyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_policy() -> PenaltyPolicy {
        PenaltyPolicy {
            pause_base: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_multiplier_doubles_and_caps() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();

        for expected in [2.0, 4.0, 8.0, 8.0] {
            state.record(now, None);
            assert!((state.multiplier() - expected).abs() < f64::EPSILON);
        }
        assert_eq!(state.rate_limited_total(), 4);
    }

    #[test]
    fn test_no_decay_before_interval() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();
        state.record(now, None);

        state.decay(now + Duration::from_secs(59));
        assert!((state.multiplier() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decay_halves_per_interval() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();
        for _ in 0..3 {
            state.record(now, None);
        }

        state.decay(now + Duration::from_secs(60));
        assert!((state.multiplier() - 4.0).abs() < f64::EPSILON);

        state.decay(now + Duration::from_secs(150));
        assert!((state.multiplier() - 2.0).abs() < f64::EPSILON);

        state.decay(now + Duration::from_secs(600));
        assert!((state.multiplier() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_penalty_restarts_decay_clock() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();
        state.record(now, None);
        state.record(now + Duration::from_secs(50), None);

        state.decay(now + Duration::from_secs(70));
        assert!((state.multiplier() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_after_sets_pause() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();
        state.record(now, Some(Duration::from_secs(3)));

        assert_eq!(state.pause_remaining(now), Duration::from_secs(3));
        assert_eq!(
            state.pause_remaining(now + Duration::from_secs(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_default_pause_scales_with_multiplier() {
        let mut state = PenaltyState::default();
        let now = Instant::now();
        state.record(now, None);

        assert_eq!(state.pause_remaining(now), Duration::from_secs(10));
    }

    #[test]
    fn test_pause_is_capped() {
        let mut state = PenaltyState::new(PenaltyPolicy {
            max_pause: Duration::from_secs(30),
            ..Default::default()
        });
        let now = Instant::now();

        state.record(now, Some(Duration::from_secs(18_000_000_000_000_000_000)));
        assert_eq!(state.pause_remaining(now), Duration::from_secs(30));

        state.record(now, Some(Duration::MAX));
        assert_eq!(state.pause_remaining(now), Duration::from_secs(30));
    }

    #[test]
    fn test_default_pause_capped_for_huge_multiplier() {
        let mut state = PenaltyState::new(PenaltyPolicy {
            growth_factor: 1e300,
            max_multiplier: f64::MAX,
            max_pause: Duration::from_secs(60),
            ..Default::default()
        });
        let now = Instant::now();

        state.record(now, None);
        state.record(now, None);
        assert_eq!(state.pause_remaining(now), Duration::from_secs(60));
    }

    #[test]
    fn test_projected_multiplier_is_read_only() {
        let mut state = PenaltyState::new(quiet_policy());
        let now = Instant::now();
        state.record(now, None);

        let projected = state.projected_multiplier(now + Duration::from_secs(61));
        assert!((projected - 1.0).abs() < f64::EPSILON);
        assert!((state.multiplier() - 2.0).abs() < f64::EPSILON);
    }
}
