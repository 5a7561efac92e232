//! Retry interval calculation for server failover and failback 429 retries.
//!
//! `interval(attempt) = base + factor^attempt + jitter`, with `jitter` a
//! uniform whole number of seconds in `[jitter_min, jitter_max]`. The RNG is
//! passed in so tests can seed it.

use rand::Rng;
use std::time::Duration;

/// Default fixed part of every retry interval, in seconds.
pub const DEFAULT_BACKOFF_BASE_SECONDS: u64 = 30;

/// Default exponential factor.
pub const DEFAULT_BACKOFF_FACTOR: u64 = 2;

/// Default lower jitter bound, in seconds.
pub const DEFAULT_JITTER_MIN_SECONDS: u64 = 1;

/// Default upper jitter bound, in seconds.
pub const DEFAULT_JITTER_MAX_SECONDS: u64 = 10;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_seconds: u64,
    pub factor: u64,
    pub jitter_min_seconds: u64,
    pub jitter_max_seconds: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_seconds: DEFAULT_BACKOFF_BASE_SECONDS,
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter_min_seconds: DEFAULT_JITTER_MIN_SECONDS,
            jitter_max_seconds: DEFAULT_JITTER_MAX_SECONDS,
        }
    }
}

impl BackoffPolicy {
    /// Retry interval in whole seconds for the given attempt (1-based).
    ///
    /// Never below `base_seconds`; saturates instead of overflowing for
    /// large attempt counts.
    pub fn interval_secs<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> u64 {
        let growth = self.factor.saturating_pow(attempt);
        let jitter = if self.jitter_max_seconds > self.jitter_min_seconds {
            rng.gen_range(self.jitter_min_seconds..=self.jitter_max_seconds)
        } else {
            self.jitter_min_seconds
        };

        self.base_seconds
            .saturating_add(growth)
            .saturating_add(jitter)
    }

    /// [`interval_secs`](Self::interval_secs) as a `Duration`.
    pub fn interval<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        Duration::from_secs(self.interval_secs(attempt, rng))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_interval_bounds_for_first_attempts() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let first = policy.interval_secs(1, &mut rng);
            assert!((33..=42).contains(&first), "attempt 1 gave {first}");

            let third = policy.interval_secs(3, &mut rng);
            assert!((39..=48).contains(&third), "attempt 3 gave {third}");
        }
    }

    #[test]
    fn test_interval_never_below_base() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 0..40 {
            assert!(policy.interval_secs(attempt, &mut rng) >= policy.base_seconds);
        }
    }

    #[test]
    fn test_mean_interval_non_decreasing() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(1234);
        let samples = 500u64;

        let mut previous_mean = 0u64;
        for attempt in 1..12 {
            let total: u64 = (0..samples)
                .map(|_| policy.interval_secs(attempt, &mut rng))
                .sum();
            let mean = total / samples;
            assert!(
                mean >= previous_mean,
                "mean for attempt {attempt} dropped: {mean} < {previous_mean}"
            );
            previous_mean = mean;
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let policy = BackoffPolicy::default();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);

        let seq_a: Vec<u64> = (1..10).map(|n| policy.interval_secs(n, &mut a)).collect();
        let seq_b: Vec<u64> = (1..10).map(|n| policy.interval_secs(n, &mut b)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_saturates_for_huge_attempts() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(policy.interval_secs(200, &mut rng), u64::MAX);
    }

    #[test]
    fn test_fixed_jitter() {
        let policy = BackoffPolicy {
            jitter_min_seconds: 5,
            jitter_max_seconds: 5,
            ..BackoffPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(policy.interval(2, &mut rng), Duration::from_secs(30 + 4 + 5));
    }
}
