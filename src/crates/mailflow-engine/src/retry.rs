//! Backoff configuration for externally-flaky node executions
//!
//! Only transient failures of operations that reach outside the engine
//! are retried. Delays grow geometrically per attempt, never exceed
//! `max_interval`, and are jittered by default so simultaneous failures
//! do not retry in lockstep.

use rand::Rng;
use std::time::Duration;

/// How often and how patiently a failed node execution is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: usize,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Growth factor applied to the delay after each retry
    pub backoff_factor: f64,

    /// Upper bound on any single delay
    pub max_interval: Duration,

    /// Randomize each delay between 0.5x and 1.5x of its computed value
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(128),
            jitter: true,
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay to sleep before retry number `attempt` (0-indexed):
    /// `initial_interval * backoff_factor^attempt`, capped, jittered.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::ZERO;
        }

        let grown = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = grown.min(self.max_interval.as_secs_f64());
        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };
        Duration::from_secs_f64(scaled)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn should_retry(&self, attempts_made: usize) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, Duration::from_millis(500));
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_delays_grow_geometrically() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(Duration::from_secs(1))
            .with_backoff_factor(2.0)
            .with_max_interval(Duration::from_secs(100))
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(Duration::from_secs(10))
            .with_backoff_factor(2.0)
            .with_max_interval(Duration::from_secs(50))
            .with_jitter(false);

        // 10 * 2^5 = 320s uncapped
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(50));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(Duration::from_secs(1))
            .with_backoff_factor(2.0)
            .with_jitter(true);

        let base = Duration::from_secs(4); // 1s * 2^2
        for _ in 0..20 {
            let delay = policy.calculate_delay(2);
            assert!(delay >= base / 2);
            assert!(delay <= base * 3 / 2);
        }
    }

    #[test]
    fn test_attempt_accounting() {
        let policy = RetryPolicy::new(3);

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }
}
