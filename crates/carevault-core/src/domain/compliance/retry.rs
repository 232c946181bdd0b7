//! Backoff policy for audit appends

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of append attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default ceiling for a single delay
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Bounded exponential backoff
///
/// Attempt `n` (1-based) that fails waits `initial_backoff * 2^(n-1)`, capped at
/// `max_backoff`, plus up to 10% jitter. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);

        let jitter_ms = (base.as_millis() as u64) / 10;
        base + Duration::from_millis(rand_jitter() % jitter_ms.max(1))
    }
}

/// Generate a pseudo-random jitter value
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64 % 1000)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));

        let first = policy.backoff(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first < Duration::from_millis(111));

        let second = policy.backoff(2);
        assert!(second >= Duration::from_millis(200));
        assert!(second < Duration::from_millis(221));

        // 400ms would exceed the cap
        let third = policy.backoff(3);
        assert!(third >= Duration::from_millis(350));
        assert!(third < Duration::from_millis(386));
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff(u32::MAX);
        assert!(delay >= policy.max_backoff);
    }

    #[test]
    fn test_should_retry_counts_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
