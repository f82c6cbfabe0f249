//! Retry policy for transient license fetch failures.

use crate::Error;
use std::time::Duration;

/// Bounded exponential backoff for the two retryable failure classes:
/// transport timeouts and server-reported transient statuses.
///
/// Exceeding the attempt cap surfaces the last observed failure verbatim.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    first_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt too and is clamped to at
    /// least one.
    pub fn new(max_attempts: u32, first_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt once `attempt` attempts (1-based) have
    /// failed. Doubles with every retry.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.first_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Whether a transport failure is worth another attempt. Only timeouts
    /// are; every other transport status surfaces verbatim.
    pub fn should_retry(&self, error: &Error) -> bool {
        matches!(error, Error::TimeOut(_))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn only_timeouts_are_retryable_transport_failures() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&Error::TimeOut(String::new())));
        assert!(!policy.should_retry(&Error::Network(String::new())));
        assert!(!policy.should_retry(&Error::Server(String::new())));
        assert!(!policy.should_retry(&Error::Internal(String::new())));
    }
}
