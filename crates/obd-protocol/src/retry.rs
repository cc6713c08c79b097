//! Opt-in retry for failed requests

use crate::error::{ErrorKind, ObdError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry applied by the engine around whole requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first (1 = no retry)
    pub max_attempts: u8,
    /// Backoff base in milliseconds, doubled after every failed attempt
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(max_attempts: u8, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Whether `attempt` (1-based) failing with `err` earns another try
    ///
    /// Only communication failures are retried; a reply that arrived but
    /// failed validation would fail the same way again.
    pub fn should_retry(&self, attempt: u8, err: &ObdError) -> bool {
        attempt < self.max_attempts && err.kind() == ErrorKind::Communication
    }

    /// Pause before attempt `attempt + 1`
    pub fn delay(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(1 << shift))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_enabled());
        assert!(!policy.should_retry(1, &ObdError::Timeout(5000)));
    }

    #[test]
    fn test_only_communication_errors_retry() {
        let policy = RetryPolicy::new(3, 50);
        assert!(policy.should_retry(1, &ObdError::Timeout(5000)));
        assert!(policy.should_retry(2, &ObdError::AdapterReported("NO DATA".into())));
        assert!(!policy.should_retry(3, &ObdError::Timeout(5000)));
        assert!(!policy.should_retry(
            1,
            &ObdError::HeaderMismatch {
                expected: vec![0x41, 0x0C],
                actual: vec![0x41, 0x0D],
            }
        ));
        assert!(!policy.should_retry(1, &ObdError::UnsupportedParameter(0x01FF)));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, 100);
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, 10).max_attempts, 1);
    }
}
