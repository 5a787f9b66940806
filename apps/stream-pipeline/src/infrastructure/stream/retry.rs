//! Retry policy with exponential backoff for single-record publishes.
//!
//! The delay schedule is deterministic and part of the publish contract:
//! `delay(n) = min(max_delay, initial_delay * 2^(n-1))` for the n-th retry.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use stream_pipeline::infrastructure::stream::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for(1), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(200));
//! assert_eq!(policy.delay_for(3), Duration::from_millis(400));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for `publish_with_retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (default: 3).
    pub max_retries: u32,
    /// Delay before the first retry (default: 100ms).
    pub initial_delay: Duration,
    /// Upper bound on any single delay (default: 5s).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom settings.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Total publish attempts this policy allows (1 initial + retries).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff delay before the `retry`-th retry (1-based), clamped to
    /// `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63);
        let factor = 1u128 << exponent;
        let millis = self.initial_delay.as_millis().saturating_mul(factor);
        let capped = millis.min(self.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }
}
