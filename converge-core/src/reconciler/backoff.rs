//! Retry policy for transient provider failures.

use std::time::Duration;

/// A few immediate retries, then exponential backoff up to `max_delay`.
/// After `max_attempts` consecutive failures the error becomes terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub immediate_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            immediate_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempts` consecutive failures.
    pub fn delay(&self, attempts: u32) -> Duration {
        if attempts <= self.immediate_retries {
            return Duration::ZERO;
        }
        let exponent = (attempts - self.immediate_retries - 1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
