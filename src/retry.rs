use std::time::Duration;

use crate::constants::{BACKOFF_BASE, BACKOFF_CAP, DEFAULT_MAX_ATTEMPTS, ERROR_RETRY_DELAY};

/// Attempt budget and waits for the generateContent retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first request.
    pub max_attempts: u32,
    /// Wait after the first rate-limited attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Ceiling for rate-limit waits.
    pub max_delay: Duration,
    /// Flat wait after any other failed attempt.
    pub error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_CAP,
            error_delay: ERROR_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// `min(base * 2^(attempt-1), cap)` for a 1-based attempt number.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn failure_delay(&self) -> Duration {
        self.error_delay
    }
}
