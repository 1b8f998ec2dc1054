//! Retry decisions and backoff delays for the request pipeline.

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::Error;

/// Delay before the first retry; doubles on each subsequent attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry policy for a single logical request.
///
/// Network failures and retryable HTTP statuses share one budget of `max_retries` retries,
/// so a request is sent at most `max_retries + 1` times.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether a response with `status` is worth sending again: 429 or any 5xx.
    #[must_use]
    pub fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500
    }

    /// Whether retry number `attempt` (1-based) still fits the budget.
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Exponential delay for retry `attempt` (1-based) without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1_u32 << exp)
    }

    /// Delay before retry `attempt` (1-based).
    ///
    /// A server-provided `retry_after` on the last [`Kind::RateLimit`](crate::error::Kind)
    /// error is honoured verbatim. Otherwise the exponential backoff is extended by a uniform
    /// jitter of up to half of itself.
    #[must_use]
    pub fn delay(&self, attempt: u32, last_error: Option<&Error>) -> Duration {
        self.delay_with_jitter(attempt, last_error, rand::random::<f64>())
    }

    /// `jitter` is a sample from `[0, 1)`.
    pub(crate) fn delay_with_jitter(
        &self,
        attempt: u32,
        last_error: Option<&Error>,
        jitter: f64,
    ) -> Duration {
        if let Some(delay) = last_error.and_then(Error::retry_after) {
            return delay;
        }

        let base = self.backoff(attempt);
        base + base.mul_f64(jitter.clamp(0.0, 1.0) * 0.5)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_RETRIES)
    }
}
