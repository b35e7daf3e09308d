//! Retry with exponential backoff for retriable exchange errors

use std::time::Duration;
use tracing::warn;

use crate::error::{ExchangeError, ExchangeResult};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further one
    pub base_delay: Duration,
    /// Upper bound for any single delay, including server-provided ones
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Policy without sleeping between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based) after `error`
    pub fn delay_for(&self, attempt: u32, error: &ExchangeError) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = match error {
            ExchangeError::RateLimit {
                retry_after: Some(after),
                ..
            } => (*after).max(backoff),
            _ => backoff,
        };
        delay.min(self.max_delay)
    }

    /// Run `operation`, retrying retriable errors up to `max_retries` times
    ///
    /// Fatal errors are returned on first sight. After the last attempt the
    /// final error is returned unchanged.
    pub fn run<T, F>(&self, what: &str, mut operation: F) -> ExchangeResult<T>
    where
        F: FnMut() -> ExchangeResult<T>,
    {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        what,
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
