//! Bounded retry-with-delay around a fallible operation.
use std::{thread, time::Duration};

use tracing::debug;

use crate::error::RetryExhausted;

/// How many times to attempt an operation and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub retries: u32,
    /// Pause after each failed attempt except the last.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// A policy that spreads attempts evenly over `timeout`.
    pub fn within(timeout: Duration, delay: Duration) -> Self {
        let delay_ms = delay.as_millis().max(1);
        let attempts = u32::try_from(timeout.as_millis() / delay_ms)
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        Self::new(attempts, delay)
    }

    /// Runs `operation` until it succeeds or the attempts are used up. The closure receives
    /// the 1-based attempt number.
    pub fn execute<T, E, F>(&self, mut operation: F) -> Result<T, RetryExhausted<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.retries.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    debug!(
                        "Attempt {attempt}/{attempts} failed: {err}; retrying in {:?}",
                        self.delay
                    );
                    thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Shorthand for `RetryPolicy::new(retries, delay).execute(operation)`.
pub fn execute<T, E, F>(
    operation: F,
    retries: u32,
    delay: Duration,
) -> Result<T, RetryExhausted<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32) -> Result<T, E>,
{
    RetryPolicy::new(retries, delay).execute(operation)
}
