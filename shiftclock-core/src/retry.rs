//! Bounded exponential backoff for store calls.

use crate::config::StoreConfig;
use crate::error::Result;
use std::time::Duration;

/// How transient store failures are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Run `op`, retrying transient failures with doubling delays.
    ///
    /// Non-transient errors are returned immediately; after `max_retries`
    /// retries the last transient error is returned.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut delay = self.initial_backoff;
        let mut attempt = 0;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store error, retrying"
                    );
                    std::thread::sleep(delay);
                    delay = std::cmp::min(delay * 2, self.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
