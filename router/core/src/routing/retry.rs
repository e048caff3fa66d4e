//! Retry Executor
//!
//! Bounded exponential backoff around any zero-argument async operation.
//! The executor only looks at [`RouterError::is_retryable`]; what the
//! operation does is none of its business. On a non-retryable error or when
//! attempts run out, the original error is returned unchanged.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RouterError};

/// Retry policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay_ms: u64,

    /// Upper bound on any delay
    pub max_delay_ms: u64,

    /// Growth factor per attempt
    pub backoff_multiplier: f64,

    /// Shorten each delay by up to 25% at random
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1` (0-indexed):
    /// `min(max_delay, initial_delay * multiplier^attempt)`
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        let duration_ms = if self.use_jitter {
            let jitter = rand::random::<f64>() * 0.25;
            capped * (1.0 - jitter)
        } else {
            capped
        };

        Duration::from_millis(duration_ms as u64)
    }
}

/// Result of a retried operation plus how many times it ran
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result
    pub result: Result<T>,
    /// Invocations of the operation (at least 1)
    pub attempts: u32,
}

/// Runs operations under a [`RetryConfig`]
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Executor for a policy
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The policy in use
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying retryable failures
    pub async fn execute_with_retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation).await.result
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), also reporting attempts
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error: RouterError = match operation().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= self.config.max_retries {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt + 1,
                };
            }

            let delay = self.config.backoff_for_attempt(attempt);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                code = error.code(),
                error = %error,
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
