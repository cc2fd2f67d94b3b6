//! Exponential backoff for remote capability calls
//!
//! Only failures classified as rate limits are retried. Everything else is
//! returned to the caller on first sight.

use crate::error::{Result, SmileDesignError};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential delay and uniform jitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each subsequent one
    pub base_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each delay
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SmileDesignError::invalid_config(
                "Invalid retry attempts: 0 (must be at least 1)",
            ));
        }
        if self.max_attempts > 16 {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid retry attempts: {} (valid range: 1-16)",
                self.max_attempts
            )));
        }
        // base >= jitter keeps consecutive delays non-decreasing
        if self.base_delay_ms < self.max_jitter_ms {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid retry delays: base {}ms is below max jitter {}ms",
                self.base_delay_ms, self.max_jitter_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry `n` (0-based) without jitter: `base * 2^n`
    #[must_use]
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Delay before retry `n` (0-based), jitter drawn from `U[0, max_jitter)`
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        };
        self.base_delay_for(retry) + Duration::from_millis(jitter)
    }

    /// Run `operation` until it succeeds, fails with a non-rate-limit error,
    /// or the attempt bound is reached
    ///
    /// The closure receives the 1-based attempt number. On success the value
    /// is returned together with the number of attempts made.
    ///
    /// # Errors
    /// - The first non-rate-limit error, unchanged
    /// - [`SmileDesignError::RateLimited`] once every attempt was rate limited
    pub async fn run<T, F, Fut>(
        &self,
        stage: &str,
        sleeper: &dyn Sleeper,
        mut operation: F,
    ) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(stage, attempt, "Remote call succeeded after retry");
                    }
                    return Ok((value, attempt));
                },
                Err(e) if e.is_rate_limit() => {
                    if attempt >= max_attempts {
                        tracing::warn!(stage, attempts = attempt, "Retry budget exhausted");
                        return Err(SmileDesignError::RateLimited {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Rate limited, backing off"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Suspends the current task between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
