//! Retry policy with capped exponential backoff
//!
//! Transient failures (rate limiting, network) are retried up to a fixed
//! attempt count. Anything else is returned on the first failure.

use log::{debug, warn};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt can succeed
pub trait RetryableError {
    fn is_retryable(&self) -> bool;

    /// Server-requested delay before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay to between half and all of its nominal value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

#[cfg(test)]
impl RetryConfig {
    /// Attempts without any waiting in between
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Executes async operations under a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Nominal delay before attempt `attempt + 1` (attempts are 1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let nominal =
            self.config.base_delay.as_secs_f64() * self.config.backoff_multiplier.powi(exponent);
        let capped = nominal.min(self.config.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    fn wait_time<E: RetryableError>(&self, attempt: u32, error: &E) -> Duration {
        let mut delay = self.delay_for(attempt);
        if self.config.jitter && !delay.is_zero() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }
        match error.retry_after() {
            Some(requested) => delay.max(requested).min(self.config.max_delay),
            None => delay,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: RetryableError + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let wait = self.wait_time(attempt, &err);
                    warn!(
                        "{} failed (attempt {}/{}): {} - retrying in {:?}",
                        label, attempt, max_attempts, err, wait
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!("{} giving up after {} attempts: {}", label, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
