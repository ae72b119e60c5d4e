//! Resilience features for store calls
//!
//! Provides retry policies with capped exponential backoff and a
//! semaphore-based concurrency limiter that keeps the provisioner inside
//! the store's rate limits.

pub mod concurrency;
pub mod config;
pub mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use config::{ConcurrencyConfig, ResilienceConfig};
pub use retry::{RetryConfig, RetryPolicy, RetryableError};
