//! Resilience configuration
//!
//! Provides a unified configuration for retry policies and concurrency
//! limiting with sane defaults for the store's published rate limits
//! (about three requests per second per integration).

use super::retry::RetryConfig;

/// Global resilience configuration for store operations
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
}

/// Concurrency limiting configuration
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum in-flight requests to the store
    pub max_concurrent_requests: usize,
    /// Independent schemas created side by side during phase 1 (1 = strictly sequential)
    pub max_parallel_creates: usize,
    /// Whether concurrency limiting is enabled
    pub enabled: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 3,
            max_parallel_creates: 1,
            enabled: true,
        }
    }
}
