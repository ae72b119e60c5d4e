//! Concurrency limiter implementation
//!
//! Provides a semaphore-based limiter for controlling concurrent store
//! requests when independent schemas are created or patched side by side.

use super::config::ConcurrencyConfig;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-based concurrency limiter for controlling concurrent requests
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    config: ConcurrencyConfig,
    requests_acquired: Arc<AtomicU64>,
    requests_waited: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    /// Create a new concurrency limiter with the given configuration
    pub fn new(config: ConcurrencyConfig) -> Self {
        let permits = if config.enabled {
            config.max_concurrent_requests.max(1)
        } else {
            // Large but valid (Tokio Semaphore max is 2^61-1)
            1_000_000
        };

        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
            requests_acquired: Arc::new(AtomicU64::new(0)),
            requests_waited: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire a permit for making a request. Waits if at capacity.
    /// Returns an owned permit that releases automatically when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        if self.config.enabled && self.semaphore.available_permits() == 0 {
            self.requests_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Concurrency limiter: waiting for permit ({} in use)",
                self.config.max_concurrent_requests
            );
        }

        // The semaphore is owned by the limiter and never closed
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("concurrency semaphore closed");
        self.requests_acquired.fetch_add(1, Ordering::Relaxed);
        permit
    }

    /// Get current statistics
    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            requests_acquired: self.requests_acquired.load(Ordering::Relaxed),
            requests_waited: self.requests_waited.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the concurrency limiter
#[derive(Debug, Clone)]
pub struct ConcurrencyStats {
    /// Total permits acquired since creation
    pub requests_acquired: u64,
    /// Number of times a request had to wait for a permit
    pub requests_waited: u64,
}

impl ConcurrencyStats {
    /// Fraction of requests that had to wait
    pub fn wait_rate(&self) -> f64 {
        if self.requests_acquired == 0 {
            0.0
        } else {
            self.requests_waited as f64 / self.requests_acquired as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(max: usize, enabled: bool) -> ConcurrencyLimiter {
        ConcurrencyLimiter::new(ConcurrencyConfig {
            max_concurrent_requests: max,
            max_parallel_creates: 1,
            enabled,
        })
    }

    #[tokio::test]
    async fn test_concurrency_limiter_disabled() {
        let limiter = limiter(2, false);

        let mut permits = Vec::new();
        for _ in 0..50 {
            permits.push(limiter.acquire().await);
        }
        assert_eq!(permits.len(), 50);
        assert_eq!(limiter.stats().requests_waited, 0);
    }

    #[tokio::test]
    async fn test_concurrency_limiter_max_permits() {
        let limiter = limiter(2, true);

        let p1 = limiter.acquire().await;
        let _p2 = limiter.acquire().await;
        assert_eq!(limiter.semaphore.available_permits(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(p1);
        assert_eq!(limiter.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_limiter_acquire_waits() {
        let limiter = limiter(1, true);
        let limiter_clone = limiter.clone();

        let permit = limiter.acquire().await;

        let handle = tokio::spawn(async move {
            let _permit = limiter_clone.acquire().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(permit);

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok());

        let stats = limiter.stats();
        assert_eq!(stats.requests_acquired, 2);
        assert_eq!(stats.requests_waited, 1);
        assert!(stats.wait_rate() > 0.0);
    }
}
