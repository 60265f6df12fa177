//! Resilience utilities: retry logic, backoff, rate limiting, bulkheads.
//!
//! This module provides patterns to protect the target index from overload:
//!
//! - [`RetryConfig`]: Exponential backoff for transient index failures
//! - [`RateLimiter`]: Token bucket to stay under index write throughput
//! - [`Bulkhead`]: Semaphore to limit concurrent per-key workers
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), stream_replicator::resilience::BulkheadFull> {
//! use stream_replicator::resilience::{RateLimiter, Bulkhead, RateLimitConfig};
//!
//! // Rate limit: max 1000 writes/sec with burst of 100
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! limiter.acquire().await; // Blocks if over limit
//!
//! // Bulkhead: max 8 concurrent key workers
//! let bulkhead = Bulkhead::new(8);
//! let _permit = bulkhead.acquire().await?;
//! // permit dropped = slot released
//! # Ok(())
//! # }
//! ```

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use governor::{Quota, RateLimiter as GovLimiter, state::{InMemoryState, NotKeyed}, clock::DefaultClock, middleware::NoOpMiddleware};
use tokio::sync::{Semaphore, OwnedSemaphorePermit};

/// Configuration for retrying transient index failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per index call (first try included).
    pub max_attempts: usize,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,

    /// Timeout for each individual index call. Exceeding it counts as a
    /// transient failure eligible for retry.
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Patient retry for backfill-style invocations with no deadline
    /// pressure. Longer backoff ceiling, more attempts.
    pub fn patient() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(10),
        }
    }

    /// Single attempt, no retries. Useful when the caller layers its own
    /// redelivery on top (the upstream source redrives failed batches).
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            call_timeout: Duration::from_millis(500),
        }
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_factor.powi((attempt - 1) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let delay = Duration::from_secs_f64(delay_secs);

        std::cmp::min(delay, self.max_delay)
    }
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Configuration for rate limiting index writes.
///
/// Uses a token bucket algorithm: tokens refill at `refill_rate` per second,
/// up to `burst_size` tokens. Each write consumes one token.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum tokens that can be accumulated (burst capacity).
    pub burst_size: u32,

    /// Tokens added per second (sustained rate).
    pub refill_rate: u32,
}

impl Default for RateLimitConfig {
    /// Default: 1000 writes/sec with burst of 100.
    fn default() -> Self {
        Self {
            burst_size: 100,
            refill_rate: 1000,
        }
    }
}

impl RateLimitConfig {
    /// Conservative limit for small index clusters or constrained
    /// environments.
    pub fn conservative() -> Self {
        Self {
            burst_size: 10,
            refill_rate: 100,
        }
    }

    /// No rate limiting (unlimited).
    pub fn unlimited() -> Self {
        Self {
            burst_size: u32::MAX,
            refill_rate: u32::MAX,
        }
    }
}

/// Token bucket rate limiter.
///
/// Keeps write throughput under what the index can absorb, so transient
/// throttling responses stay rare instead of becoming the steady state.
/// Thread-safe and async-aware.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.refill_rate).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = GovLimiter::direct(quota);

        Self { limiter, config }
    }

    /// Acquire a permit, blocking until one is available.
    ///
    /// This method is cancel-safe.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit without blocking.
    ///
    /// Returns `true` if acquired, `false` if rate limit exceeded.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// =============================================================================
// Bulkhead (Concurrency Limiter)
// =============================================================================

/// Error when bulkhead is full.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bulkhead full: max {max_concurrent} concurrent operations")]
pub struct BulkheadFull {
    /// Maximum concurrent operations allowed.
    pub max_concurrent: usize,
}

/// Bulkhead pattern: limits concurrent operations to prevent resource
/// exhaustion.
///
/// The replicator uses one to cap how many per-key workers have index
/// calls in flight at once, bounding total wall-clock time without
/// flooding the index connection pool.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Bulkhead {
    /// Create a new bulkhead with the given concurrency limit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Create a bulkhead for limiting concurrent index writes.
    ///
    /// Default: 8 concurrent key workers.
    pub fn for_index_writes() -> Self {
        Self::new(8)
    }

    /// Acquire a permit, waiting if necessary.
    ///
    /// Returns a permit that releases the slot when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, BulkheadFull> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BulkheadFull {
                max_concurrent: self.max_concurrent,
            })
    }

    /// Try to acquire a permit without waiting.
    ///
    /// Returns `None` if the bulkhead is full.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Get the number of available permits.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the maximum concurrent operations allowed.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Check if the bulkhead is full (no permits available).
    pub fn is_full(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_patient_config() {
        let config = RetryConfig::patient();
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_no_retries_config() {
        let config = RetryConfig::no_retries();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(5),
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(16));
        // Should cap at max_delay
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_for_attempt_zero() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), config.initial_delay);
    }

    #[test]
    fn test_rate_limiter_try_acquire_burst() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_size: 5,
            refill_rate: 1000,
        });

        // Should be able to acquire burst_size permits immediately
        for _ in 0..5 {
            assert!(limiter.try_acquire(), "should acquire within burst");
        }

        // Next acquire should fail (burst exhausted)
        assert!(!limiter.try_acquire(), "should fail after burst exhausted");
    }

    #[tokio::test]
    async fn test_rate_limiter_acquire_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_size: 1,
            refill_rate: 1000, // 1ms per token
        });

        // Exhaust burst
        limiter.acquire().await;

        // Next acquire should complete quickly (high refill rate)
        let start = std::time::Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_millis(100), "should refill quickly");
    }

    #[test]
    fn test_rate_limit_config_presets() {
        let conservative = RateLimitConfig::conservative();
        assert_eq!(conservative.burst_size, 10);
        assert_eq!(conservative.refill_rate, 100);

        let unlimited = RateLimitConfig::unlimited();
        assert_eq!(unlimited.burst_size, u32::MAX);
    }

    #[test]
    fn test_rate_limiter_config_accessor() {
        let config = RateLimitConfig::conservative();
        let limiter = RateLimiter::new(config.clone());
        assert_eq!(limiter.config().burst_size, config.burst_size);
    }

    #[test]
    fn test_bulkhead_new() {
        let bulkhead = Bulkhead::new(10);
        assert_eq!(bulkhead.max_concurrent(), 10);
        assert_eq!(bulkhead.available(), 10);
        assert!(!bulkhead.is_full());
    }

    #[test]
    fn test_bulkhead_preset() {
        let writes = Bulkhead::for_index_writes();
        assert_eq!(writes.max_concurrent(), 8);
    }

    #[test]
    fn test_bulkhead_try_acquire() {
        let bulkhead = Bulkhead::new(2);

        let p1 = bulkhead.try_acquire();
        assert!(p1.is_some());
        assert_eq!(bulkhead.available(), 1);

        let p2 = bulkhead.try_acquire();
        assert!(p2.is_some());
        assert!(bulkhead.is_full());

        // Should fail - bulkhead full
        let p3 = bulkhead.try_acquire();
        assert!(p3.is_none());

        drop(p1);
        assert!(!bulkhead.is_full());

        let p4 = bulkhead.try_acquire();
        assert!(p4.is_some());
    }

    #[tokio::test]
    async fn test_bulkhead_acquire_waits() {
        let bulkhead = Arc::new(Bulkhead::new(1));
        let bulkhead2 = Arc::clone(&bulkhead);

        // Acquire the only permit
        let permit = bulkhead.acquire().await.unwrap();
        assert!(bulkhead.is_full());

        // Spawn a task that will wait for the permit
        let handle = tokio::spawn(async move {
            let start = std::time::Instant::now();
            let _p = bulkhead2.acquire().await.unwrap();
            start.elapsed()
        });

        // Wait a bit, then release
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(permit);

        // The waiting task should complete
        let wait_time = handle.await.unwrap();
        assert!(wait_time >= Duration::from_millis(40), "should have waited");
    }

    #[test]
    fn test_bulkhead_full_error() {
        let err = BulkheadFull { max_concurrent: 10 };
        assert_eq!(
            err.to_string(),
            "bulkhead full: max 10 concurrent operations"
        );
    }
}
