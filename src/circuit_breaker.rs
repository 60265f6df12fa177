//! Circuit breaker pattern for target-index protection.
//!
//! Prevents cascading failures when the index is overloaded or unhealthy.
//! Uses the `recloser` crate.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Index unhealthy, requests fail-fast without attempting
//! - **HalfOpen**: Testing if the index recovered, limited requests allowed
//!
//! An open circuit surfaces as a rejection, which the replicator treats as
//! a transient failure: the per-record retry policy waits out the recovery
//! window instead of hammering a struggling index.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use stream_replicator::circuit_breaker::{CircuitBreaker, CircuitError};
//! # async fn example() -> Result<(), CircuitError<String>> {
//! let circuit = CircuitBreaker::for_index_writes();
//!
//! match circuit.call(|| async { Ok::<(), String>(()) }).await {
//!     Ok(()) => { /* success */ }
//!     Err(CircuitError::Rejected) => { /* circuit open, backoff */ }
//!     Err(CircuitError::Inner(e)) => { /* index error */ }
//! }
//! # Ok(())
//! # }
//! ```

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open).
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    /// Check if this is a rejection (circuit open).
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected)
    }

    /// Get the inner error if present.
    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<RecloserError<E>> for CircuitError<E> {
    fn from(err: RecloserError<E>) -> Self {
        match err {
            RecloserError::Rejected => CircuitError::Rejected,
            RecloserError::Inner(e) => CircuitError::Inner(e),
        }
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Number of consecutive failures to trip the circuit.
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open to close circuit.
    pub success_threshold: u32,
    /// How long to wait before attempting recovery (half-open).
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Aggressive config: trips faster, recovers cautiously.
    ///
    /// Use for index writes where we don't want to hammer a struggling
    /// cluster.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    /// Fast recovery for testing.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// A named circuit breaker with metrics tracking.
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    // Metrics
    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config.
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.failure_threshold as f32 / 100.0)
            .closed_len(config.failure_threshold as usize)
            .half_open_len(config.success_threshold as usize)
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Create the breaker used for index write operations.
    pub fn for_index_writes() -> Self {
        Self::new("index_writes", CircuitConfig::aggressive())
    }

    /// Get the circuit breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an async operation through the circuit breaker.
    ///
    /// Takes a closure that returns a Future, allowing lazy evaluation.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        match self.inner.call(f()).await {
            Ok(result) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call succeeded");
                Ok(result)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call failed");
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Get total number of calls.
    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    /// Get number of successful calls.
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Get number of failed calls (operation errors).
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get number of rejected calls (circuit open).
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}
