//! Configuration for the stream replicator.
//!
//! This module defines all configuration types needed to run the replicator.
//! Configuration is passed to [`StreamReplicator::new()`](crate::StreamReplicator::new)
//! and can be constructed programmatically, deserialized from YAML/JSON, or
//! read from the environment ([`ReplicatorConfig::from_env`]).
//!
//! # Quick Start
//!
//! ```rust
//! use stream_replicator::config::{ReplicatorConfig, IndexConfig};
//!
//! let config = ReplicatorConfig {
//!     index: IndexConfig {
//!         endpoint: "https://search.example.com".into(),
//!         index: "orders".into(),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── index: IndexConfig       # Target index endpoint + credentials
//! │   ├── endpoint, index, key_attribute
//! │   └── username / password (optional basic auth)
//! └── apply: ApplyConfig       # Batch application behavior
//!     ├── max_concurrent_keys  # Bulkhead width
//!     ├── retry knobs          # attempts, backoff, per-call timeout
//!     ├── rate limiting        # optional token bucket
//!     └── circuit breaker      # failure threshold, recovery window
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! index:
//!   endpoint: "https://search-mydomain.us-east-1.example.com"
//!   index: "orders"
//!   key_attribute: "UserId"
//!
//! apply:
//!   max_concurrent_keys: 8
//!   max_attempts: 3
//!   call_timeout: "5s"
//! ```

use crate::circuit_breaker::CircuitConfig;
use crate::error::{ReplicateError, Result};
use crate::resilience::{RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config: passed to StreamReplicator::new()
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `StreamReplicator::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Target index location and credentials.
    pub index: IndexConfig,

    /// Batch application behavior (concurrency, retries, timeouts).
    #[serde(default)]
    pub apply: ApplyConfig,
}

impl ReplicatorConfig {
    /// Read configuration from the environment.
    ///
    /// - `ENDPOINT` (required): the index domain, e.g.
    ///   `https://search-mydomain.us-east-1.example.com`
    /// - `INDEX` (default `orders`): target index name
    /// - `KEY_ATTRIBUTE` (default `UserId`): source key attribute used as
    ///   the document id
    /// - `INDEX_USERNAME` / `INDEX_PASSWORD` (optional): basic auth
    ///
    /// Missing `ENDPOINT` is a precondition failure: without it no batch
    /// work can start.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("ENDPOINT")
            .map_err(|_| ReplicateError::Precondition("ENDPOINT not set".to_string()))?;

        let index = IndexConfig {
            endpoint,
            index: std::env::var("INDEX").unwrap_or_else(|_| default_index()),
            key_attribute: std::env::var("KEY_ATTRIBUTE").unwrap_or_else(|_| default_key_attribute()),
            username: std::env::var("INDEX_USERNAME").ok(),
            password: std::env::var("INDEX_PASSWORD").ok(),
        };

        let config = Self {
            index,
            apply: ApplyConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a minimal config for testing.
    pub fn for_testing(endpoint: &str) -> Self {
        Self {
            index: IndexConfig {
                endpoint: endpoint.to_string(),
                index: "test-index".to_string(),
                key_attribute: default_key_attribute(),
                username: None,
                password: None,
            },
            apply: ApplyConfig::testing(),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns a precondition error for anything that would make every
    /// index call fail (empty endpoint, zero attempts, zero concurrency).
    pub fn validate(&self) -> Result<()> {
        if self.index.endpoint.is_empty() {
            return Err(ReplicateError::Precondition("index endpoint is empty".to_string()));
        }
        if !self.index.endpoint.starts_with("http://") && !self.index.endpoint.starts_with("https://")
        {
            return Err(ReplicateError::Precondition(format!(
                "index endpoint is not an http(s) URL: {}",
                self.index.endpoint
            )));
        }
        if self.index.index.is_empty() {
            return Err(ReplicateError::Precondition("index name is empty".to_string()));
        }
        if self.index.key_attribute.is_empty() {
            return Err(ReplicateError::Precondition("key attribute is empty".to_string()));
        }
        if self.apply.max_attempts == 0 {
            return Err(ReplicateError::Precondition("max_attempts must be at least 1".to_string()));
        }
        if self.apply.max_concurrent_keys == 0 {
            return Err(ReplicateError::Precondition(
                "max_concurrent_keys must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IndexConfig: where the documents go
// ═══════════════════════════════════════════════════════════════════════════════

/// Target index location and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index endpoint, e.g. `"https://search-mydomain.us-east-1.example.com"`.
    #[serde(default)]
    pub endpoint: String,

    /// Index name documents are written to.
    #[serde(default = "default_index")]
    pub index: String,

    /// Source key attribute whose value becomes the document id
    /// (the table hash key, e.g. `"UserId"`).
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,

    /// Basic auth username, if the index requires authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            index: default_index(),
            key_attribute: default_key_attribute(),
            username: None,
            password: None,
        }
    }
}

fn default_index() -> String {
    "orders".to_string()
}

fn default_key_attribute() -> String {
    "UserId".to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ApplyConfig: batch application behavior
// ═══════════════════════════════════════════════════════════════════════════════

/// Batch application settings: concurrency, retries, timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Maximum key workers with index calls in flight at once.
    /// Writes for the same key are always serialized regardless.
    #[serde(default = "default_max_concurrent_keys")]
    pub max_concurrent_keys: usize,

    /// Maximum attempts per index call (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial retry delay as a duration string (e.g. "100ms").
    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay: String,

    /// Backoff ceiling as a duration string (e.g. "5s").
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: String,

    /// Backoff multiplier between attempts.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Per-call timeout as a duration string (e.g. "5s").
    /// Exceeding it counts as a transient failure.
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,

    // ─────────────────────────────────────────────────────────────────────────
    // Rate Limiting (index throttling avoidance)
    // ─────────────────────────────────────────────────────────────────────────

    /// Enable rate limiting of index writes.
    #[serde(default = "default_false")]
    pub rate_limit_enabled: bool,

    /// Maximum writes per second (sustained rate).
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Maximum burst size for rate limiting.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    // ─────────────────────────────────────────────────────────────────────────
    // Circuit Breaker
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of consecutive failures before the circuit opens.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// How long to wait before probing recovery, as a duration string.
    #[serde(default = "default_circuit_recovery_timeout")]
    pub circuit_recovery_timeout: String,
}

fn default_max_concurrent_keys() -> usize {
    8
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_retry_delay() -> String {
    "100ms".to_string()
}

fn default_max_retry_delay() -> String {
    "5s".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_call_timeout() -> String {
    "5s".to_string()
}

fn default_false() -> bool {
    false
}

fn default_rate_limit_per_sec() -> u32 {
    1000
}

fn default_rate_limit_burst() -> u32 {
    100
}

fn default_circuit_failure_threshold() -> u32 {
    3
}

fn default_circuit_recovery_timeout() -> String {
    "60s".to_string()
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_keys: 8,
            max_attempts: 3,
            initial_retry_delay: "100ms".to_string(),
            max_retry_delay: "5s".to_string(),
            backoff_factor: 2.0,
            call_timeout: "5s".to_string(),
            rate_limit_enabled: false,
            rate_limit_per_sec: 1000,
            rate_limit_burst: 100,
            circuit_failure_threshold: 3,
            circuit_recovery_timeout: "60s".to_string(),
        }
    }
}

impl ApplyConfig {
    /// Fast timeouts and backoff for tests.
    pub fn testing() -> Self {
        Self {
            max_concurrent_keys: 4,
            max_attempts: 3,
            initial_retry_delay: "10ms".to_string(),
            max_retry_delay: "100ms".to_string(),
            backoff_factor: 2.0,
            call_timeout: "500ms".to_string(),
            rate_limit_enabled: false,
            rate_limit_per_sec: 1000,
            rate_limit_burst: 100,
            circuit_failure_threshold: 100,
            circuit_recovery_timeout: "50ms".to_string(),
        }
    }

    /// Build the retry policy from these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: parse_duration_or(&self.initial_retry_delay, Duration::from_millis(100)),
            max_delay: parse_duration_or(&self.max_retry_delay, Duration::from_secs(5)),
            backoff_factor: self.backoff_factor,
            call_timeout: parse_duration_or(&self.call_timeout, Duration::from_secs(5)),
        }
    }

    /// Build the rate limit configuration.
    ///
    /// Returns `None` if rate limiting is disabled.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        if self.rate_limit_enabled {
            Some(RateLimitConfig {
                burst_size: self.rate_limit_burst,
                refill_rate: self.rate_limit_per_sec,
            })
        } else {
            None
        }
    }

    /// Build the circuit breaker configuration.
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold,
            success_threshold: 2,
            recovery_timeout: parse_duration_or(&self.circuit_recovery_timeout, Duration::from_secs(60)),
        }
    }
}

fn parse_duration_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}
