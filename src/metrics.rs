//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Batch outcomes (processed / failed counts, duration)
//! - Per-record apply results by operation and failure kind
//! - Retry attempts
//! - Circuit breaker rejections
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track distributions (duration, size).
//!
//! # Usage
//!
//! ```rust,no_run
//! use stream_replicator::metrics;
//! use std::time::Duration;
//!
//! // After applying a batch
//! metrics::record_batch("orders", 100, 2, Duration::from_millis(85));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed batch: sizes and wall-clock duration.
pub fn record_batch(index: &str, processed: usize, failed: usize, duration: Duration) {
    counter!("replication_batches_total", "index" => index.to_string()).increment(1);
    counter!("replication_records_processed_total", "index" => index.to_string())
        .increment(processed as u64);
    if failed > 0 {
        counter!("replication_records_failed_total", "index" => index.to_string())
            .increment(failed as u64);
    }
    histogram!("replication_batch_duration_seconds", "index" => index.to_string())
        .record(duration.as_secs_f64());
}

/// Record the size of an incoming batch before any processing.
pub fn record_batch_size(index: &str, size: usize) {
    histogram!("replication_batch_size", "index" => index.to_string()).record(size as f64);
}

/// Record one applied record by operation type ("upsert" / "remove").
pub fn record_applied(index: &str, operation: &str) {
    counter!("replication_records_applied_total", "index" => index.to_string(), "operation" => operation.to_string())
        .increment(1);
}

/// Record one failed record by failure kind.
pub fn record_failure(index: &str, kind: &str) {
    counter!("replication_record_failures_total", "index" => index.to_string(), "kind" => kind.to_string())
        .increment(1);
}

/// Record a retry attempt for an index call.
pub fn record_retry(index: &str, operation: &str) {
    counter!("replication_retries_total", "index" => index.to_string(), "operation" => operation.to_string())
        .increment(1);
}

/// Record an index call latency by operation type.
pub fn record_index_call_latency(index: &str, operation: &str, duration: Duration) {
    histogram!(
        "replication_index_call_duration_seconds",
        "index" => index.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a circuit breaker rejection (fail-fast without an index call).
pub fn record_circuit_rejection(index: &str) {
    counter!("replication_circuit_rejections_total", "index" => index.to_string()).increment(1);
}

/// Gauge for in-flight key workers.
pub fn set_inflight_workers(index: &str, count: usize) {
    gauge!("replication_inflight_workers", "index" => index.to_string()).set(count as f64);
}

/// Record records dropped by cancellation (never attempted).
pub fn record_cancelled(index: &str, count: usize) {
    if count > 0 {
        counter!("replication_records_cancelled_total", "index" => index.to_string())
            .increment(count as u64);
    }
}
