//! Batch application engine.
//!
//! Applies a [`ReplicationBatch`] against a target index and accounts for
//! every record in a [`ReplicationOutcome`].
//!
//! # Design
//!
//! ```text
//! ReplicationBatch ──▶ validate ──▶ group by key (receipt order kept)
//!                        │                   │
//!                        │ empty key /       │ one worker per key,
//!                        │ missing image     │ gated by bulkhead
//!                        ▼                   ▼
//!                   failures[]    retry ▸ circuit ▸ timeout ▸ index call
//!                        ▲                   │
//!                        └───────────────────┘
//!                        ReplicationOutcome (processed + ordered failures)
//! ```
//!
//! Records for the same key are applied sequentially in receipt order, so
//! a later delete is never overtaken by an earlier write. Records for
//! different keys run concurrently up to the configured bulkhead width.
//!
//! # Failure Semantics
//!
//! Per-record errors never abort the batch: they land in the outcome's
//! failure list, ordered by the failing record's position in the input.
//! The invocation itself fails only on a setup-level precondition
//! (unreachable endpoint, invalid configuration).
//!
//! # Cancellation
//!
//! When the cancellation signal flips, in-flight index calls complete but
//! no new ones start; unattempted records are recorded as
//! [`FailureKind::Cancelled`] so the accounting invariant
//! `processed_count + failures.len() == batch.len()` holds even for
//! interrupted invocations.

use crate::circuit_breaker::{CircuitBreaker, CircuitError};
use crate::config::ReplicatorConfig;
use crate::error::{ReplicateError, Result};
use crate::index::SearchIndexRef;
use crate::metrics;
use crate::opensearch::HttpSearchIndex;
use crate::record::{ChangeOp, ChangeRecord, ReplicationBatch};
use crate::resilience::{Bulkhead, RateLimiter, RetryConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};

/// Classification of a per-record failure, as reported in the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Record failed validation (empty key, upsert without image).
    Validation,
    /// Transient index failure that survived all retry attempts.
    Transient,
    /// Index rejected the record outright; no retry was attempted.
    Permanent,
    /// Record was never attempted because the invocation was cancelled.
    Cancelled,
}

impl FailureKind {
    /// Classify an apply error.
    fn of(error: &ReplicateError) -> Self {
        match error {
            ReplicateError::Validation(_) => Self::Validation,
            ReplicateError::TransientIndex { .. } => Self::Transient,
            // Precondition errors abort the invocation before records are
            // dispatched; anything that reaches a record is a rejection.
            ReplicateError::PermanentIndex { .. } | ReplicateError::Precondition(_) => {
                Self::Permanent
            }
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Key of the failing record (may be empty for validation failures).
    pub key: String,
    /// Why it failed.
    pub kind: FailureKind,
}

/// Result of applying one batch.
///
/// Every record in the batch is accounted for exactly once:
/// `processed_count + failures.len() == batch.len()`.
#[derive(Debug, Default)]
pub struct ReplicationOutcome {
    /// Number of records applied successfully.
    pub processed_count: usize,
    /// Records that could not be applied, ordered by their position in
    /// the input batch.
    pub failures: Vec<Failure>,
}

impl ReplicationOutcome {
    /// Check if every record was applied.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total records accounted for.
    pub fn total(&self) -> usize {
        self.processed_count + self.failures.len()
    }
}

/// Applies change-record batches to a search index.
///
/// Holds no state between invocations beyond connection plumbing and the
/// circuit breaker's health window; all durable state lives in the index.
pub struct StreamReplicator<S: SearchIndexRef> {
    index: Arc<S>,
    /// Index name, used as the logging/metrics label.
    index_name: String,
    retry: RetryConfig,
    bulkhead: Bulkhead,
    circuit: Arc<CircuitBreaker>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl StreamReplicator<HttpSearchIndex> {
    /// Build a replicator backed by the HTTP index client.
    ///
    /// Fails with a precondition error on invalid configuration or an
    /// unusable endpoint URL.
    pub fn from_config(config: &ReplicatorConfig) -> Result<Self> {
        let index = HttpSearchIndex::new(&config.index)?;
        Self::new(Arc::new(index), config)
    }
}

impl<S: SearchIndexRef> StreamReplicator<S> {
    /// Create a replicator over an arbitrary index implementation.
    pub fn new(index: Arc<S>, config: &ReplicatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            index_name: config.index.index.clone(),
            retry: config.apply.retry_config(),
            bulkhead: Bulkhead::new(config.apply.max_concurrent_keys),
            circuit: Arc::new(CircuitBreaker::new("index_writes", config.apply.circuit_config())),
            rate_limiter: config
                .apply
                .rate_limit_config()
                .map(|rl| Arc::new(RateLimiter::new(rl))),
        })
    }

    /// Apply a batch, returning the per-batch outcome.
    ///
    /// Never fails for per-record errors; the only `Err` is a
    /// precondition failure (index unreachable).
    pub async fn replicate(&self, batch: ReplicationBatch) -> Result<ReplicationOutcome> {
        // Receiver with no live sender: always reads false.
        let (_tx, cancel) = watch::channel(false);
        self.replicate_with_cancel(batch, cancel).await
    }

    /// Apply a batch under a cancellation signal.
    ///
    /// When `cancel` flips to `true`, in-flight index calls complete but
    /// no new records are started; completed work is reflected in the
    /// returned outcome and the remainder is reported as
    /// [`FailureKind::Cancelled`].
    pub async fn replicate_with_cancel(
        &self,
        batch: ReplicationBatch,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReplicationOutcome> {
        if batch.is_empty() {
            return Ok(ReplicationOutcome::default());
        }

        let total = batch.len();
        let span = info_span!("replicate_batch", index = %self.index_name, records = total);

        async move {
            let started = Instant::now();
            metrics::record_batch_size(&self.index_name, total);

            // Precondition check: an unreachable index aborts the whole
            // invocation instead of producing a wall of per-record noise.
            self.index
                .ping()
                .await
                .map_err(|e| ReplicateError::Precondition(format!("index unreachable: {e}")))?;

            let failures: Arc<Mutex<Vec<(usize, Failure)>>> = Arc::new(Mutex::new(Vec::new()));
            let processed = Arc::new(AtomicUsize::new(0));

            // Partition into per-key groups, preserving receipt order
            // within each key. Validation failures are recorded here and
            // never reach the index.
            let mut groups: HashMap<String, Vec<(usize, ChangeRecord)>> = HashMap::new();
            {
                let mut sink = failures.lock().await;
                for (pos, record) in batch.into_iter().enumerate() {
                    match record.validate() {
                        Ok(()) => {
                            groups.entry(record.key.clone()).or_default().push((pos, record));
                        }
                        Err(e) => {
                            warn!(key = %record.key, error = %e, "Dropping malformed record");
                            metrics::record_failure(&self.index_name, FailureKind::Validation.as_str());
                            sink.push((
                                pos,
                                Failure {
                                    key: record.key,
                                    kind: FailureKind::Validation,
                                },
                            ));
                        }
                    }
                }
            }

            let mut join_set = JoinSet::new();
            for (key, records) in groups {
                // Stop dispatching once cancelled; in-flight workers run on.
                if *cancel.borrow() {
                    let mut sink = failures.lock().await;
                    for (pos, record) in records {
                        metrics::record_failure(&self.index_name, FailureKind::Cancelled.as_str());
                        sink.push((
                            pos,
                            Failure {
                                key: record.key,
                                kind: FailureKind::Cancelled,
                            },
                        ));
                    }
                    continue;
                }

                let permit = self.bulkhead.acquire().await.map_err(|e| {
                    ReplicateError::Precondition(format!("worker pool unavailable: {e}"))
                })?;
                metrics::set_inflight_workers(
                    &self.index_name,
                    self.bulkhead.max_concurrent() - self.bulkhead.available(),
                );

                let index = Arc::clone(&self.index);
                let circuit = Arc::clone(&self.circuit);
                let rate_limiter = self.rate_limiter.clone();
                let retry = self.retry.clone();
                let index_name = self.index_name.clone();
                let cancel = cancel.clone();
                let failures = Arc::clone(&failures);
                let processed = Arc::clone(&processed);
                let worker_span = info_span!("key_worker", key = %key);

                join_set.spawn(
                    async move {
                        let _permit = permit;
                        for (pos, record) in records {
                            if *cancel.borrow() {
                                metrics::record_failure(&index_name, FailureKind::Cancelled.as_str());
                                failures.lock().await.push((
                                    pos,
                                    Failure {
                                        key: record.key,
                                        kind: FailureKind::Cancelled,
                                    },
                                ));
                                continue;
                            }

                            let result = apply_with_retry(
                                index.as_ref(),
                                &circuit,
                                rate_limiter.as_deref(),
                                &retry,
                                &index_name,
                                &record,
                            )
                            .await;

                            match result {
                                Ok(()) => {
                                    processed.fetch_add(1, Ordering::SeqCst);
                                    metrics::record_applied(&index_name, op_name(record.op));
                                }
                                Err(e) => {
                                    let kind = FailureKind::of(&e);
                                    warn!(key = %record.key, error = %e, "Failed to apply record");
                                    metrics::record_failure(&index_name, kind.as_str());
                                    failures.lock().await.push((
                                        pos,
                                        Failure {
                                            key: record.key,
                                            kind,
                                        },
                                    ));
                                }
                            }
                        }
                    }
                    .instrument(worker_span),
                );
            }

            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Key worker aborted (JoinError)");
                }
            }
            metrics::set_inflight_workers(&self.index_name, 0);

            // Deterministic outcome: failures in input-batch order.
            let mut collected = std::mem::take(&mut *failures.lock().await);
            collected.sort_by_key(|(pos, _)| *pos);
            let cancelled = collected
                .iter()
                .filter(|(_, f)| f.kind == FailureKind::Cancelled)
                .count();
            let ordered: Vec<Failure> = collected.into_iter().map(|(_, f)| f).collect();
            let processed_count = processed.load(Ordering::SeqCst);
            debug_assert_eq!(processed_count + ordered.len(), total);

            metrics::record_cancelled(&self.index_name, cancelled);
            metrics::record_batch(&self.index_name, processed_count, ordered.len(), started.elapsed());
            info!(
                records = total,
                processed = processed_count,
                failed = ordered.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch applied"
            );

            Ok(ReplicationOutcome {
                processed_count,
                failures: ordered,
            })
        }
        .instrument(span)
        .await
    }
}

fn op_name(op: ChangeOp) -> &'static str {
    match op {
        ChangeOp::Upsert => "upsert",
        ChangeOp::Remove => "remove",
    }
}

/// Apply one record with bounded-backoff retries for transient failures.
///
/// Permanent failures return after a single attempt. An open circuit
/// counts as transient: the backoff waits out part of the recovery window
/// instead of hammering the index.
async fn apply_with_retry<S: SearchIndexRef>(
    index: &S,
    circuit: &CircuitBreaker,
    rate_limiter: Option<&RateLimiter>,
    retry: &RetryConfig,
    index_name: &str,
    record: &ChangeRecord,
) -> Result<()> {
    let operation = op_name(record.op);
    let mut attempt = 1;
    loop {
        if let Some(limiter) = rate_limiter {
            limiter.acquire().await;
        }

        let result = circuit
            .call(|| apply_once(index, record, retry.call_timeout, index_name))
            .await
            .map_err(|e| match e {
                CircuitError::Rejected => {
                    metrics::record_circuit_rejection(index_name);
                    ReplicateError::transient(operation, "circuit breaker open")
                }
                CircuitError::Inner(inner) => inner,
            });

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                metrics::record_retry(index_name, operation);
                debug!(
                    key = %record.key,
                    attempt,
                    error = %e,
                    "Transient index failure, backing off"
                );
                sleep(retry.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// One index call under the per-call timeout.
async fn apply_once<S: SearchIndexRef>(
    index: &S,
    record: &ChangeRecord,
    call_timeout: Duration,
    index_name: &str,
) -> Result<()> {
    let started = Instant::now();
    let operation = op_name(record.op);

    let result = match record.op {
        ChangeOp::Upsert => {
            // validate() guarantees an image for upserts.
            let image = record.image.clone().unwrap_or_default();
            match timeout(call_timeout, index.upsert(record.key.clone(), image)).await {
                Ok(r) => r,
                Err(_) => Err(ReplicateError::transient(
                    operation,
                    format!("call exceeded {}", humantime::format_duration(call_timeout)),
                )),
            }
        }
        ChangeOp::Remove => match timeout(call_timeout, index.delete(record.key.clone())).await {
            Ok(r) => r.map(|_| ()),
            Err(_) => Err(ReplicateError::transient(
                operation,
                format!("call exceeded {}", humantime::format_duration(call_timeout)),
            )),
        },
    };

    metrics::record_index_call_latency(index_name, operation, started.elapsed());
    result
}
