//! # Stream Replicator
//!
//! A replication core that mirrors change-data-capture records into a
//! search index.
//!
//! ## Architecture
//!
//! The replicator sits between an upstream CDC delivery mechanism (which
//! invokes it once per batch) and a document search index reached over
//! authenticated HTTP:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         stream-replicator                           │
//! │                                                                     │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌───────────────────┐  │
//! │  │ decode wire  │───►│ StreamReplicator │───►│ SearchIndexRef    │  │
//! │  │ envelope     │    │ (per-key workers)│    │ (HTTP / mock)     │  │
//! │  └──────────────┘    └──────────────────┘    └───────────────────┘  │
//! │                               │                        │            │
//! │                               ▼                        ▼            │
//! │                    ┌────────────────────┐   ┌───────────────────┐   │
//! │                    │ retry + bulkhead + │   │ ReplicationOutcome│   │
//! │                    │ circuit breaker    │   │ (per-record)      │   │
//! │                    └────────────────────┘   └───────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Every record in a batch is accounted for exactly once:
//!   `processed_count + failures.len() == batch.len()`.
//! - Records for the same key apply in receipt order; different keys run
//!   concurrently under a bounded worker pool.
//! - Per-record failures never abort a batch. Only setup-level
//!   precondition failures (unreachable endpoint, bad configuration)
//!   propagate to the caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stream_replicator::{ReplicatorConfig, StreamReplicator, record};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReplicatorConfig::from_env()?;
//!     let replicator = StreamReplicator::from_config(&config)?;
//!
//!     let payload = r#"{"Records": []}"#; // delivered by the CDC source
//!     let batch = record::decode_stream_event(payload, &config.index.key_attribute)?;
//!
//!     let outcome = replicator.replicate(batch).await?;
//!     println!("{} records processed", outcome.processed_count);
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod opensearch;
pub mod record;
pub mod replicator;
pub mod resilience;

// Re-exports for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use config::{ApplyConfig, IndexConfig, ReplicatorConfig};
pub use error::{ReplicateError, Result};
pub use index::{NoOpSearchIndex, SearchIndexRef};
pub use opensearch::HttpSearchIndex;
pub use record::{ChangeOp, ChangeRecord, Document, ReplicationBatch};
pub use replicator::{Failure, FailureKind, ReplicationOutcome, StreamReplicator};
