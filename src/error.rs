// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication core.
//!
//! This module defines the error types used throughout the replicator.
//! Errors are categorized by their effect on a batch: per-record errors are
//! absorbed into the batch outcome, while precondition errors abort the
//! whole invocation.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Scope | Description |
//! |------------|-----------|-------|-------------|
//! | `Validation` | No | Record | Malformed record (empty key) |
//! | `TransientIndex` | Yes | Record | Timeout, throttling, 5xx from the index |
//! | `PermanentIndex` | No | Record | Auth failure, schema rejection |
//! | `Precondition` | No | Invocation | Unreachable endpoint, bad configuration |
//!
//! # Retry Behavior
//!
//! Use [`ReplicateError::is_retryable()`] to determine if an operation
//! should be retried with backoff. Only transient index errors qualify;
//! everything else indicates malformed input, a rejected request, or a
//! setup problem that retrying cannot fix.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicateError>;

/// Errors that can occur while applying change records to the index.
///
/// Each variant includes context about where the error occurred.
/// Use [`is_retryable()`](Self::is_retryable) to check if the operation
/// should be retried, and [`is_fatal()`](Self::is_fatal) to check if the
/// whole invocation must abort.
#[derive(Error, Debug, Clone)]
pub enum ReplicateError {
    /// Malformed change record.
    ///
    /// Occurs when a record fails validation (e.g. an empty key).
    /// Recorded as a per-record failure; never aborts the batch.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient index failure.
    ///
    /// Occurs on network timeouts, throttling signals, and server-side
    /// errors from the target index. Retryable with exponential backoff;
    /// recorded as a per-record failure once attempts are exhausted.
    #[error("transient index error ({operation}): {message}")]
    TransientIndex { operation: String, message: String },

    /// Permanent index failure.
    ///
    /// Occurs when the index rejects a request outright (authentication,
    /// malformed document, schema rejection). Not retryable - recorded
    /// immediately as a per-record failure.
    #[error("permanent index error ({operation}): {message}")]
    PermanentIndex { operation: String, message: String },

    /// Invocation-level precondition failure.
    ///
    /// Occurs when the index endpoint cannot be resolved or credentials
    /// are missing/invalid. This is the only class that propagates past
    /// the replicator boundary instead of landing in the outcome.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl ReplicateError {
    /// Create a transient index error.
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientIndex {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a permanent index error.
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermanentIndex {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientIndex { .. } => true, // Timeouts and throttling are retryable
            Self::Validation(_) => false,        // Record is malformed at the source
            Self::PermanentIndex { .. } => false,
            Self::Precondition(_) => false,
        }
    }

    /// Check if this error aborts the whole invocation.
    ///
    /// Only precondition failures are fatal; per-record errors are
    /// absorbed into the batch outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}
