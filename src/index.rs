// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Target-index integration trait.
//!
//! Defines the interface the replicator needs from a search index:
//! document-level upsert and delete keyed by a string identifier, plus a
//! reachability probe. The production implementation speaks HTTP
//! ([`HttpSearchIndex`](crate::opensearch::HttpSearchIndex)); tests use
//! recording mocks.
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_replicator::index::{SearchIndexRef, BoxFuture};
//! use stream_replicator::record::Document;
//!
//! struct MyIndex { /* ... */ }
//!
//! impl SearchIndexRef for MyIndex {
//!     fn upsert(&self, key: String, document: Document) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn delete(&self, key: String) -> BoxFuture<'_, bool> {
//!         Box::pin(async move { Ok(true) })
//!     }
//! }
//! ```

use crate::error::Result;
use crate::record::Document;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait defining what the replicator needs from the target index.
///
/// The index is the sole durable store: the replicator holds no state
/// between invocations. Implementations surface failures through the
/// crate error taxonomy so the retry policy can distinguish transient
/// from permanent rejections.
///
/// This trait allows testing with mocks and decouples the replicator
/// from the index transport.
pub trait SearchIndexRef: Send + Sync + 'static {
    /// Write `document` at `key`, fully replacing any prior document.
    ///
    /// Last-write-wins at the document level; no field-level merge.
    fn upsert(&self, key: String, document: Document) -> BoxFuture<'_, ()>;

    /// Delete the document at `key`.
    ///
    /// Deleting a non-existent key is not an error: implementations
    /// return `Ok(false)` when there was nothing to delete.
    fn delete(&self, key: String) -> BoxFuture<'_, bool>;

    /// Probe the index for reachability.
    ///
    /// Used as the invocation-level precondition check before batch work
    /// starts. Default implementation succeeds (always reachable).
    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// A no-op implementation for testing/standalone mode.
///
/// Logs operations but doesn't actually index anything.
#[derive(Clone)]
pub struct NoOpSearchIndex;

impl SearchIndexRef for NoOpSearchIndex {
    fn upsert(&self, key: String, document: Document) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!(
                key = %key,
                fields = document.len(),
                "NoOp: would upsert document"
            );
            Ok(())
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            tracing::debug!(key = %key, "NoOp: would delete document");
            Ok(true)
        })
    }
}
