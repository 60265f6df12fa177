//! Mock SearchIndexRef for testing.
//!
//! Records all calls to upsert() and delete() for assertions, applies
//! writes to an in-memory document store, and supports failure injection:
//! per-key transient failure countdowns, always-permanent keys, and an
//! unreachable switch for precondition tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use stream_replicator::error::ReplicateError;
use stream_replicator::index::{BoxFuture, SearchIndexRef};
use stream_replicator::record::Document;
use tokio::sync::RwLock;

/// A recorded upsert() call.
#[derive(Debug, Clone)]
pub struct UpsertCall {
    pub key: String,
    pub document: Document,
}

/// A recorded delete() call.
#[derive(Debug, Clone)]
pub struct DeleteCall {
    pub key: String,
}

/// Mock implementation of SearchIndexRef that records all calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockSearchIndex::new();
///
/// // Configure failures
/// mock.fail_transient("hot-key", 2).await;
///
/// // Use in tests...
///
/// // Assert what was called
/// let upserts = mock.upserted().await;
/// assert_eq!(upserts.len(), 5);
/// ```
pub struct MockSearchIndex {
    /// Recorded upsert() calls (including failed attempts)
    upserts: RwLock<Vec<UpsertCall>>,
    /// Recorded delete() calls (including failed attempts)
    deletes: RwLock<Vec<DeleteCall>>,
    /// In-memory document store
    store: RwLock<HashMap<String, Document>>,
    /// Remaining transient failures per key
    transient_failures: RwLock<HashMap<String, usize>>,
    /// Keys that always fail permanently
    permanent_keys: RwLock<HashSet<String>>,
    /// Whether ping() succeeds
    reachable: AtomicBool,
}

impl Default for MockSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearchIndex {
    pub fn new() -> Self {
        Self {
            upserts: RwLock::new(Vec::new()),
            deletes: RwLock::new(Vec::new()),
            store: RwLock::new(HashMap::new()),
            transient_failures: RwLock::new(HashMap::new()),
            permanent_keys: RwLock::new(HashSet::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Make the next `times` calls touching `key` fail transiently.
    pub async fn fail_transient(&self, key: &str, times: usize) {
        self.transient_failures.write().await.insert(key.to_string(), times);
    }

    /// Make every call touching `key` fail permanently.
    pub async fn fail_permanent(&self, key: &str) {
        self.permanent_keys.write().await.insert(key.to_string());
    }

    /// Make ping() fail (precondition tests).
    pub fn set_unreachable(&self) {
        self.reachable.store(false, Ordering::SeqCst);
    }

    /// Seed a document directly into the store.
    pub async fn seed(&self, key: &str, document: Document) {
        self.store.write().await.insert(key.to_string(), document);
    }

    /// All recorded upsert calls, in call order.
    pub async fn upserted(&self) -> Vec<UpsertCall> {
        self.upserts.read().await.clone()
    }

    /// All recorded delete calls, in call order.
    pub async fn deleted(&self) -> Vec<DeleteCall> {
        self.deletes.read().await.clone()
    }

    /// Current document at `key`, if any.
    pub async fn document(&self, key: &str) -> Option<Document> {
        self.store.read().await.get(key).cloned()
    }

    /// Check if a document exists.
    pub async fn contains(&self, key: &str) -> bool {
        self.store.read().await.contains_key(key)
    }

    /// Number of documents in the store.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Apply failure scripts for a key. Shared by upsert and delete.
    async fn check_scripts(&self, key: &str, operation: &str) -> Result<(), ReplicateError> {
        if self.permanent_keys.read().await.contains(key) {
            return Err(ReplicateError::permanent(operation, "403 Forbidden"));
        }
        let mut transient = self.transient_failures.write().await;
        if let Some(remaining) = transient.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ReplicateError::transient(operation, "429 Too Many Requests"));
            }
        }
        Ok(())
    }
}

impl SearchIndexRef for MockSearchIndex {
    fn upsert(&self, key: String, document: Document) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.upserts.write().await.push(UpsertCall {
                key: key.clone(),
                document: document.clone(),
            });
            self.check_scripts(&key, "upsert").await?;
            self.store.write().await.insert(key, document);
            Ok(())
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.deletes.write().await.push(DeleteCall { key: key.clone() });
            self.check_scripts(&key, "remove").await?;
            Ok(self.store.write().await.remove(&key).is_some())
        })
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ReplicateError::transient("ping", "connection refused"))
            }
        })
    }
}
