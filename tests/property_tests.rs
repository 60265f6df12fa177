//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stream_replicator::index::{BoxFuture, SearchIndexRef};
use stream_replicator::record::{
    decode_stream_event, flatten_attribute, ChangeOp, ChangeRecord, Document,
};
use stream_replicator::resilience::RetryConfig;
use stream_replicator::{ReplicatorConfig, StreamReplicator};

/// Index that accepts everything; used to isolate accounting behavior.
struct AlwaysOkIndex;

impl SearchIndexRef for AlwaysOkIndex {
    fn upsert(&self, _key: String, _document: Document) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, _key: String) -> BoxFuture<'_, bool> {
        Box::pin(async { Ok(true) })
    }
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

// =============================================================================
// Wire Decoding Properties
// =============================================================================

proptest! {
    /// Decoding never loses or invents records, whatever the event names
    /// and keys look like.
    #[test]
    fn decode_preserves_record_count(
        entries in prop::collection::vec(("\\PC*", "\\PC*"), 0..16)
    ) {
        let records: Vec<serde_json::Value> = entries
            .iter()
            .map(|(event_name, key)| {
                json!({
                    "eventName": event_name,
                    "dynamodb": {
                        "Keys": { "UserId": { "S": key } },
                        "NewImage": { "UserId": { "S": key } }
                    }
                })
            })
            .collect();
        let payload = json!({ "Records": records }).to_string();

        let batch = decode_stream_event(&payload, "UserId").unwrap();
        prop_assert_eq!(batch.len(), entries.len());

        for (record, (event_name, key)) in batch.iter().zip(&entries) {
            prop_assert_eq!(&record.key, key);
            let expected_op = if event_name.eq_ignore_ascii_case("REMOVE") {
                ChangeOp::Remove
            } else {
                ChangeOp::Upsert
            };
            prop_assert_eq!(record.op, expected_op);
        }
    }

    /// Attribute flattening never panics on arbitrary numeric payloads,
    /// and parseable integers become JSON numbers.
    #[test]
    fn flatten_numeric_attribute_total(n in "\\PC*") {
        let flattened = flatten_attribute(json!({ "N": &n }));
        if let Ok(i) = n.parse::<i64>() {
            prop_assert_eq!(flattened, json!(i));
        } else {
            // Whatever it was, it must survive as something non-panicking
            prop_assert!(flattened.is_number() || flattened.is_string());
        }
    }

    /// Flattening arbitrary (non-attribute) JSON objects is the identity.
    #[test]
    fn flatten_multi_entry_objects_passthrough(
        a in "\\PC*",
        b in "\\PC*",
    ) {
        // Two entries means it cannot be a typed attribute value
        let raw = json!({ "first": a, "second": b });
        prop_assert_eq!(flatten_attribute(raw.clone()), raw);
    }
}

// =============================================================================
// Backoff Properties
// =============================================================================

proptest! {
    /// Backoff delays never exceed the configured ceiling.
    #[test]
    fn backoff_respects_ceiling(attempt in 0usize..64) {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(5),
        };
        prop_assert!(config.delay_for_attempt(attempt) <= config.max_delay);
    }

    /// Backoff is non-decreasing in the attempt number.
    #[test]
    fn backoff_monotone(attempt in 1usize..32) {
        let config = RetryConfig::default();
        prop_assert!(
            config.delay_for_attempt(attempt) <= config.delay_for_attempt(attempt + 1)
        );
    }
}

// =============================================================================
// Accounting Properties
// =============================================================================

proptest! {
    /// For all batches: processed + failures == batch length, and the
    /// failure count equals the number of invalid records when the index
    /// accepts everything.
    #[test]
    fn outcome_accounts_for_all_records(
        specs in prop::collection::vec(("\\PC*", any::<bool>()), 0..32)
    ) {
        let batch: Vec<ChangeRecord> = specs
            .iter()
            .map(|(key, is_upsert)| {
                if *is_upsert {
                    let mut image = Document::new();
                    image.insert("v".to_string(), json!(1));
                    ChangeRecord::upsert(key.clone(), image)
                } else {
                    ChangeRecord::remove(key.clone())
                }
            })
            .collect();
        let total = batch.len();
        let invalid = specs.iter().filter(|(key, _)| key.is_empty()).count();

        let outcome = run(async move {
            let config = ReplicatorConfig::for_testing("http://localhost:9200");
            let replicator = StreamReplicator::new(Arc::new(AlwaysOkIndex), &config).unwrap();
            replicator.replicate(batch).await.unwrap()
        });

        prop_assert_eq!(outcome.processed_count + outcome.failures.len(), total);
        prop_assert_eq!(outcome.failures.len(), invalid);
    }
}
