//! Fuzz target for attribute-value flattening.
//!
//! Flattening arbitrary JSON must never panic and must be idempotent for
//! values that are already flat (strings, numbers, booleans).

#![no_main]

use libfuzzer_sys::fuzz_target;
use stream_replicator::record::flatten_attribute;

fuzz_target!(|data: &str| {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return;
    };

    // Should never panic
    let flattened = flatten_attribute(value);

    // Already-flat values are fixed points
    if flattened.is_string() || flattened.is_number() || flattened.is_boolean() {
        assert_eq!(flatten_attribute(flattened.clone()), flattened);
    }
});
