//! Fuzz target for wire-envelope decoding.
//!
//! Decoding must never panic on arbitrary input, and every decoded batch
//! must be fully accounted for: each record is either valid or fails
//! validation, never something in between.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stream_replicator::record::decode_stream_event;

fuzz_target!(|data: (&str, &str)| {
    let (payload, key_attribute) = data;

    // Should never panic, whatever the payload looks like
    if let Ok(batch) = decode_stream_event(payload, key_attribute) {
        for record in &batch {
            // Validation is total: it either passes or returns an error
            let _ = record.validate();
            // Remove records never carry an image
            if record.is_remove() {
                assert!(record.image.is_none());
            }
        }
    }
});
