// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-record data model and wire-event decoding.
//!
//! The upstream CDC source delivers batches as JSON stream events:
//!
//! ```json
//! {
//!   "Records": [
//!     {
//!       "eventName": "INSERT",
//!       "dynamodb": {
//!         "Keys": { "UserId": { "S": "u1" } },
//!         "NewImage": { "UserId": { "S": "u1" }, "Score": { "N": "10" } }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! [`decode_stream_event`] turns that envelope into a [`ReplicationBatch`].
//! Decoding is lenient at the record level: a record with a missing or
//! non-string key attribute decodes to a [`ChangeRecord`] with an empty key,
//! which the replicator then reports as a validation failure. Only an
//! envelope that is not valid JSON at all fails the decode.
//!
//! # Attribute Values
//!
//! `Keys` and `NewImage` use typed attribute values (`{"S": "..."}`,
//! `{"N": "..."}`, `BOOL`, `NULL`, `L`, `M`, set types). These are flattened
//! into plain JSON before indexing so the search index sees ordinary
//! documents. Numeric strings become JSON numbers when the conversion is
//! lossless, otherwise they stay strings.

use crate::error::{ReplicateError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Event name that maps to a delete. Anything else is treated as a write,
/// matching the upstream source's INSERT/MODIFY/REMOVE event names.
const REMOVE_EVENT: &str = "REMOVE";

/// A flattened JSON document, as written to the index.
pub type Document = Map<String, Value>;

/// An ordered batch of change records, as delivered by the upstream source.
///
/// Order within a batch reflects source commit order for a given key,
/// but not globally.
pub type ReplicationBatch = Vec<ChangeRecord>;

/// Change operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Upsert,
    Remove,
}

impl ChangeOp {
    /// Map a stream event name to an operation.
    ///
    /// `REMOVE` deletes; `INSERT`, `MODIFY`, and anything unrecognized
    /// write the new image.
    pub fn from_event_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(REMOVE_EVENT) {
            ChangeOp::Remove
        } else {
            ChangeOp::Upsert
        }
    }
}

/// One CDC event: a document-level upsert or delete keyed by a string id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Operation type.
    pub op: ChangeOp,
    /// Primary identifier, stable across operation type.
    pub key: String,
    /// Full document image. Present for upserts, ignored for removes.
    pub image: Option<Document>,
}

impl ChangeRecord {
    /// Create an upsert record.
    pub fn upsert(key: impl Into<String>, image: Document) -> Self {
        Self {
            op: ChangeOp::Upsert,
            key: key.into(),
            image: Some(image),
        }
    }

    /// Create a remove record.
    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Remove,
            key: key.into(),
            image: None,
        }
    }

    /// Check if this is an upsert.
    pub fn is_upsert(&self) -> bool {
        self.op == ChangeOp::Upsert
    }

    /// Check if this is a remove.
    pub fn is_remove(&self) -> bool {
        self.op == ChangeOp::Remove
    }

    /// Validate the record before applying it.
    ///
    /// The key must be non-empty regardless of operation type, and an
    /// upsert must carry an image. Validation lives here rather than in
    /// the constructors so that malformed wire records surface as
    /// per-record failures, not decode aborts.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(ReplicateError::Validation("record has empty key".to_string()));
        }
        if self.is_upsert() && self.image.is_none() {
            return Err(ReplicateError::Validation(format!(
                "upsert record {} has no image",
                self.key
            )));
        }
        Ok(())
    }
}

// Wire-side deserialization targets. Field names follow the stream event
// envelope, so serde renames are explicit rather than rule-based.

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "Records", default)]
    records: Vec<StreamRecord>,
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    #[serde(rename = "dynamodb")]
    change: Option<ChangePayload>,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    #[serde(rename = "Keys")]
    keys: Option<Map<String, Value>>,
    #[serde(rename = "NewImage")]
    new_image: Option<Map<String, Value>>,
}

/// Decode a JSON stream-event envelope into a batch of change records.
///
/// `key_attribute` names the attribute inside `Keys` whose value becomes
/// the document id (typically the table hash key, e.g. `"UserId"`).
///
/// Records that are structurally present but malformed (missing key
/// attribute, non-scalar key) decode to records with an empty key so the
/// replicator can account for them as validation failures. Returns an
/// error only when the envelope itself is not valid JSON.
pub fn decode_stream_event(payload: &str, key_attribute: &str) -> Result<ReplicationBatch> {
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|e| ReplicateError::Validation(format!("stream event decode: {e}")))?;

    let batch = event
        .records
        .into_iter()
        .map(|record| decode_record(record, key_attribute))
        .collect();
    Ok(batch)
}

fn decode_record(record: StreamRecord, key_attribute: &str) -> ChangeRecord {
    let op = ChangeOp::from_event_name(&record.event_name);

    let (keys, new_image) = match record.change {
        Some(change) => (change.keys, change.new_image),
        None => (None, None),
    };

    let key = keys
        .as_ref()
        .and_then(|keys| keys.get(key_attribute))
        .map(|attr| key_string(flatten_attribute(attr.clone())))
        .unwrap_or_default();

    match op {
        ChangeOp::Remove => ChangeRecord {
            op,
            key,
            image: None,
        },
        ChangeOp::Upsert => ChangeRecord {
            op,
            key,
            image: new_image.map(flatten_image),
        },
    }
}

/// Render a flattened key attribute as a document id.
///
/// Keys are scalar (string, number, or binary-as-base64); anything else
/// flattens to an empty id and fails validation downstream.
fn key_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Flatten a typed attribute-value map into plain JSON.
///
/// Unrecognized shapes pass through unchanged, so a source that starts
/// emitting new attribute types degrades to verbatim JSON instead of
/// dropping fields.
pub fn flatten_attribute(attr: Value) -> Value {
    let Value::Object(map) = attr else {
        return attr;
    };
    if map.len() != 1 {
        return Value::Object(map);
    }
    // Single-entry {type: payload} object; the key is the type tag.
    let mut entries = map.into_iter();
    let Some((tag, payload)) = entries.next() else {
        return Value::Object(Map::new());
    };
    match (tag.as_str(), payload) {
        ("S", Value::String(s)) => Value::String(s),
        ("N", Value::String(n)) => parse_number(&n),
        ("BOOL", Value::Bool(b)) => Value::Bool(b),
        ("NULL", _) => Value::Null,
        // Binary payloads arrive base64-encoded; kept as-is.
        ("B", Value::String(b)) => Value::String(b),
        ("L", Value::Array(items)) => Value::Array(items.into_iter().map(flatten_attribute).collect()),
        ("M", Value::Object(inner)) => Value::Object(flatten_image(inner)),
        ("SS", Value::Array(items)) | ("BS", Value::Array(items)) => Value::Array(items),
        ("NS", Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(n) => parse_number(&n),
                    other => other,
                })
                .collect(),
        ),
        (_, payload) => {
            // Not a recognized tag; pass through untouched.
            let mut map = Map::new();
            map.insert(tag.clone(), payload);
            Value::Object(map)
        }
    }
}

/// Flatten a full attribute-value image into a document.
pub fn flatten_image(image: Map<String, Value>) -> Document {
    image
        .into_iter()
        .map(|(field, attr)| (field, flatten_attribute(attr)))
        .collect()
}

/// Parse a numeric attribute payload, keeping the string form when the
/// value does not round-trip through a JSON number.
fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return Value::from(u);
    }
    if let Ok(f) = n.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(n.to_string())
}
