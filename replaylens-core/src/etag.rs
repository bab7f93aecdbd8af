//! Content tags for conditional requests.
//!
//! `tag = hex(sha256("v{schema_version}" || canonical_json(artifact)))`.
//! Canonical JSON has object keys sorted at every depth, so two structurally
//! equal values hash identically whatever order their maps were filled in.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

/// Deterministic JSON encoding of `value`.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, IntegrityError> {
    let value = serde_json::to_value(value).map_err(|e| IntegrityError::Serialization {
        reason: e.to_string(),
    })?;
    serde_json::to_vec(&sort_keys(value)).map_err(|e| IntegrityError::Serialization {
        reason: e.to_string(),
    })
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Compute the content tag of `value` under `schema_version`.
pub fn compute_etag<T: Serialize + ?Sized>(
    value: &T,
    schema_version: i32,
) -> Result<String, IntegrityError> {
    let mut hasher = Sha256::new();
    hasher.update(format!("v{}", schema_version).as_bytes());
    hasher.update(canonical_bytes(value)?);
    Ok(hex::encode(hasher.finalize()))
}

/// `ETag` header value for a tag.
pub fn header_value(tag: &str) -> String {
    format!("\"{}\"", tag)
}

/// Strip an optional weak prefix and surrounding quotes.
pub fn normalize(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.trim_matches('"')
}

/// Whether an `If-None-Match` value matches the computed tag.
///
/// Accepts a single tag (quoted or bare, strong or weak), a comma-separated
/// list, or `*`. An empty header never matches.
pub fn is_not_modified(if_none_match: &str, computed: &str) -> bool {
    if computed.is_empty() {
        return false;
    }
    if_none_match
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| candidate == "*" || normalize(candidate) == computed)
}
