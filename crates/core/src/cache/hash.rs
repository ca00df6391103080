//! Response cache key generation.

use super::store::glob_escape;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex digits in the hash part of a response key.
const HASH_LEN: usize = 64;

/// Compute the cache key of a response for `params` against `resource_uri`.
///
/// Objects are serialized with sorted field order, arrays as given, and any
/// scalar is wrapped into a one-element array. The resource identifier is
/// appended verbatim after `_` so identical parameters never collide across
/// resources.
pub fn compute_response_key(params: &Value, resource_uri: &str) -> String {
    let normalized = match params {
        Value::Object(_) | Value::Array(_) => params.clone(),
        scalar => Value::Array(vec![scalar.clone()]),
    };

    // serde_json objects are BTreeMap-backed, so field order is already sorted
    let mut hasher = Sha256::new();
    hasher.update(normalized.to_string().as_bytes());
    format!("{}_{resource_uri}", hex::encode(hasher.finalize()))
}

/// Glob matching every response key computed against `resource_uri`.
///
/// Only keys of the exact `<hash>_<uri>` shape match, so snapshot aliases
/// are never caught by it.
pub fn response_key_pattern(resource_uri: &str) -> String {
    format!("{}_{}", "[0-9a-f]".repeat(HASH_LEN), glob_escape(resource_uri))
}
