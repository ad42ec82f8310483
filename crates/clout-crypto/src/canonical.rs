//! Canonical JSON encoding and hashing (§4.1).
//!
//! Every structured value that gets signed or hashed in the protocol goes
//! through the same canonicalization: object keys sorted lexicographically,
//! no insignificant whitespace, byte fields hex-encoded by the caller before
//! they reach here, and `null`/absent fields dropped entirely so that two
//! logically-equal records with different optional-field presence hash the
//! same way.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Recursively sort object keys and drop `null` values.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().filter(|(_, v)| !v.is_null()).collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Render a value as its canonical compact JSON string.
pub fn canonical_string(value: &Value) -> String {
    // serde_json's Map is insertion-ordered; canonicalize() already sorted
    // keys, so the compact writer below emits them in that order.
    serde_json::to_string(&canonicalize(value)).expect("canonical values are always serializable")
}

/// SHA-256 over raw bytes.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 over the canonical encoding of a structured value (§4.1
/// "Hash-over-object").
pub fn hash_canonical(value: &Value) -> [u8; 32] {
    sha256(canonical_string(value).as_bytes())
}

/// Hex-encode bytes (lowercase), the wire convention for 32-byte keys.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode lowercase (or mixed-case) hex into bytes.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2, "c": {"y": 1, "x": 2}});
        let b = json!({"a": 2, "c": {"x": 2, "y": 1}, "b": 1});
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn null_fields_are_omitted() {
        let a = json!({"a": 1, "b": null});
        let b = json!({"a": 1});
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn canonical_string_has_no_insignificant_whitespace() {
        let v = json!({"a": 1, "b": [1, 2, 3]});
        let s = canonical_string(&v);
        assert!(!s.contains(' '));
        assert_eq!(s, r#"{"a":1,"b":[1,2,3]}"#);
    }

    #[test]
    fn different_structured_values_hash_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(hash_canonical(&a), hash_canonical(&b));
    }
}
