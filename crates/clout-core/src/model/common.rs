//! Small shared value types used across the data model (§3).

use serde::{Deserialize, Serialize};

/// A notary-issued proof that a hash existed at a point in time
/// (§6 Notary port, GLOSSARY "Attestation").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub hash: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub witness_ids: Vec<String>,
}

/// Timestamps above this are assumed to already be in milliseconds; values
/// at or below it are assumed to be seconds and get multiplied by 1000
/// (§6 "values above a large sentinel are assumed already in milliseconds").
pub const TIMESTAMP_NORMALIZATION_SENTINEL: u64 = 10_000_000_000;

/// Normalize a notary-returned timestamp to milliseconds.
pub fn normalize_to_millis(ts: u64) -> u64 {
    if ts > TIMESTAMP_NORMALIZATION_SENTINEL {
        ts
    } else {
        ts.saturating_mul(1000)
    }
}
