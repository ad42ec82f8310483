//! Reaction entity (§3).

use clout_crypto::canonical;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::common::Attestation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub reactor: String,
    pub post_id: String,
    pub emoji: String,
    pub signature: String,
    #[serde(default)]
    pub attestation: Option<Attestation>,
    #[serde(default)]
    pub removed: bool,
}

impl Reaction {
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.reactor, self.post_id, self.emoji)
    }

    fn timestamp(&self) -> u64 {
        self.attestation.as_ref().map(|a| a.timestamp_ms).unwrap_or(0)
    }

    fn canonical_hash(&self) -> [u8; 32] {
        let value = json!({
            "reactor": self.reactor,
            "post_id": self.post_id,
            "emoji": self.emoji,
            "removed": self.removed,
            "timestamp": self.timestamp(),
        });
        canonical::hash_canonical(&value)
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        let hash_hex = canonical::to_hex(&self.canonical_hash());
        clout_crypto::identity::verify_hex(&self.reactor, hash_hex.as_bytes(), &self.signature)
    }

    /// Total order used to compact concurrent reactions at the same key
    /// (§3, §4.4): by timestamp, then `removed=true` wins a tie, then
    /// signature-hex lexicographic.
    pub fn compaction_key(&self) -> (u64, bool, &str) {
        (self.timestamp(), self.removed, self.signature.as_str())
    }
}
