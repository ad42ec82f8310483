//! Retraction entity (§3).

use clout_crypto::canonical;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::common::Attestation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetractionReason {
    Retracted,
    Edited,
    Mistake,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retraction {
    pub post_id: String,
    pub author: String,
    pub signature: String,
    #[serde(default)]
    pub attestation: Option<Attestation>,
    pub deleted_at: u64,
    pub reason: RetractionReason,
}

impl Retraction {
    pub fn key(&self) -> &str {
        &self.post_id
    }

    fn attestation_timestamp(&self) -> u64 {
        self.attestation.as_ref().map(|a| a.timestamp_ms).unwrap_or(0)
    }

    fn canonical_hash(&self) -> [u8; 32] {
        let value = json!({
            "post_id": self.post_id,
            "author": self.author,
            "deleted_at": self.deleted_at,
            "reason": self.reason,
        });
        canonical::hash_canonical(&value)
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        let hash_hex = canonical::to_hex(&self.canonical_hash());
        clout_crypto::identity::verify_hex(&self.author, hash_hex.as_bytes(), &self.signature)
    }

    /// Total order for compacting concurrent retractions of the same post
    /// (§4.4 "LWW by (deletedAt, attestation.timestamp), then signature-hex").
    pub fn compaction_key(&self) -> (u64, u64, &str) {
        (self.deleted_at, self.attestation_timestamp(), self.signature.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies() {
        let author = clout_crypto::Identity::generate();
        let mut retraction = Retraction {
            post_id: "ab".repeat(32),
            author: author.public_key_hex(),
            signature: String::new(),
            attestation: None,
            deleted_at: 1_700_000_000_000,
            reason: RetractionReason::Retracted,
        };
        let hash_hex = canonical::to_hex(&retraction.canonical_hash());
        retraction.signature = canonical::to_hex(&author.sign(hash_hex.as_bytes()));
        retraction.verify_signature().unwrap();
    }

    #[test]
    fn later_deleted_at_wins_compaction() {
        let older = Retraction {
            post_id: "ab".repeat(32),
            author: "aa".repeat(32),
            signature: "01".to_string(),
            attestation: None,
            deleted_at: 10,
            reason: RetractionReason::Retracted,
        };
        let newer = Retraction { deleted_at: 20, ..older.clone() };
        assert!(newer.compaction_key() > older.compaction_key());
    }
}
