//! Notary port (§6): "this hash existed at this time".

use clout_crypto::canonical;
use clout_crypto::Identity;

use crate::model::{normalize_to_millis, Attestation};

pub trait NotaryPort: Send + Sync {
    fn timestamp(&self, hash_bytes: &[u8]) -> Result<Attestation, crate::CoreError>;
    fn verify(&self, attestation: &Attestation) -> bool;
}

/// Single-witness ed25519 notary. Grounded in `policy/engine.rs`'s
/// "build the unsigned record, sign its canonical form" pattern, adapted
/// from an HMAC witness key to our ed25519 identity stack.
pub struct MockNotary {
    identity: Identity,
}

impl MockNotary {
    pub fn new() -> Self {
        Self { identity: Identity::generate() }
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn witness_id(&self) -> String {
        self.identity.public_key_hex()
    }

    fn signing_payload(hash_hex: &str, timestamp_ms: u64) -> Vec<u8> {
        format!("{hash_hex}:{timestamp_ms}").into_bytes()
    }
}

impl Default for MockNotary {
    fn default() -> Self {
        Self::new()
    }
}

impl NotaryPort for MockNotary {
    fn timestamp(&self, hash_bytes: &[u8]) -> Result<Attestation, crate::CoreError> {
        let hash_hex = canonical::to_hex(hash_bytes);
        let timestamp_ms = normalize_to_millis(current_unix_seconds());
        let signature = self.identity.sign(&Self::signing_payload(&hash_hex, timestamp_ms));
        Ok(Attestation {
            hash: hash_hex,
            timestamp_ms,
            signatures: vec![canonical::to_hex(&signature)],
            witness_ids: vec![self.witness_id()],
        })
    }

    fn verify(&self, attestation: &Attestation) -> bool {
        let Some(signature) = attestation.signatures.first() else { return false };
        let Some(witness) = attestation.witness_ids.first() else { return false };
        if witness != &self.witness_id() {
            return false;
        }
        clout_crypto::identity::verify_hex(
            witness,
            &Self::signing_payload(&attestation.hash, attestation.timestamp_ms),
            signature,
        )
        .is_ok()
    }
}

fn current_unix_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attestation_round_trips() {
        let notary = MockNotary::new();
        let attestation = notary.timestamp(b"some hash bytes").unwrap();
        assert!(notary.verify(&attestation));
    }

    #[test]
    fn tampered_attestation_fails() {
        let notary = MockNotary::new();
        let mut attestation = notary.timestamp(b"some hash bytes").unwrap();
        attestation.timestamp_ms += 1;
        assert!(!notary.verify(&attestation));
    }

    #[test]
    fn attestation_from_a_different_witness_fails() {
        let notary = MockNotary::new();
        let other = MockNotary::new();
        let attestation = notary.timestamp(b"hash").unwrap();
        assert!(!other.verify(&attestation));
    }

    #[test]
    fn timestamp_is_normalized_to_millis() {
        let notary = MockNotary::new();
        let attestation = notary.timestamp(b"hash").unwrap();
        assert!(attestation.timestamp_ms > crate::model::TIMESTAMP_NORMALIZATION_SENTINEL);
    }
}
