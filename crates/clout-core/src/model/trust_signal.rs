//! TrustSignal and EncryptedTrustSignal (§3, §4.1, §6).

use clout_crypto::canonical;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::common::Attestation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSignal {
    pub truster: String,
    pub trustee: String,
    pub weight: f64,
    #[serde(default)]
    pub revoked: bool,
    pub timestamp: u64,
    #[serde(default)]
    pub attestation: Option<Attestation>,
    pub signature: String,
}

impl TrustSignal {
    /// `{truster, trustee, weight, revoked?, timestamp}` hashed per §4.1;
    /// `revoked` is omitted from the payload when `false` so that
    /// pre-revocation signatures still verify against an unrevoked record
    /// (§6 "revoked?").
    pub fn canonical_hash(&self) -> [u8; 32] {
        let value = json!({
            "truster": self.truster,
            "trustee": self.trustee,
            "weight": self.weight,
            "revoked": if self.revoked { serde_json::Value::Bool(true) } else { serde_json::Value::Null },
            "timestamp": self.timestamp,
        });
        canonical::hash_canonical(&value)
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        let hash_hex = canonical::to_hex(&self.canonical_hash());
        clout_crypto::identity::verify_hex(&self.truster, hash_hex.as_bytes(), &self.signature)
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.truster, self.trustee)
    }

    /// Total order used to compact concurrent trust signals at the same
    /// key (§4.4 step d): by attestation timestamp, then `revoked=true`
    /// wins a tie, then signature-hex lexicographic. Ordering on the
    /// notary-issued attestation rather than the truster-declared
    /// `timestamp` keeps a truster from winning LWW by back/forward-dating
    /// their own signal.
    pub fn compaction_key(&self) -> (u64, bool, &str) {
        let attested_at = self.attestation.as_ref().map(|a| a.timestamp_ms).unwrap_or(0);
        (attested_at, self.revoked, self.signature.as_str())
    }
}

/// Same lifecycle as `TrustSignal`; the trustee identity is hidden from
/// everyone but the trustee (§3, `clout_crypto::encrypted_trust`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedTrustSignal {
    pub truster: String,
    /// Hex of `SHA-256(trusteeHex ‖ nonceHex)`.
    pub trustee_commitment: String,
    pub ephemeral_public: String,
    pub nonce: String,
    pub ciphertext: String,
    pub weight: f64,
    #[serde(default)]
    pub revoked: bool,
    pub timestamp: u64,
    #[serde(default)]
    pub attestation: Option<Attestation>,
    /// Signature over `(commitment ‖ weight ‖ timestamp)`.
    pub signature: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl EncryptedTrustSignal {
    fn signed_payload(&self) -> Vec<u8> {
        format!("{}{}{}", self.trustee_commitment, self.weight, self.timestamp).into_bytes()
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        clout_crypto::identity::verify_hex(&self.truster, &self.signed_payload(), &self.signature)
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.truster, self.trustee_commitment)
    }

    /// Same total order as a plaintext [`TrustSignal`] (§4.4 step d):
    /// attestation timestamp, then `revoked=true` wins a tie, then
    /// signature-hex.
    pub fn compaction_key(&self) -> (u64, bool, &str) {
        let attested_at = self.attestation.as_ref().map(|a| a.timestamp_ms).unwrap_or(0);
        (attested_at, self.revoked, self.signature.as_str())
    }

    /// Attempt to recognize this signal as one directed at `our_public`,
    /// returning the sealed-trustee view if the nonce/ciphertext decode.
    pub fn try_open(
        &self,
        our_dh_secret: [u8; 32],
        our_public: &[u8; 32],
    ) -> Result<Option<String>, clout_crypto::CryptoError> {
        let ephemeral_public = canonical::from_hex(&self.ephemeral_public).map_err(|_| clout_crypto::CryptoError::InvalidHex)?;
        let nonce = canonical::from_hex(&self.nonce).map_err(|_| clout_crypto::CryptoError::InvalidHex)?;
        let ciphertext = canonical::from_hex(&self.ciphertext).map_err(|_| clout_crypto::CryptoError::InvalidHex)?;
        if ephemeral_public.len() != 32 || nonce.len() != 24 {
            return Err(clout_crypto::CryptoError::InvalidLength { expected: 32, got: ephemeral_public.len() });
        }
        let mut ephemeral_arr = [0u8; 32];
        ephemeral_arr.copy_from_slice(&ephemeral_public);
        let mut nonce_arr = [0u8; 24];
        nonce_arr.copy_from_slice(&nonce);
        let sealed = clout_crypto::encrypted_trust::SealedTrustee {
            ephemeral_public: ephemeral_arr,
            nonce: nonce_arr,
            ciphertext,
            commitment: {
                let bytes = canonical::from_hex(&self.trustee_commitment).map_err(|_| clout_crypto::CryptoError::InvalidHex)?;
                if bytes.len() != 32 {
                    return Err(clout_crypto::CryptoError::InvalidLength { expected: 32, got: bytes.len() });
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                arr
            },
        };
        Ok(clout_crypto::encrypted_trust::try_open(&sealed, our_dh_secret, our_public))
    }
}
