//! Ed25519 signing identity — the long-lived per-participant keypair (§3 Identity).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::CryptoError;

/// A participant's long-lived signing identity.
///
/// The private key never leaves the holder (§5 Shared-resource policy);
/// `Identity` is deliberately not `Clone` so a caller can't accidentally
/// fan it out across tasks — pass `Arc<Identity>` if shared access is
/// needed.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The 32-byte secret seed, for persistence. Callers must keep this
    /// off-disk-in-plaintext where possible; the protocol core does not
    /// prescribe a storage format (§1 Non-goals).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public key, as used throughout the wire protocol: 32 raw bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The public key rendered as 64-lowercase-hex (§3 global convention).
    pub fn public_key_hex(&self) -> String {
        crate::canonical::to_hex(&self.public_key())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign a message, returning 64 raw signature bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Parse a 64-hex public key into a verifying key.
pub fn parse_public_key_hex(hex_key: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = crate::canonical::from_hex(hex_key).map_err(|_| CryptoError::InvalidHex)?;
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidLength { expected: 32, got: bytes.len() });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::MalformedSignature)
}

/// Verify a 64-byte raw signature against a 32-byte public key.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::MalformedSignature)?;
    if signature.len() != 64 {
        return Err(CryptoError::MalformedSignature);
    }
    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(signature);
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify(message, &sig).map_err(|_| CryptoError::BadSignature)
}

/// Verify a signature whose public key and signature are both hex strings.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<(), CryptoError> {
    let vk = parse_public_key_hex(public_key_hex)?;
    let sig_bytes = crate::canonical::from_hex(signature_hex).map_err(|_| CryptoError::InvalidHex)?;
    if sig_bytes.len() != 64 {
        return Err(CryptoError::MalformedSignature);
    }
    let mut arr = [0u8; 64];
    arr.copy_from_slice(&sig_bytes);
    let sig = Signature::from_bytes(&arr);
    vk.verify(message, &sig).map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let id = Identity::generate();
        let msg = b"hello clout";
        let sig = id.sign(msg);
        verify(&id.public_key(), msg, &sig).unwrap();
    }

    #[test]
    fn tampered_message_fails() {
        let id = Identity::generate();
        let sig = id.sign(b"hello");
        assert!(verify(&id.public_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn seed_roundtrip_preserves_identity() {
        let id = Identity::generate();
        let seed = id.seed();
        let restored = Identity::from_seed(seed);
        assert_eq!(id.public_key(), restored.public_key());
    }

    #[test]
    fn hex_key_parsing() {
        let id = Identity::generate();
        let hex_key = id.public_key_hex();
        assert_eq!(hex_key.len(), 64);
        let sig = id.sign(b"msg");
        verify_hex(&hex_key, b"msg", &crate::canonical::to_hex(&sig)).unwrap();
    }
}
