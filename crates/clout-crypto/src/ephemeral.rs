//! Daily ephemeral signing keys derived from a master identity (§4.1).
//!
//! A participant may want to sign with a rotating key (e.g. so that losing
//! one day's key doesn't compromise the whole history) while still letting
//! verifiers bind the ephemeral key back to the long-lived master identity.
//! The binding is a master-signed proof over the ephemeral public key.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::identity::Identity;

/// Master-signed proof binding an ephemeral public key to the master identity.
pub type EphemeralKeyProof = [u8; 64];

/// Derive the day-`day` ephemeral signing key from `master`'s seed, and a
/// proof binding its public key to the master identity.
///
/// `day` is an integer day index (e.g. days since epoch) chosen by the
/// caller — the function is pure and deterministic in it, so the same
/// `(master, day)` always yields the same ephemeral key.
pub fn derive_daily_key(master: &Identity, day: u32) -> (SigningKey, EphemeralKeyProof) {
    let hk = Hkdf::<Sha256>::new(Some(b"clout-ephemeral-v1"), &master.seed());
    let mut seed = [0u8; 32];
    hk.expand(&day.to_be_bytes(), &mut seed)
        .expect("32-byte output is always valid for HKDF-SHA256");
    let ephemeral = SigningKey::from_bytes(&seed);
    let proof = master.sign(ephemeral.verifying_key().as_bytes());
    (ephemeral, proof)
}

/// Verify that `proof` is the master's signature over `ephemeral_public`.
pub fn verify_ephemeral_key_proof(
    ephemeral_public: &[u8; 32],
    proof: &[u8; 64],
    master_public: &[u8; 32],
) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(master_public).map_err(|_| CryptoError::MalformedSignature)?;
    let sig = ed25519_dalek::Signature::from_bytes(proof);
    vk.verify(ephemeral_public, &sig).map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let master = Identity::from_seed([3u8; 32]);
        let (k1, p1) = derive_daily_key(&master, 19_000);
        let (k2, p2) = derive_daily_key(&master, 19_000);
        assert_eq!(k1.to_bytes(), k2.to_bytes());
        assert_eq!(p1, p2);
    }

    #[test]
    fn different_days_yield_different_keys() {
        let master = Identity::from_seed([3u8; 32]);
        let (k1, _) = derive_daily_key(&master, 1);
        let (k2, _) = derive_daily_key(&master, 2);
        assert_ne!(k1.to_bytes(), k2.to_bytes());
    }

    #[test]
    fn proof_verifies_and_rejects_wrong_master() {
        let master = Identity::from_seed([5u8; 32]);
        let other = Identity::from_seed([6u8; 32]);
        let (ephemeral, proof) = derive_daily_key(&master, 42);
        let eph_pub = ephemeral.verifying_key().to_bytes();

        verify_ephemeral_key_proof(&eph_pub, &proof, &master.public_key()).unwrap();
        assert!(verify_ephemeral_key_proof(&eph_pub, &proof, &other.public_key()).is_err());
    }
}
