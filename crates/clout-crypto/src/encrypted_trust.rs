//! Encrypted-trust-signal construction (§4.1, §3 `EncryptedTrustSignal`).
//!
//! The trustee's identity is hidden from everyone except the trustee
//! themselves: the truster generates a fresh ephemeral X25519 keypair,
//! ECDH's it with the trustee's public key to derive an AEAD key, and
//! encrypts the trustee's hex public key under it. A commitment
//! (`SHA-256(trusteeHex ‖ nonceHex)`) lets the trustee recognize "this one's
//! mine" without anyone else learning the trustee from the commitment alone.

use crate::aead::{self, NONCE_LEN};
use crate::canonical;
use crate::ecdh::DhKeyPair;
use crate::error::CryptoError;

/// Output of [`seal`]: everything that goes on the wire for the encrypted
/// trustee field of an `EncryptedTrustSignal`.
pub struct SealedTrustee {
    pub ephemeral_public: [u8; 32],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub commitment: [u8; 32],
}

/// Commitment = SHA-256(trusteeHex ‖ nonceHex).
pub fn commitment(trustee_public: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> [u8; 32] {
    let trustee_hex = canonical::to_hex(trustee_public);
    let nonce_hex = canonical::to_hex(nonce);
    canonical::sha256(format!("{trustee_hex}{nonce_hex}").as_bytes())
}

/// Truster seals the trustee's identity so only the trustee can open it.
pub fn seal(trustee_public: &[u8; 32]) -> Result<SealedTrustee, CryptoError> {
    let ephemeral = DhKeyPair::generate();
    let key = ephemeral.diffie_hellman(trustee_public);
    let trustee_hex = canonical::to_hex(trustee_public);
    let (nonce, ciphertext) = aead::encrypt(&key, trustee_hex.as_bytes())?;
    let commitment = commitment(trustee_public, &nonce);
    Ok(SealedTrustee {
        ephemeral_public: *ephemeral.public.as_bytes(),
        nonce,
        ciphertext,
        commitment,
    })
}

/// The trustee attempts to open a sealed trustee field with their own
/// static X25519 secret. Returns the trustee public key hex if this
/// signal was indeed meant for them (commitment matches), `None` otherwise.
pub fn try_open(
    sealed: &SealedTrustee,
    our_dh_secret: [u8; 32],
    our_public: &[u8; 32],
) -> Option<String> {
    let our_keys = DhKeyPair::from_bytes(our_dh_secret);
    let key = our_keys.diffie_hellman(&sealed.ephemeral_public);
    let plaintext = aead::decrypt(&key, &sealed.nonce, &sealed.ciphertext).ok()?;
    let trustee_hex = String::from_utf8(plaintext).ok()?;
    let expected_commitment = commitment(our_public, &sealed.nonce);
    if expected_commitment != sealed.commitment {
        return None;
    }
    if trustee_hex != canonical::to_hex(our_public) {
        return None;
    }
    Some(trustee_hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdh::DhKeyPair;

    #[test]
    fn trustee_can_open_their_own_signal() {
        let trustee_keys = DhKeyPair::generate();
        let trustee_pub = *trustee_keys.public.as_bytes();

        let sealed = seal(&trustee_pub).unwrap();
        let opened = try_open(&sealed, trustee_keys.secret.to_bytes(), &trustee_pub);
        assert_eq!(opened, Some(canonical::to_hex(&trustee_pub)));
    }

    #[test]
    fn stranger_cannot_open() {
        let trustee_keys = DhKeyPair::generate();
        let trustee_pub = *trustee_keys.public.as_bytes();
        let stranger = DhKeyPair::generate();

        let sealed = seal(&trustee_pub).unwrap();
        let opened = try_open(&sealed, stranger.secret.to_bytes(), stranger.public.as_bytes());
        assert_eq!(opened, None);
    }
}
