//! XChaCha20-Poly1305 AEAD (§4.1) and the encrypted-trust-signal construction.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::error::CryptoError;

/// 24-byte XChaCha20-Poly1305 nonce, per §4.1.
pub const NONCE_LEN: usize = 24;

/// Encrypt `plaintext` under `key`, generating a fresh random nonce.
/// Returns `(nonce, ciphertext)`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;
    Ok((nonce_bytes, ciphertext))
}

/// Decrypt a ciphertext produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [7u8; 32];
        let (nonce, ct) = encrypt(&key, b"trustee identity").unwrap();
        let pt = decrypt(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"trustee identity");
    }

    #[test]
    fn wrong_key_fails() {
        let key = [7u8; 32];
        let other = [8u8; 32];
        let (nonce, ct) = encrypt(&key, b"secret").unwrap();
        assert!(decrypt(&other, &nonce, &ct).is_err());
    }
}
