#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("signature verification failed")]
    BadSignature,
    #[error("malformed signature bytes")]
    MalformedSignature,
    #[error("AEAD encryption failed")]
    EncryptFailed,
    #[error("AEAD decryption failed")]
    DecryptFailed,
    #[error("key derivation failed")]
    KdfFailed,
}
