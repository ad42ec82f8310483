//! X25519 ECDH, used for the encrypted-trust-signal AEAD key (§4.1).

use x25519_dalek::{PublicKey, StaticSecret};

/// An ephemeral or static X25519 keypair.
pub struct DhKeyPair {
    pub secret: StaticSecret,
    pub public: PublicKey,
}

impl DhKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Compute the shared secret with a peer's public key.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let theirs = PublicKey::from(*their_public);
        self.secret.diffie_hellman(&theirs).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_agrees() {
        let a = DhKeyPair::generate();
        let b = DhKeyPair::generate();
        let sa = a.diffie_hellman(b.public.as_bytes());
        let sb = b.diffie_hellman(a.public.as_bytes());
        assert_eq!(sa, sb);
    }
}
