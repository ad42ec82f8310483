//! SignedEnvelope: the wrapper every gossip message travels in (§3, §6).

use clout_crypto::canonical;
use serde::{Deserialize, Serialize};

use super::gossip::GossipMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub message: GossipMessage,
    pub sender_public_key: String,
    pub signature: String,
    pub nonce: String,
    pub expires_at: u64,
}

impl SignedEnvelope {
    /// UTF-8 bytes of `JSON.stringify({message, nonce, expiresAt})` with
    /// keys in exactly that order (§6). `serde_json::Map`'s default
    /// storage is a `BTreeMap` (alphabetical) unless the crate's
    /// `preserve_order` feature is on, so the three fields are assembled
    /// by hand here rather than through a derived `Serialize` impl, to
    /// keep the signed bytes independent of that feature flag. The nested
    /// `message` value is rendered through our own canonical encoder
    /// (sorted keys) for determinism — the source format doesn't pin
    /// this down further.
    pub fn signing_payload(message: &GossipMessage, nonce: &str, expires_at: u64) -> Vec<u8> {
        let message_value = serde_json::to_value(message).expect("gossip messages always serialize");
        let message_json = canonical::canonical_string(&message_value);
        let nonce_json = serde_json::to_string(nonce).expect("strings always serialize");
        format!(r#"{{"message":{message_json},"nonce":{nonce_json},"expiresAt":{expires_at}}}"#).into_bytes()
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        let payload = Self::signing_payload(&self.message, &self.nonce, self.expires_at);
        clout_crypto::identity::verify_hex(&self.sender_public_key, &payload, &self.signature)
    }

    pub fn is_unexpired(&self, now_ms: u64) -> bool {
        now_ms <= self.expires_at
    }

    pub fn replay_key(&self) -> String {
        format!("{}:{}", self.sender_public_key, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_and_rejects_tamper() {
        let sender = clout_crypto::Identity::generate();
        let message = GossipMessage::StateRequest;
        let nonce = "11".repeat(32);
        let expires_at = 1_700_000_060_000;

        let payload = SignedEnvelope::signing_payload(&message, &nonce, expires_at);
        let signature = canonical::to_hex(&sender.sign(&payload));

        let envelope = SignedEnvelope {
            message,
            sender_public_key: sender.public_key_hex(),
            signature,
            nonce,
            expires_at,
        };
        envelope.verify_signature().unwrap();

        let mut tampered = envelope.clone();
        tampered.expires_at += 1;
        assert!(tampered.verify_signature().is_err());
    }

    #[test]
    fn unexpired_check() {
        let envelope = SignedEnvelope {
            message: GossipMessage::StateRequest,
            sender_public_key: "aa".repeat(32),
            signature: "00".repeat(64),
            nonce: "11".repeat(32),
            expires_at: 1000,
        };
        assert!(envelope.is_unexpired(1000));
        assert!(!envelope.is_unexpired(1001));
    }
}
