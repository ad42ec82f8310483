//! The tagged sum over gossip message variants (§4.5, §9 "Dynamic dispatch
//! on gossip type"). `SignedEnvelope` is parametric over this sum.

use serde::{Deserialize, Serialize};

use super::post::Post;
use super::reaction::Reaction;
use super::retraction::Retraction;
use super::trust_signal::{EncryptedTrustSignal, TrustSignal};

/// An encrypted direct message routed by public key rather than content
/// (GLOSSARY-adjacent; the Double-Ratchet/X3DH session that produces the
/// ciphertext is out of `clout-core`'s scope — it only forwards opaque
/// bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub to: String,
    pub from: String,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRequest {
    pub cid: String,
    pub requester: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaResponse {
    pub cid: String,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GossipMessage {
    Post(Post),
    Trust(TrustSignal),
    #[serde(rename = "trust-encrypted")]
    TrustEncrypted(EncryptedTrustSignal),
    Slide(Slide),
    Reaction(Reaction),
    #[serde(rename = "post-delete")]
    PostDelete(Retraction),
    #[serde(rename = "state-sync")]
    StateSync {
        #[serde(with = "b64")]
        state_bytes: Vec<u8>,
    },
    #[serde(rename = "state-request")]
    StateRequest,
    #[serde(rename = "media-request")]
    MediaRequest(MediaRequest),
    #[serde(rename = "media-response")]
    MediaResponse(MediaResponse),
}

impl GossipMessage {
    pub fn type_tag(&self) -> &'static str {
        match self {
            GossipMessage::Post(_) => "post",
            GossipMessage::Trust(_) => "trust",
            GossipMessage::TrustEncrypted(_) => "trust-encrypted",
            GossipMessage::Slide(_) => "slide",
            GossipMessage::Reaction(_) => "reaction",
            GossipMessage::PostDelete(_) => "post-delete",
            GossipMessage::StateSync { .. } => "state-sync",
            GossipMessage::StateRequest => "state-request",
            GossipMessage::MediaRequest(_) => "media-request",
            GossipMessage::MediaResponse(_) => "media-response",
        }
    }
}

/// Base64 (standard, padded) for binary fields embedded in JSON gossip
/// messages, matching the teacher's convention for ticket/media bytes
/// (§6 "Tickets serialized with bytes as base64").
mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}
