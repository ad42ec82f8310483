//! Post entity and its canonical signature payload (§3, §6).

use clout_crypto::canonical;
use serde::{Deserialize, Serialize};

use super::common::Attestation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub cid: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemeralKeyAttachment {
    pub public_key: String,
    pub proof: String,
}

/// One year, in milliseconds — the max age enforced by
/// `ReputationEngine::validate_post` (§4.3 step 2).
pub const MAX_POST_AGE_MS: u64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    pub author: String,
    pub signature: String,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub attestation: Option<Attestation>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub ephemeral_key: Option<EphemeralKeyAttachment>,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
    #[serde(default)]
    pub link_preview: Option<LinkPreview>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub content_warning: Option<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub edit_of: Option<String>,
    #[serde(default)]
    pub decayed_at: Option<u64>,
}

fn default_content_type() -> String {
    "text".to_string()
}

impl Post {
    /// `"CLOUT_POST_V2\n" || fields`, each field followed by `\n`, in the
    /// fixed order content, author, timestamp, replyTo, mediaCid, link url,
    /// nsfw, contentWarning (§6 "Canonical post signature payload").
    pub fn canonical_signature_payload(&self) -> Vec<u8> {
        let mut out = String::from("CLOUT_POST_V2\n");
        out.push_str(self.content.as_deref().unwrap_or(""));
        out.push('\n');
        out.push_str(&self.author);
        out.push('\n');
        out.push_str(&self.timestamp.unwrap_or(0).to_string());
        out.push('\n');
        out.push_str(self.reply_to.as_deref().unwrap_or(""));
        out.push('\n');
        out.push_str(self.media.as_ref().map(|m| m.cid.as_str()).unwrap_or(""));
        out.push('\n');
        out.push_str(self.link_preview.as_ref().map(|l| l.url.as_str()).unwrap_or(""));
        out.push('\n');
        out.push_str(if self.nsfw { "true" } else { "false" });
        out.push('\n');
        out.push_str(self.content_warning.as_deref().unwrap_or(""));
        out.push('\n');
        out.into_bytes()
    }

    /// The content-hash id derived from the canonical payload (§3 "Every
    /// Post has a non-empty id exactly equal to the content hash of its
    /// canonical payload at creation time").
    pub fn compute_id(&self) -> String {
        canonical::to_hex(&canonical::sha256(&self.canonical_signature_payload()))
    }

    pub fn id_is_consistent(&self) -> bool {
        self.id == self.compute_id()
    }

    pub fn verify_signature(&self) -> Result<(), clout_crypto::CryptoError> {
        clout_crypto::identity::verify_hex(&self.author, &self.canonical_signature_payload(), &self.signature)
    }

    pub fn is_decayed(&self) -> bool {
        self.decayed_at.is_some()
    }

    /// Null out content and media, set `decayedAt` if unset. Idempotent
    /// (§4.4 `decayPost`).
    pub fn decay(&mut self, now_ms: u64) {
        self.content = None;
        self.media = None;
        if self.decayed_at.is_none() {
            self.decayed_at = Some(now_ms);
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp.unwrap_or(0))
    }
}
