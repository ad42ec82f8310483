//! AdmissionPipeline (§4.5): the fixed pipeline every inbound
//! `SignedEnvelope` traverses before its contents reach local state.
//!
//! Rejections never propagate upward (§7 "The admission pipeline never
//! propagates upwards"): `admit` always returns an `AdmissionOutcome`, it
//! never returns `Err`. Errors surfaced during a *semantic* dispatch step
//! (e.g. a CRDT merge failure) are wrapped as `AdmissionOutcome::Rejected`
//! rather than propagated.

mod rate_limit;
mod replay;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use replay::NonceCache;

use std::sync::Arc;

use clout_crypto::{canonical, Identity};

use crate::model::{
    GossipMessage, MediaRequest, MediaResponse, Post, Reaction, Retraction, SignedEnvelope, Slide, TrustSignal,
};
use crate::reputation::{ReputationEngine, ReputationScore};
use crate::state::ReplicatedState;
use crate::trust::TrustGraph;
use crate::CoreError;

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// §4.5 step 4: "Unsigned messages are accepted only when the node is
    /// configured to allow them (permissive default for backward
    /// compatibility)". An envelope counts as unsigned when its
    /// `signature` field is empty.
    pub allow_unsigned: bool,
    /// Minimum time a replay-defence entry is retained past `now`, used
    /// when the envelope's own `expiresAt` is already in the past-ish
    /// near-term (§4.5 step 3: `max(envelope.expiresAt, now + retention)`).
    pub nonce_retention_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { allow_unsigned: true, nonce_retention_ms: 5 * 60 * 1000 }
    }
}

/// What the pipeline decided to do with one inbound envelope. The caller
/// (the node's event loop) is responsible for any I/O the outcome implies
/// (broadcasting an accepted post, forwarding a slide, responding to a
/// state-request) — the pipeline itself only touches in-process state
/// (§5 "all... non-blocking").
#[derive(Debug)]
pub enum AdmissionOutcome {
    /// The per-peer leaky bucket was empty (§4.5 step 1). Silent per §7.
    RateLimited,
    /// Failed signature, expiry, or a semantic validation step. Carries
    /// the reason for logging; never surfaced to the sender.
    Rejected(CoreError),
    /// A duplicate `(sender, nonce)` pair (§4.5 step 3).
    Replay,
    Post { post: Post, reputation: ReputationScore },
    TrustEdgeRecorded { truster: String, trustee: String },
    /// We decrypted an `EncryptedTrustSignal` addressed to us.
    EncryptedTrustSignalForSelf { truster: String },
    /// An `EncryptedTrustSignal` we cannot open — recorded opaquely for
    /// the real trustee to discover on sync.
    EncryptedTrustSignalOpaque { truster: String },
    /// §4.2 Open Question (b): a peer we currently trust revoked us, and
    /// we reciprocated.
    MutualRevocation { revoked_peer: String, our_revocation: TrustSignal },
    Reaction(Reaction),
    Retraction(Retraction),
    SlideForSelf(Slide),
    SlideForward(Slide),
    StateSyncMerged,
    StateRequestReply { state_bytes: Vec<u8> },
    MediaRequestServe(MediaRequest),
    MediaRequestDenied,
    MediaResponseReceived(MediaResponse),
}

pub struct AdmissionPipeline {
    self_public_key: String,
    self_identity: Arc<Identity>,
    self_dh_secret: [u8; 32],
    self_dh_public: [u8; 32],
    trust_graph: Arc<TrustGraph>,
    reputation: Arc<ReputationEngine>,
    state: Arc<ReplicatedState>,
    rate_limiter: RateLimiter,
    nonce_cache: NonceCache,
    config: AdmissionConfig,
}

impl AdmissionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_identity: Arc<Identity>,
        self_dh_secret: [u8; 32],
        self_dh_public: [u8; 32],
        trust_graph: Arc<TrustGraph>,
        reputation: Arc<ReputationEngine>,
        state: Arc<ReplicatedState>,
        rate_limiter_config: RateLimiterConfig,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            self_public_key: self_identity.public_key_hex(),
            self_identity,
            self_dh_secret,
            self_dh_public,
            trust_graph,
            reputation,
            state,
            rate_limiter: RateLimiter::new(rate_limiter_config),
            nonce_cache: NonceCache::new(),
            config,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn nonce_cache(&self) -> &NonceCache {
        &self.nonce_cache
    }

    /// Run one envelope through the full pipeline (§4.5 steps 1-6).
    pub fn admit(&self, envelope: &SignedEnvelope, now_ms: u64) -> AdmissionOutcome {
        if !self.rate_limiter.check(&envelope.sender_public_key, now_ms) {
            tracing::debug!(peer = %envelope.sender_public_key, "rate limit exceeded, dropping envelope");
            return AdmissionOutcome::RateLimited;
        }

        if !envelope.is_unexpired(now_ms) {
            return AdmissionOutcome::Rejected(CoreError::Expired("envelope past expiresAt".into()));
        }

        if envelope.signature.is_empty() {
            if !self.config.allow_unsigned {
                return AdmissionOutcome::Rejected(CoreError::Unauthorized("signed envelopes required".into()));
            }
        } else if envelope.verify_signature().is_err() {
            tracing::warn!(peer = %envelope.sender_public_key, "envelope signature failed to verify");
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("envelope signature verification failed".into()));
        }

        let replay_expiry = envelope.expires_at.max(now_ms + self.config.nonce_retention_ms);
        if !self.nonce_cache.check_and_insert(envelope.replay_key(), replay_expiry) {
            return AdmissionOutcome::Replay;
        }

        self.dispatch(&envelope.message, now_ms)
    }

    fn dispatch(&self, message: &GossipMessage, now_ms: u64) -> AdmissionOutcome {
        match message {
            GossipMessage::Post(post) => self.handle_post(post, now_ms),
            GossipMessage::Trust(signal) => self.handle_trust(signal, now_ms),
            GossipMessage::TrustEncrypted(signal) => self.handle_encrypted_trust(signal, now_ms),
            GossipMessage::Slide(slide) => self.handle_slide(slide),
            GossipMessage::Reaction(reaction) => self.handle_reaction(reaction),
            GossipMessage::PostDelete(retraction) => self.handle_retraction(retraction),
            GossipMessage::StateSync { state_bytes } => self.handle_state_sync(state_bytes),
            GossipMessage::StateRequest => AdmissionOutcome::StateRequestReply { state_bytes: self.state.export_sync() },
            GossipMessage::MediaRequest(req) => self.handle_media_request(req, now_ms),
            GossipMessage::MediaResponse(resp) => AdmissionOutcome::MediaResponseReceived(resp.clone()),
        }
    }

    fn handle_post(&self, post: &Post, now_ms: u64) -> AdmissionOutcome {
        if post.verify_signature().is_err() {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("post signature verification failed".into()));
        }
        if !post.id_is_consistent() {
            return AdmissionOutcome::Rejected(CoreError::InvalidInput("post id does not match its content hash".into()));
        }
        let decision = self.reputation.validate_post(post, now_ms);
        if !decision.valid {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized(
                decision.reason.unwrap_or_else(|| "post rejected by reputation gate".into()),
            ));
        }
        if let Err(e) = self.state.add_post(post) {
            return AdmissionOutcome::Rejected(e);
        }
        AdmissionOutcome::Post { post: post.clone(), reputation: decision.reputation.expect("valid decision carries a reputation") }
    }

    fn handle_trust(&self, signal: &TrustSignal, now_ms: u64) -> AdmissionOutcome {
        if signal.verify_signature().is_err() {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("trust signal signature verification failed".into()));
        }
        self.trust_graph.add_edge(&signal.truster, &signal.trustee, Some(signal.clone()));
        if let Err(e) = self.state.add_trust_signal(signal) {
            return AdmissionOutcome::Rejected(e);
        }

        if signal.revoked && signal.trustee == self.self_public_key && self.trust_graph.config().reciprocate_revocations {
            if let Some(mutual) = self.reciprocate_revocation(&signal.truster, now_ms) {
                return mutual;
            }
        }

        AdmissionOutcome::TrustEdgeRecorded { truster: signal.truster.clone(), trustee: signal.trustee.clone() }
    }

    fn handle_encrypted_trust(&self, signal: &crate::model::EncryptedTrustSignal, now_ms: u64) -> AdmissionOutcome {
        if signal.verify_signature().is_err() {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("encrypted trust signal signature verification failed".into()));
        }
        if let Err(e) = self.state.add_encrypted_trust_signal(signal) {
            return AdmissionOutcome::Rejected(e);
        }

        let opened = signal.try_open(self.self_dh_secret, &self.self_dh_public).unwrap_or(None);
        let Some(_trustee_hex) = opened else {
            return AdmissionOutcome::EncryptedTrustSignalOpaque { truster: signal.truster.clone() };
        };

        if signal.revoked && self.trust_graph.config().reciprocate_revocations {
            if let Some(mutual) = self.reciprocate_revocation(&signal.truster, now_ms) {
                return mutual;
            }
        }
        AdmissionOutcome::EncryptedTrustSignalForSelf { truster: signal.truster.clone() }
    }

    /// §4.5 "on revocation of us by a peer we currently trust, reciprocate
    /// by revoking them": only fires if we hold a direct edge to `peer`.
    fn reciprocate_revocation(&self, peer: &str, now_ms: u64) -> Option<AdmissionOutcome> {
        self.trust_graph.get_direct_trust(peer)?;

        let mut revocation = TrustSignal {
            truster: self.self_public_key.clone(),
            trustee: peer.to_string(),
            weight: 0.0,
            revoked: true,
            timestamp: now_ms,
            attestation: None,
            signature: String::new(),
        };
        let hash_hex = canonical::to_hex(&revocation.canonical_hash());
        revocation.signature = canonical::to_hex(&self.self_identity.sign(hash_hex.as_bytes()));

        self.trust_graph.add_edge(&self.self_public_key, peer, Some(revocation.clone()));
        if let Err(e) = self.state.add_trust_signal(&revocation) {
            return Some(AdmissionOutcome::Rejected(e));
        }
        Some(AdmissionOutcome::MutualRevocation { revoked_peer: peer.to_string(), our_revocation: revocation })
    }

    fn handle_slide(&self, slide: &Slide) -> AdmissionOutcome {
        if slide.to == self.self_public_key {
            AdmissionOutcome::SlideForSelf(slide.clone())
        } else {
            AdmissionOutcome::SlideForward(slide.clone())
        }
    }

    fn handle_reaction(&self, reaction: &Reaction) -> AdmissionOutcome {
        if reaction.verify_signature().is_err() {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("reaction signature verification failed".into()));
        }
        if let Err(e) = self.state.add_reaction(reaction) {
            return AdmissionOutcome::Rejected(e);
        }
        AdmissionOutcome::Reaction(reaction.clone())
    }

    fn handle_retraction(&self, retraction: &Retraction) -> AdmissionOutcome {
        if retraction.verify_signature().is_err() {
            return AdmissionOutcome::Rejected(CoreError::Unauthorized("retraction signature verification failed".into()));
        }
        if let Some(existing) = self.state.get_post(&retraction.post_id) {
            if existing.author != retraction.author {
                return AdmissionOutcome::Rejected(CoreError::Conflict("cannot retract a post authored by someone else".into()));
            }
        }
        if let Err(e) = self.state.add_retraction(retraction) {
            return AdmissionOutcome::Rejected(e);
        }
        AdmissionOutcome::Retraction(retraction.clone())
    }

    fn handle_state_sync(&self, state_bytes: &[u8]) -> AdmissionOutcome {
        match self.state.merge(state_bytes) {
            Ok(()) => AdmissionOutcome::StateSyncMerged,
            Err(e) => AdmissionOutcome::Rejected(e),
        }
    }

    fn handle_media_request(&self, request: &MediaRequest, now_ms: u64) -> AdmissionOutcome {
        if self.reputation.compute(&request.requester, now_ms).visible {
            AdmissionOutcome::MediaRequestServe(request.clone())
        } else {
            AdmissionOutcome::MediaRequestDenied
        }
    }
}

/// SPEC_FULL §3 "admin-mutation signature check" primitive: verify a
/// signed `"{operation}:{subject}:{timestamp}"` string within a clock-skew
/// window, shared by the admin-mutation and post-submit freshness checks
/// described in §6 (both live outside `clout-core`'s scope as HTTP
/// surfaces, but the primitive belongs here).
pub fn verify_timestamped_signature(
    operation: &str,
    subject: &str,
    timestamp_ms: u64,
    now_ms: u64,
    skew_ms: u64,
    public_key_hex: &str,
    signature_hex: &str,
) -> Result<(), CoreError> {
    let skew = now_ms.abs_diff(timestamp_ms);
    if skew > skew_ms {
        return Err(CoreError::Expired(format!("timestamp skew of {skew}ms exceeds the {skew_ms}ms window")));
    }
    let payload = format!("{operation}:{subject}:{timestamp_ms}");
    clout_crypto::identity::verify_hex(public_key_hex, payload.as_bytes(), signature_hex)
        .map_err(|e| CoreError::Unauthorized(e.to_string()))
}
