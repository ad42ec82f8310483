//! TokenBooth (§4.6): mints and verifies posting tickets, and arbitrates
//! delegation of posting rights from high-reputation accounts to accounts
//! without a sybil token of their own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{Delegation, Ticket, TicketKind};
use crate::ports::{NotaryPort, SybilIssuerPort};
use crate::{CoreError, CoreResult};

/// A callback invoked whenever a pending delegation is created or removed,
/// so a deployer can persist it under `sections::TICKETS`-adjacent storage
/// without the booth taking a `PersistencePort` dependency directly.
pub type DelegationObserver = Box<dyn Fn(&str, Option<&Delegation>) + Send + Sync>;

/// A reputation lookup injected so `mint_delegated_ticket` can re-verify
/// the delegator still clears the reputation floor at redemption time
/// (§4.6 "verifies delegator still meets the reputation floor").
pub type ReputationGetter = Box<dyn Fn(&str) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct TokenBoothConfig {
    pub delegation_duration_hours: u64,
}

impl Default for TokenBoothConfig {
    fn default() -> Self {
        Self { delegation_duration_hours: 24 }
    }
}

struct WeeklyQuota {
    /// Millisecond timestamps of delegations granted in the trailing 7-day
    /// window, oldest first.
    grants: Vec<u64>,
}

const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1000;

pub struct TokenBooth {
    notary: Arc<dyn NotaryPort>,
    sybil: Arc<dyn SybilIssuerPort>,
    config: TokenBoothConfig,
    pending_delegations: Mutex<HashMap<String, Delegation>>,
    quotas: Mutex<HashMap<String, WeeklyQuota>>,
    on_delegation_change: Option<DelegationObserver>,
    reputation: Option<ReputationGetter>,
}

impl TokenBooth {
    pub fn new(notary: Arc<dyn NotaryPort>, sybil: Arc<dyn SybilIssuerPort>, config: TokenBoothConfig) -> Self {
        Self {
            notary,
            sybil,
            config,
            pending_delegations: Mutex::new(HashMap::new()),
            quotas: Mutex::new(HashMap::new()),
            on_delegation_change: None,
            reputation: None,
        }
    }

    pub fn with_delegation_observer(mut self, observer: DelegationObserver) -> Self {
        self.on_delegation_change = Some(observer);
        self
    }

    pub fn with_reputation_getter(mut self, getter: ReputationGetter) -> Self {
        self.reputation = Some(getter);
        self
    }

    /// §4.6 "Choose duration": `≥0.9 → 168h`, `≥0.7 → 72h`, `≥0.5 → 48h`,
    /// else (including unknown reputation) `24h`.
    fn duration_hours_for(reputation_score: Option<f64>) -> u64 {
        match reputation_score {
            Some(score) if score >= 0.9 => 168,
            Some(score) if score >= 0.7 => 72,
            Some(score) if score >= 0.5 => 48,
            _ => 24,
        }
    }

    /// §4.6 weekly delegation quota: `≥0.9 → 10`, `≥0.7 → 5`, else `0`.
    fn weekly_quota_for(reputation_score: f64) -> u32 {
        if reputation_score >= 0.9 {
            10
        } else if reputation_score >= 0.7 {
            5
        } else {
            0
        }
    }

    /// `mintTicket` (§4.6): verify the sybil token, pick a duration by
    /// reputation, sign a canonical payload, and attach a notary
    /// attestation.
    pub fn mint_ticket(&self, owner: &str, sybil_token: &[u8], reputation_score: Option<f64>, now_ms: u64) -> CoreResult<Ticket> {
        if !self.sybil.verify_token(sybil_token) {
            return Err(CoreError::FatalConfig("sybil token failed verification".into()));
        }
        let duration_hours = Self::duration_hours_for(reputation_score);
        let expiry = now_ms + duration_hours * 60 * 60 * 1000;
        let proof_hex = hex::encode(sybil_token);
        let payload = serde_json::json!({
            "owner": owner,
            "expiry": expiry,
            "durationHours": duration_hours,
            "proof": proof_hex,
        });
        let hash = clout_crypto::canonical::hash_canonical(&payload);
        let attestation = self.notary.timestamp(&hash)?;

        Ok(Ticket {
            owner: owner.to_string(),
            expiry,
            duration_hours,
            kind: TicketKind::Direct,
            freebird_proof: Some(proof_hex),
            delegator: None,
            attestation,
        })
    }

    /// `verifyTicket` (§4.6): never errors, only true/false — expired or
    /// mis-owned tickets are rejected quietly.
    pub fn verify_ticket(&self, ticket: &Ticket, claimed_owner: &str, now_ms: u64) -> bool {
        ticket.is_owned_by(claimed_owner) && ticket.is_unexpired(now_ms) && self.notary.verify(&ticket.attestation)
    }

    /// Drop grants older than the rolling 7-day window and return the
    /// count remaining, without inserting a new one.
    fn prune_and_count(quota: &mut WeeklyQuota, now_ms: u64) -> usize {
        quota.grants.retain(|ts| now_ms.saturating_sub(*ts) < WEEK_MS);
        quota.grants.len()
    }

    /// `delegatePass` (§4.6): requires the delegator to clear the 0.7
    /// reputation floor, enforces the rolling weekly grant quota, signs the
    /// canonical delegation payload, and records it as the recipient's one
    /// pending delegation.
    pub fn delegate_pass(&self, delegator: &clout_crypto::Identity, recipient: &str, delegator_reputation: f64, now_ms: u64) -> CoreResult<Delegation> {
        if delegator_reputation < 0.7 {
            return Err(CoreError::FatalConfig("delegator reputation below the 0.7 delegation floor".into()));
        }
        let quota = Self::weekly_quota_for(delegator_reputation);
        let delegator_key = delegator.public_key_hex();
        {
            let mut quotas = self.quotas.lock();
            let entry = quotas.entry(delegator_key.clone()).or_insert_with(|| WeeklyQuota { grants: Vec::new() });
            let used = Self::prune_and_count(entry, now_ms);
            if used as u32 >= quota {
                return Err(CoreError::RateLimited);
            }
            entry.grants.push(now_ms);
        }

        let expiry = now_ms + self.config.delegation_duration_hours * 60 * 60 * 1000;
        let unsigned = Delegation {
            delegator: delegator_key.clone(),
            recipient: recipient.to_string(),
            expiry,
            signature: String::new(),
            attestation: crate::model::Attestation { hash: String::new(), timestamp_ms: 0, signatures: vec![], witness_ids: vec![] },
            delegator_reputation_floor: 0.7,
        };
        let canonical = unsigned.canonical_value(now_ms);
        let hash = clout_crypto::canonical::hash_canonical(&canonical);
        let hash_hex = clout_crypto::canonical::to_hex(&hash);
        let signature = clout_crypto::canonical::to_hex(&delegator.sign(hash_hex.as_bytes()));
        let attestation = self.notary.timestamp(&hash)?;

        let delegation = Delegation { signature, attestation, ..unsigned };

        self.pending_delegations.lock().insert(recipient.to_string(), delegation.clone());
        if let Some(observer) = &self.on_delegation_change {
            observer(recipient, Some(&delegation));
        }
        Ok(delegation)
    }

    /// `mintDelegatedTicket` (§4.6): consumes the recipient's pending
    /// delegation. A missing/expired delegation, a broken notary proof, or
    /// a delegator that has since fallen below its reputation floor all
    /// drop the pending delegation (signalling removal) and return a
    /// structured error.
    pub fn mint_delegated_ticket(&self, recipient_public_key: &str, now_ms: u64) -> CoreResult<Ticket> {
        let delegation = {
            let pending = self.pending_delegations.lock();
            pending.get(recipient_public_key).cloned()
        };
        let Some(delegation) = delegation else {
            return Err(CoreError::NotFound(format!("no pending delegation for {recipient_public_key}")));
        };

        let drop_delegation = |this: &Self| {
            this.pending_delegations.lock().remove(recipient_public_key);
            if let Some(observer) = &this.on_delegation_change {
                observer(recipient_public_key, None);
            }
        };

        if !delegation.is_unexpired(now_ms) {
            drop_delegation(self);
            return Err(CoreError::Expired(format!("delegation for {recipient_public_key} has expired")));
        }
        if !self.notary.verify(&delegation.attestation) {
            drop_delegation(self);
            return Err(CoreError::Unauthorized("delegation notary attestation failed to verify".into()));
        }
        if let Some(getter) = &self.reputation {
            let current = getter(&delegation.delegator);
            if current < delegation.delegator_reputation_floor {
                drop_delegation(self);
                return Err(CoreError::Unauthorized("delegator no longer meets the reputation floor".into()));
            }
        }

        drop_delegation(self);

        let expiry = now_ms + self.config.delegation_duration_hours * 60 * 60 * 1000;
        let payload = serde_json::json!({
            "owner": recipient_public_key,
            "expiry": expiry,
            "durationHours": self.config.delegation_duration_hours,
            "delegator": delegation.delegator,
        });
        let hash = clout_crypto::canonical::hash_canonical(&payload);
        let attestation = self.notary.timestamp(&hash)?;

        Ok(Ticket {
            owner: recipient_public_key.to_string(),
            expiry,
            duration_hours: self.config.delegation_duration_hours,
            kind: TicketKind::Delegated,
            freebird_proof: None,
            delegator: Some(delegation.delegator),
            attestation,
        })
    }
}
