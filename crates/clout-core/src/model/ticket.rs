//! Ticket (posting pass) and Delegation entities (§3, §4.6).

use serde::{Deserialize, Serialize};

use super::common::Attestation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    Direct,
    Delegated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub owner: String,
    pub expiry: u64,
    pub duration_hours: u64,
    pub kind: TicketKind,
    /// Present for `kind == Direct`: hex of the verified sybil token.
    #[serde(default)]
    pub freebird_proof: Option<String>,
    /// Present for `kind == Delegated`: the delegator's public key.
    #[serde(default)]
    pub delegator: Option<String>,
    pub attestation: Attestation,
}

impl Ticket {
    pub fn is_owned_by(&self, claimed_owner: &str) -> bool {
        self.owner == claimed_owner
    }

    pub fn is_unexpired(&self, now_ms: u64) -> bool {
        now_ms <= self.expiry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: String,
    pub recipient: String,
    pub expiry: u64,
    pub signature: String,
    pub attestation: Attestation,
    pub delegator_reputation_floor: f64,
}

impl Delegation {
    pub fn is_unexpired(&self, now_ms: u64) -> bool {
        now_ms <= self.expiry
    }

    pub fn canonical_value(&self, timestamp: u64) -> serde_json::Value {
        serde_json::json!({
            "delegator": self.delegator,
            "recipient": self.recipient,
            "expiry": self.expiry,
            "timestamp": timestamp,
        })
    }
}
