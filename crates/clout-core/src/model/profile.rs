//! Profile entity (§3). Field-level CRDT merge lives in `state`; this is
//! just the shape and its trust-settings knobs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NsfwPolicy {
    Hide,
    Warn,
    Show,
}

impl Default for NsfwPolicy {
    fn default() -> Self {
        NsfwPolicy::Warn
    }
}

/// Per-content-type override of the reputation gate (§4.3 step 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeOverride {
    #[serde(default)]
    pub max_hops: Option<u32>,
    #[serde(default)]
    pub min_reputation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayPolicy {
    pub normal_threshold_ms: u64,
    pub retracted_threshold_ms: u64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        // 90 days for an un-retracted post, 1 day once retracted.
        Self {
            normal_threshold_ms: 90 * 24 * 60 * 60 * 1000,
            retracted_threshold_ms: 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSettings {
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_min_reputation")]
    pub min_reputation: f64,
    #[serde(default)]
    pub nsfw_policy: NsfwPolicy,
    #[serde(default)]
    pub content_type_overrides: std::collections::HashMap<String, ContentTypeOverride>,
    #[serde(default)]
    pub decay_policy: DecayPolicy,
}

fn default_max_hops() -> u32 {
    3
}

fn default_min_reputation() -> f64 {
    0.0
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            min_reputation: default_min_reputation(),
            nsfw_policy: NsfwPolicy::default(),
            content_type_overrides: Default::default(),
            decay_policy: DecayPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DisplayMetadata {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_cid: Option<String>,
}

/// §9 "Cyclic and duck-typed state": the trust set is an ordered list at
/// the CRDT boundary and a `HashSet` everywhere else. This struct is the
/// in-memory, set-shaped view used by the rest of the core.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Profile {
    pub public_key: String,
    pub trust_set: HashSet<String>,
    pub trust_settings: TrustSettings,
    pub display: DisplayMetadata,
}

impl Profile {
    pub fn new(public_key: String) -> Self {
        Self {
            public_key,
            trust_set: HashSet::new(),
            trust_settings: TrustSettings::default(),
            display: DisplayMetadata::default(),
        }
    }
}
