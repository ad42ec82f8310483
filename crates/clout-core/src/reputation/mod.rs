//! ReputationEngine (§4.3): turns trust-graph reachability into a single
//! score per subject, and gates post admission on it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{ContentTypeOverride, Post, MAX_POST_AGE_MS};
use crate::ports::NotaryPort;
use crate::trust::{TrustGraph, UNREACHABLE_HOPS};

/// `base[len]` indexed by path length 0..=3; any longer path scores 0
/// (§4.3 step 4, SPEC_FULL §2).
const BASE_WEIGHTS: [f64; 4] = [1.0, 0.9, 0.6, 0.3];

#[derive(Debug, Clone)]
pub struct ReputationConfig {
    pub max_hops: u32,
    pub min_reputation: f64,
    /// Half-life for temporal decay, in days. `0.0` disables decay.
    pub half_life_days: f64,
    pub content_type_overrides: HashMap<String, ContentTypeOverride>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self { max_hops: 3, min_reputation: 0.0, half_life_days: 180.0, content_type_overrides: HashMap::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReputationScore {
    pub distance: u32,
    pub path_count: usize,
    pub score: f64,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostValidation {
    pub valid: bool,
    pub reputation: Option<ReputationScore>,
    pub reason: Option<String>,
}

pub struct ReputationEngine {
    trust_graph: Arc<TrustGraph>,
    notary: Arc<dyn NotaryPort>,
    config: ReputationConfig,
}

fn temporal_decay(oldest_ms: u64, now_ms: u64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let day_ms = 24.0 * 60.0 * 60.0 * 1000.0;
    let now_days = now_ms as f64 / day_ms;
    let oldest_days = oldest_ms as f64 / day_ms;
    0.5_f64.powf((now_days - oldest_days) / half_life_days)
}

impl ReputationEngine {
    pub fn new(trust_graph: Arc<TrustGraph>, notary: Arc<dyn NotaryPort>, config: ReputationConfig) -> Self {
        Self { trust_graph, notary, config }
    }

    /// Compute the `ReputationScore` for `subject` as of `now_ms`
    /// (§4.3 steps 1-6).
    pub fn compute(&self, subject: &str, now_ms: u64) -> ReputationScore {
        if self.trust_graph.hop_distance(subject) == 0 {
            return ReputationScore { distance: 0, path_count: 0, score: 1.0, visible: true };
        }

        let paths = self.trust_graph.find_trust_paths(subject, self.config.max_hops);
        if paths.is_empty() {
            return ReputationScore { distance: UNREACHABLE_HOPS, path_count: 0, score: 0.0, visible: false };
        }

        let mut best: Option<(f64, u32)> = None;
        for path in &paths {
            let base = BASE_WEIGHTS.get(path.hops as usize).copied().unwrap_or(0.0);
            let decay = temporal_decay(path.oldest_edge_timestamp, now_ms, self.config.half_life_days);
            let path_weight = base * path.weight * decay;
            best = match best {
                None => Some((path_weight, path.hops)),
                Some((best_weight, best_hops)) => {
                    if path_weight > best_weight || (path_weight == best_weight && path.hops < best_hops) {
                        Some((path_weight, path.hops))
                    } else {
                        Some((best_weight, best_hops))
                    }
                }
            };
        }
        let (best_weight, best_hops) = best.expect("paths is non-empty");

        let diversity_bonus = (paths.len() as f64 * 0.05).min(0.2);
        let score = (best_weight + diversity_bonus).min(1.0);

        ReputationScore { distance: best_hops, path_count: paths.len(), score, visible: best_hops <= self.config.max_hops }
    }

    fn effective_thresholds(&self, content_type: &str) -> (u32, f64) {
        let overrides = self.config.content_type_overrides.get(content_type);
        let max_hops = overrides.and_then(|o| o.max_hops).unwrap_or(self.config.max_hops);
        let min_reputation = overrides.and_then(|o| o.min_reputation).unwrap_or(self.config.min_reputation);
        (max_hops, min_reputation)
    }

    /// `validatePost` pipeline (§4.3): verify attestation, reject on age,
    /// compute reputation against content-type-specific thresholds.
    /// Never panics; every rejection is a structured decision.
    pub fn validate_post(&self, post: &Post, now_ms: u64) -> PostValidation {
        let Some(attestation) = &post.attestation else {
            return PostValidation { valid: false, reputation: None, reason: Some("missing notary attestation".into()) };
        };
        if !self.notary.verify(attestation) {
            return PostValidation { valid: false, reputation: None, reason: Some("notary attestation does not verify".into()) };
        }
        if post.age_ms(now_ms) > MAX_POST_AGE_MS {
            return PostValidation { valid: false, reputation: None, reason: Some("post exceeds max age".into()) };
        }

        let (max_hops, min_reputation) = self.effective_thresholds(&post.content_type);
        let reputation = self.compute(&post.author, now_ms);
        if reputation.score < min_reputation {
            return PostValidation {
                valid: false,
                reputation: Some(reputation),
                reason: Some("author reputation below content-type threshold".into()),
            };
        }
        if reputation.distance > max_hops {
            return PostValidation {
                valid: false,
                reputation: Some(reputation),
                reason: Some("author outside trust horizon for content-type".into()),
            };
        }
        PostValidation { valid: true, reputation: Some(reputation), reason: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attestation;
    use crate::ports::MockNotary;
    use crate::trust::TrustGraphConfig;
    use crate::model::TrustSignal;

    fn attested_post(author: &str, notary: &MockNotary, timestamp: u64, content_type: &str) -> Post {
        let mut post = Post {
            id: "id".into(),
            content: Some("hi".into()),
            author: author.into(),
            signature: String::new(),
            timestamp: Some(timestamp),
            attestation: None,
            reply_to: None,
            content_type: content_type.into(),
            ephemeral_key: None,
            media: None,
            link_preview: None,
            nsfw: false,
            content_warning: None,
            mentions: vec![],
            edit_of: None,
            decayed_at: None,
        };
        post.attestation = Some(notary.timestamp(post.id.as_bytes()).unwrap());
        post
    }

    #[test]
    fn self_is_always_fully_visible() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        let notary: Arc<dyn NotaryPort> = Arc::new(MockNotary::new());
        let engine = ReputationEngine::new(graph, notary, ReputationConfig::default());
        let score = engine.compute("self", 1_700_000_000_000);
        assert_eq!(score, ReputationScore { distance: 0, path_count: 0, score: 1.0, visible: true });
    }

    #[test]
    fn unreachable_subject_scores_zero_and_invisible() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        let notary: Arc<dyn NotaryPort> = Arc::new(MockNotary::new());
        let engine = ReputationEngine::new(graph, notary, ReputationConfig::default());
        let score = engine.compute("stranger", 1_700_000_000_000);
        assert!(!score.visible);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.distance, UNREACHABLE_HOPS);
    }

    #[test]
    fn direct_trust_scores_near_base_weight() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        graph.add_edge(
            "self",
            "bob",
            Some(TrustSignal { truster: "self".into(), trustee: "bob".into(), weight: 1.0, revoked: false, timestamp: 1_700_000_000_000, attestation: None, signature: String::new() }),
        );
        let notary: Arc<dyn NotaryPort> = Arc::new(MockNotary::new());
        let engine = ReputationEngine::new(graph, notary, ReputationConfig { half_life_days: 0.0, ..ReputationConfig::default() });
        let score = engine.compute("bob", 1_700_000_000_000);
        assert_eq!(score.distance, 1);
        // base[1] (0.9) plus the single-path diversity bonus (0.05).
        assert!((score.score - 0.95).abs() < 1e-9);
        assert!(score.visible);
    }

    #[test]
    fn validate_post_rejects_missing_attestation() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        let notary: Arc<dyn NotaryPort> = Arc::new(MockNotary::new());
        let engine = ReputationEngine::new(graph, notary, ReputationConfig::default());
        let mut post = attested_post("self", &MockNotary::new(), 1_700_000_000_000, "text");
        post.attestation = None;
        let decision = engine.validate_post(&post, 1_700_000_000_000);
        assert!(!decision.valid);
    }

    #[test]
    fn validate_post_accepts_self_authored_content() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        let notary = Arc::new(MockNotary::new());
        let post = attested_post("self", &notary, 1_700_000_000_000, "text");
        let engine = ReputationEngine::new(graph, notary, ReputationConfig::default());
        let decision = engine.validate_post(&post, 1_700_000_000_000);
        assert!(decision.valid);
    }

    #[test]
    fn validate_post_rejects_content_outside_horizon() {
        let graph = Arc::new(TrustGraph::new("self".into(), TrustGraphConfig::default()));
        let notary = Arc::new(MockNotary::new());
        let post = attested_post("stranger", &notary, 1_700_000_000_000, "text");
        let engine = ReputationEngine::new(graph, notary, ReputationConfig::default());
        let decision = engine.validate_post(&post, 1_700_000_000_000);
        assert!(!decision.valid);
        assert_eq!(decision.reason.as_deref(), Some("author outside trust horizon for content-type"));
    }
}
