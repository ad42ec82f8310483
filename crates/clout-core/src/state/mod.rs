//! ReplicatedState (§4.4): the mergeable per-identity document — profile,
//! own posts, trust signals, reactions, and retractions — backed by
//! `automerge`, the same library the relay's own cluster document uses
//! (grounded in the relay's `ClusterDoc`: flat keys in the root map,
//! JSON-encoded values, save/load/merge as plain document bytes).
//!
//! # Document schema (flat keys)
//!
//! ```text
//! "post:{postId}"                        -> JSON Post
//! "trust:{truster}:{trustee}"            -> JSON TrustSignal
//! "reaction:{reactor}:{postId}:{emoji}"  -> JSON Reaction
//! "retraction:{postId}"                  -> JSON Retraction
//! "profile:display_name"                 -> string (field-level LWW)
//! "profile:bio"                          -> string (field-level LWW)
//! "profile:avatar_cid"                   -> string (field-level LWW)
//! "profile:trust_settings"               -> JSON TrustSettings (LWW)
//! "profile:trust_set"                    -> automerge list of public keys
//! "last_sync"                            -> u64 millis
//! ```
//!
//! `profile:trust_set` is the one place this schema keeps a CRDT list
//! instead of a flat scalar (§9 "Cyclic and duck-typed state": ordered
//! list at the boundary, rehydrated to a `HashSet` for the rest of the
//! core) — list membership merges by element, so two replicas adding
//! different trustees concurrently both survive.

use std::collections::{HashMap, HashSet};

use automerge::{transaction::Transactable, AutoCommit, ObjType, ReadDoc, ScalarValue, Value};
use parking_lot::Mutex;

use crate::model::{DecayPolicy, EncryptedTrustSignal, Post, Profile, Reaction, Retraction, TrustSettings, TrustSignal};
use crate::{CoreError, CoreResult};

const PREFIX_POST: &str = "post:";
const PREFIX_TRUST: &str = "trust:";
const PREFIX_TRUST_ENCRYPTED: &str = "trust-encrypted:";
const PREFIX_REACTION: &str = "reaction:";
const PREFIX_RETRACTION: &str = "retraction:";
const KEY_TRUST_SET: &str = "profile:trust_set";
const KEY_DISPLAY_NAME: &str = "profile:display_name";
const KEY_BIO: &str = "profile:bio";
const KEY_AVATAR_CID: &str = "profile:avatar_cid";
const KEY_TRUST_SETTINGS: &str = "profile:trust_settings";
const KEY_LAST_SYNC: &str = "last_sync";

fn value_to_string(val: &Value<'_>) -> Option<String> {
    match val {
        Value::Scalar(s) => match s.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn value_to_u64(val: &Value<'_>) -> Option<u64> {
    match val {
        Value::Scalar(s) => match s.as_ref() {
            ScalarValue::Uint(n) => Some(*n),
            ScalarValue::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        },
        _ => None,
    }
}

pub struct ReplicatedState {
    doc: Mutex<AutoCommit>,
}

impl ReplicatedState {
    pub fn new(actor_id: &str) -> Self {
        let actor = automerge::ActorId::from(actor_id.as_bytes());
        Self { doc: Mutex::new(AutoCommit::new().with_actor(actor)) }
    }

    pub fn load(data: &[u8], actor_id: &str) -> CoreResult<Self> {
        let actor = automerge::ActorId::from(actor_id.as_bytes());
        let doc = AutoCommit::load(data)
            .map_err(|e| CoreError::InvalidInput(format!("corrupt replicated state: {e}")))?
            .with_actor(actor);
        Ok(Self { doc: Mutex::new(doc) })
    }

    /// Full document bytes — the opaque wire encoding consumed by `merge`
    /// (§4.4 "bytes on the wire... produced by exportSync()").
    pub fn export_sync(&self) -> Vec<u8> {
        self.doc.lock().save()
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub fn add_post(&self, post: &Post) -> CoreResult<()> {
        self.put_json(&format!("{PREFIX_POST}{}", post.id), post)
    }

    pub fn get_post(&self, post_id: &str) -> Option<Post> {
        self.get_json(&format!("{PREFIX_POST}{post_id}"))
    }

    pub fn add_trust_signal(&self, signal: &TrustSignal) -> CoreResult<()> {
        self.put_json(&format!("{PREFIX_TRUST}{}", signal.key()), signal)
    }

    pub fn get_trust_signal(&self, truster: &str, trustee: &str) -> Option<TrustSignal> {
        self.get_json(&format!("{PREFIX_TRUST}{truster}:{trustee}"))
    }

    /// Same lifecycle as `add_trust_signal`, keyed by `(truster,
    /// trustee_commitment)` since the trustee itself is sealed (§3
    /// `EncryptedTrustSignal`).
    pub fn add_encrypted_trust_signal(&self, signal: &EncryptedTrustSignal) -> CoreResult<()> {
        self.put_json(&format!("{PREFIX_TRUST_ENCRYPTED}{}", signal.key()), signal)
    }

    pub fn get_encrypted_trust_signal(&self, truster: &str, trustee_commitment: &str) -> Option<EncryptedTrustSignal> {
        self.get_json(&format!("{PREFIX_TRUST_ENCRYPTED}{truster}:{trustee_commitment}"))
    }

    pub fn add_reaction(&self, reaction: &Reaction) -> CoreResult<()> {
        self.put_json(&format!("{PREFIX_REACTION}{}", reaction.key()), reaction)
    }

    pub fn get_reaction(&self, reactor: &str, post_id: &str, emoji: &str) -> Option<Reaction> {
        self.get_json(&format!("{PREFIX_REACTION}{reactor}:{post_id}:{emoji}"))
    }

    pub fn add_retraction(&self, retraction: &Retraction) -> CoreResult<()> {
        self.put_json(&format!("{PREFIX_RETRACTION}{}", retraction.key()), retraction)
    }

    pub fn get_retraction(&self, post_id: &str) -> Option<Retraction> {
        self.get_json(&format!("{PREFIX_RETRACTION}{post_id}"))
    }

    pub fn set_last_sync(&self, now_ms: u64) -> CoreResult<()> {
        let mut doc = self.doc.lock();
        doc.put(automerge::ROOT, KEY_LAST_SYNC, now_ms)
            .map_err(|e| CoreError::Unavailable(e.to_string()))
    }

    pub fn last_sync(&self) -> Option<u64> {
        let doc = self.doc.lock();
        let (value, _) = doc.get(automerge::ROOT, KEY_LAST_SYNC).ok()??;
        value_to_u64(&value)
    }

    /// Field-level profile merge (§4.4 `updateProfile`): each field is a
    /// distinct flat key, so concurrent siblings (e.g. display-name set on
    /// one replica, bio on another) both survive a merge untouched.
    pub fn update_profile(&self, profile: &Profile) -> CoreResult<()> {
        let mut doc = self.doc.lock();
        if let Some(name) = &profile.display.display_name {
            doc.put(automerge::ROOT, KEY_DISPLAY_NAME, name.as_str()).map_err(|e| CoreError::Unavailable(e.to_string()))?;
        }
        if let Some(bio) = &profile.display.bio {
            doc.put(automerge::ROOT, KEY_BIO, bio.as_str()).map_err(|e| CoreError::Unavailable(e.to_string()))?;
        }
        if let Some(avatar) = &profile.display.avatar_cid {
            doc.put(automerge::ROOT, KEY_AVATAR_CID, avatar.as_str()).map_err(|e| CoreError::Unavailable(e.to_string()))?;
        }
        let settings_json = serde_json::to_string(&profile.trust_settings)
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        doc.put(automerge::ROOT, KEY_TRUST_SETTINGS, settings_json).map_err(|e| CoreError::Unavailable(e.to_string()))?;
        Self::sync_trust_set_list(&mut doc, &profile.trust_set)?;
        Ok(())
    }

    /// Rehydrate the current profile view (§9: list at the boundary, set
    /// in memory).
    pub fn profile(&self, public_key: &str) -> Profile {
        let doc = self.doc.lock();
        let display_name = Self::get_scalar_string(&doc, KEY_DISPLAY_NAME);
        let bio = Self::get_scalar_string(&doc, KEY_BIO);
        let avatar_cid = Self::get_scalar_string(&doc, KEY_AVATAR_CID);
        let trust_settings = Self::get_scalar_string(&doc, KEY_TRUST_SETTINGS)
            .and_then(|raw| serde_json::from_str::<TrustSettings>(&raw).ok())
            .unwrap_or_default();
        let trust_set = Self::read_trust_set_list(&doc);
        Profile {
            public_key: public_key.to_string(),
            trust_set,
            trust_settings,
            display: crate::model::DisplayMetadata { display_name, bio, avatar_cid },
        }
    }

    /// `decayPost` (§4.4): null out content and media, set `decayedAt` if
    /// unset. Idempotent.
    pub fn decay_post(&self, post_id: &str, now_ms: u64) -> CoreResult<()> {
        let mut doc = self.doc.lock();
        let key = format!("{PREFIX_POST}{post_id}");
        let mut post: Post = Self::read_json(&doc, &key)
            .ok_or_else(|| CoreError::NotFound(format!("no post {post_id}")))?;
        post.decay(now_ms);
        doc.put(automerge::ROOT, &key, serde_json::to_string(&post).unwrap())
            .map_err(|e| CoreError::Unavailable(e.to_string()))
    }

    /// `processContentDecay` (§4.4): scan own posts, decaying anything
    /// older than its applicable threshold (retracted posts decay sooner).
    pub fn process_content_decay(&self, settings: &DecayPolicy, now_ms: u64) {
        let mut doc = self.doc.lock();
        let retracted: HashSet<String> = doc
            .map_range(automerge::ROOT, ..)
            .filter_map(|item| item.key.strip_prefix(PREFIX_RETRACTION).map(|id| id.to_string()))
            .collect();
        let post_keys: Vec<String> = doc
            .map_range(automerge::ROOT, ..)
            .filter(|item| item.key.starts_with(PREFIX_POST))
            .map(|item| item.key.to_string())
            .collect();
        for key in post_keys {
            let Some(mut post) = Self::read_json::<Post>(&doc, &key) else { continue };
            if post.is_decayed() {
                continue;
            }
            let post_id = key.strip_prefix(PREFIX_POST).unwrap_or_default();
            let threshold =
                if retracted.contains(post_id) { settings.retracted_threshold_ms } else { settings.normal_threshold_ms };
            if post.age_ms(now_ms) > threshold {
                post.decay(now_ms);
                let _ = doc.put(automerge::ROOT, &key, serde_json::to_string(&post).unwrap());
            }
        }
    }

    /// `merge(remoteBytes)` (§4.4): snapshot pre-merge decay state, apply
    /// the CRDT merge, reapply decay using the earliest observed
    /// `decayedAt`, then compact the keyed collections. Every step runs
    /// under one lock so downstream readers never see a partially-merged
    /// document (§4 "Ordering guarantees").
    pub fn merge(&self, remote_bytes: &[u8]) -> CoreResult<()> {
        let mut remote = AutoCommit::load(remote_bytes)
            .map_err(|e| CoreError::InvalidInput(format!("corrupt replicated state: {e}")))?;
        let mut doc = self.doc.lock();

        let pre_merge_decay = Self::snapshot_decay(&doc);

        doc.merge(&mut remote).map_err(|e| CoreError::Conflict(format!("CRDT merge failed: {e}")))?;

        Self::compact_prefix(&mut doc, PREFIX_TRUST, |raw: &str| {
            let signal: TrustSignal = serde_json::from_str(raw).ok()?;
            let (ts, tombstone, sig) = signal.compaction_key();
            Some(format!("{ts:020}:{}:{sig}", tombstone as u8))
        });
        Self::compact_prefix(&mut doc, PREFIX_TRUST_ENCRYPTED, |raw: &str| {
            let signal: EncryptedTrustSignal = serde_json::from_str(raw).ok()?;
            let (ts, tombstone, sig) = signal.compaction_key();
            Some(format!("{ts:020}:{}:{sig}", tombstone as u8))
        });
        Self::compact_prefix(&mut doc, PREFIX_REACTION, |raw: &str| {
            let reaction: Reaction = serde_json::from_str(raw).ok()?;
            let (ts, tombstone, sig) = reaction.compaction_key();
            Some(format!("{ts:020}:{}:{sig}", tombstone as u8))
        });
        Self::compact_prefix(&mut doc, PREFIX_RETRACTION, |raw: &str| {
            let retraction: Retraction = serde_json::from_str(raw).ok()?;
            let (deleted_at, attestation_ts, sig) = retraction.compaction_key();
            Some(format!("{deleted_at:020}:{attestation_ts:020}:{sig}"))
        });

        Self::reapply_decay(&mut doc, &pre_merge_decay);

        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> CoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let mut doc = self.doc.lock();
        doc.put(automerge::ROOT, key, raw).map_err(|e| CoreError::Unavailable(e.to_string()))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let doc = self.doc.lock();
        Self::read_json(&doc, key)
    }

    fn read_json<T: serde::de::DeserializeOwned>(doc: &AutoCommit, key: &str) -> Option<T> {
        let (value, _) = doc.get(automerge::ROOT, key).ok()??;
        let raw = value_to_string(&value)?;
        serde_json::from_str(&raw).ok()
    }

    fn get_scalar_string(doc: &AutoCommit, key: &str) -> Option<String> {
        let (value, _) = doc.get(automerge::ROOT, key).ok()??;
        value_to_string(&value)
    }

    fn snapshot_decay(doc: &AutoCommit) -> HashMap<String, Option<u64>> {
        let mut map = HashMap::new();
        for item in doc.map_range(automerge::ROOT, ..) {
            let Some(id) = item.key.strip_prefix(PREFIX_POST) else { continue };
            let Some(raw) = value_to_string(&item.value) else { continue };
            if let Ok(post) = serde_json::from_str::<Post>(&raw) {
                map.insert(id.to_string(), post.decayed_at);
            }
        }
        map
    }

    /// §4.4 step (c): for every post touched by the merge, re-derive
    /// `decayedAt` as the earliest value observed anywhere (pre-merge
    /// local snapshot, or any conflicting post-merge record), so a merge
    /// can never un-decay a post (§4.4 invariant (i), edge case 3).
    fn reapply_decay(doc: &mut AutoCommit, pre_merge: &HashMap<String, Option<u64>>) {
        let keys: Vec<String> =
            doc.map_range(automerge::ROOT, ..).filter(|item| item.key.starts_with(PREFIX_POST)).map(|item| item.key.to_string()).collect();
        for key in keys {
            let Ok(all) = doc.get_all(automerge::ROOT, key.as_str()) else { continue };
            let mut posts: Vec<Post> =
                all.iter().filter_map(|(v, _)| value_to_string(v)).filter_map(|raw| serde_json::from_str::<Post>(&raw).ok()).collect();
            if posts.is_empty() {
                continue;
            }
            let post_id = key.strip_prefix(PREFIX_POST).unwrap_or_default();
            let mut earliest: Option<u64> = pre_merge.get(post_id).copied().flatten();
            for post in &posts {
                if let Some(decayed_at) = post.decayed_at {
                    earliest = Some(earliest.map_or(decayed_at, |existing| existing.min(decayed_at)));
                }
            }
            let mut winner = posts.remove(0);
            if let Some(ts) = earliest {
                winner.content = None;
                winner.media = None;
                winner.decayed_at = Some(ts);
            }
            let _ = doc.put(automerge::ROOT, &key, serde_json::to_string(&winner).unwrap());
        }
    }

    /// Compact every key under `prefix` with more than one conflicting
    /// value down to the single record with the greatest `compaction_key`
    /// (§4.4 step d: "total order (attestation-timestamp, tombstone-bit,
    /// signature-hex)"). `key_fn` returns the comparable tuple, erased to
    /// a `String` so this helper doesn't need to be generic over the tuple
    /// shape each model type uses.
    fn compact_prefix(doc: &mut AutoCommit, prefix: &str, key_fn: impl Fn(&str) -> Option<String>) {
        let keys: Vec<String> = doc.map_range(automerge::ROOT, ..).filter(|item| item.key.starts_with(prefix)).map(|item| item.key.to_string()).collect();
        for key in keys {
            let Ok(all) = doc.get_all(automerge::ROOT, key.as_str()) else { continue };
            if all.len() <= 1 {
                continue;
            }
            let mut best: Option<(String, String)> = None; // (compaction_key, raw json)
            for (value, _) in &all {
                let Some(raw) = value_to_string(value) else { continue };
                let Some(order_key) = key_fn(&raw) else { continue };
                best = match best {
                    None => Some((order_key, raw)),
                    Some((best_key, _)) if order_key > best_key => Some((order_key, raw)),
                    Some(existing) => Some(existing),
                };
            }
            if let Some((_, winner_raw)) = best {
                let _ = doc.put(automerge::ROOT, &key, winner_raw);
            }
        }
    }

    fn trust_set_list_id(doc: &mut AutoCommit) -> Result<automerge::ObjId, automerge::AutomergeError> {
        if let Some((_, id)) = doc.get(automerge::ROOT, KEY_TRUST_SET)? {
            return Ok(id);
        }
        doc.put_object(automerge::ROOT, KEY_TRUST_SET, ObjType::List)
    }

    /// Reconcile the automerge list backing `trust_set` with `wanted`,
    /// inserting new members and removing dropped ones by position so
    /// concurrent additions from different replicas both survive a merge
    /// (a plain LWW register would let one replica's addition clobber the
    /// other's).
    fn sync_trust_set_list(doc: &mut AutoCommit, wanted: &HashSet<String>) -> CoreResult<()> {
        let list_id = Self::trust_set_list_id(doc).map_err(|e| CoreError::Unavailable(e.to_string()))?;
        let existing: Vec<String> = (0..doc.length(&list_id))
            .filter_map(|i| doc.get(&list_id, i).ok().flatten().and_then(|(v, _)| value_to_string(&v)))
            .collect();
        for (i, key) in existing.iter().enumerate().rev() {
            if !wanted.contains(key) {
                doc.delete(&list_id, i).map_err(|e| CoreError::Unavailable(e.to_string()))?;
            }
        }
        let existing_set: HashSet<String> = existing.into_iter().collect();
        for key in wanted {
            if !existing_set.contains(key) {
                let idx = doc.length(&list_id);
                doc.insert(&list_id, idx, key.as_str()).map_err(|e| CoreError::Unavailable(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn read_trust_set_list(doc: &AutoCommit) -> HashSet<String> {
        let Ok(Some((_, list_id))) = doc.get(automerge::ROOT, KEY_TRUST_SET) else { return HashSet::new() };
        (0..doc.length(&list_id)).filter_map(|i| doc.get(&list_id, i).ok().flatten().and_then(|(v, _)| value_to_string(&v))).collect()
    }
}
