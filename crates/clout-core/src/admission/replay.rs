//! Nonce-based replay defence (§3 global invariant, §4.5 step 3, §8
//! invariant 4): `(senderPublicKey, nonce)` may be accepted at most once
//! within the retention window.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Tracks every `(sender, nonce)` key accepted so far, each keyed by its
/// own expiry so a sweep can drop entries past their retention window
/// without scanning envelope contents again.
pub struct NonceCache {
    seen: Mutex<HashMap<String, u64>>,
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceCache {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if `key` is fresh (and records it), `false` if it was
    /// already seen within its retention window (§3 "has not been accepted
    /// within the nonce-retention window"). `expiry_ms` is
    /// `max(envelope.expiresAt, now + retention)` per §4.5 step 3.
    pub fn check_and_insert(&self, key: String, expiry_ms: u64) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, expiry_ms);
        true
    }

    /// Periodic sweep: discard entries past their own expiry (§4.5 step 3
    /// "Periodic sweep discards entries past their expiry").
    pub fn sweep(&self, now_ms: u64) {
        self.seen.lock().retain(|_, expiry| *expiry > now_ms);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().len()
    }
}
