//! Per-peer leaky-bucket rate limiter (§4.5 step 1, §8 invariant 5).

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { capacity: 20.0, refill_per_second: 10.0 }
    }
}

struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
}

/// Tracks one leaky bucket per peer public key. `check` is the only
/// operation on the hot path; `sweep` drops buckets that have been full
/// and idle, bounding memory for peers that stop sending (§5
/// "Seen-nonces and rate buckets: swept lazily... O(1) amortised").
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Consume one token for `peer` at `now_ms`. Returns `true` if the
    /// message is admitted, `false` if the bucket is empty (§8 scenario 2:
    /// capacity=2, refill=0 admits exactly the first two sends).
    pub fn check(&self, peer: &str, now_ms: u64) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(peer.to_string()).or_insert_with(|| Bucket { tokens: self.config.capacity, last_refill_ms: now_ms });

        let elapsed_secs = now_ms.saturating_sub(bucket.last_refill_ms) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_secs * self.config.refill_per_second).min(self.config.capacity);
        bucket.last_refill_ms = now_ms;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets untouched for longer than `idle_ms` — by then they
    /// would have refilled to capacity anyway, so forgetting them is
    /// equivalent to leaving them in place, and bounds the table's size
    /// for peers that stopped sending (§5 "swept lazily... O(1)
    /// amortised"). A fresh full bucket is recreated on the peer's next
    /// `check`.
    pub fn sweep(&self, now_ms: u64, idle_ms: u64) {
        self.buckets.lock().retain(|_, bucket| now_ms.saturating_sub(bucket.last_refill_ms) <= idle_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_capacity_then_drops() {
        let limiter = RateLimiter::new(RateLimiterConfig { capacity: 2.0, refill_per_second: 0.0 });
        assert!(limiter.check("peer", 0));
        assert!(limiter.check("peer", 1));
        assert!(!limiter.check("peer", 2));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(RateLimiterConfig { capacity: 1.0, refill_per_second: 1.0 });
        assert!(limiter.check("peer", 0));
        assert!(!limiter.check("peer", 100));
        assert!(limiter.check("peer", 1_000));
    }

    #[test]
    fn peers_are_independent() {
        let limiter = RateLimiter::new(RateLimiterConfig { capacity: 1.0, refill_per_second: 0.0 });
        assert!(limiter.check("a", 0));
        assert!(limiter.check("b", 0));
        assert!(!limiter.check("a", 0));
    }

    #[test]
    fn sweep_drops_only_buckets_idle_past_the_threshold() {
        let limiter = RateLimiter::new(RateLimiterConfig { capacity: 2.0, refill_per_second: 1.0 });
        limiter.check("idle", 0);
        limiter.sweep(50, 100);
        assert!(limiter.buckets.lock().contains_key("idle"));
        limiter.sweep(1_000, 100);
        assert!(!limiter.buckets.lock().contains_key("idle"));
    }
}
