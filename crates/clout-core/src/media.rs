//! Media-request continuation map (§9 design note: "The P2P media request
//! uses a continuation map keyed by CID. Represent as a map from CID to a
//! one-shot result channel with an attached timer; cancel the timer on any
//! resolution."), and the timeout policy of §5 ("Outbound media requests
//! carry a timeout (default 30s); on expiry, the pending future resolves
//! to 'unavailable' and the entry is cleared").
//!
//! Grounded on `freeq-server`'s correlation-id-keyed pending-request maps
//! (the same `Mutex<HashMap<Id, oneshot::Sender<_>>>` shape used for its
//! own request/response bridging), generalized from a single request id to
//! the CID namespace media responses are addressed by.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Outcome of an outbound media request once it resolves, one way or another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Found(Vec<u8>),
    Unavailable,
}

struct Pending {
    sender: oneshot::Sender<MediaOutcome>,
    timer: tokio::task::JoinHandle<()>,
}

/// Tracks outstanding `media-request` gossip messages by CID, pairing each
/// with a one-shot channel the caller awaits and a cancellable timeout
/// task. At most one outstanding request per CID; a second `request` for
/// the same CID before the first resolves replaces it (the first caller's
/// receiver then resolves to `Unavailable` when its sender is dropped).
#[derive(Default)]
pub struct MediaRequestTracker {
    pending: Mutex<HashMap<String, Pending>>,
}

impl MediaRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outstanding request for `cid`, returning the
    /// receiver the caller should await. After `timeout`, if still
    /// unresolved, the entry is cleared and the receiver resolves to
    /// `Unavailable`.
    pub fn request(self: &std::sync::Arc<Self>, cid: String, timeout: Duration) -> oneshot::Receiver<MediaOutcome> {
        let (tx, rx) = oneshot::channel();

        let tracker = std::sync::Arc::clone(self);
        let timeout_cid = cid.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pending) = tracker.pending.lock().remove(&timeout_cid) {
                let _ = pending.sender.send(MediaOutcome::Unavailable);
                pending.timer.abort();
            }
        });

        if let Some(stale) = self.pending.lock().insert(cid, Pending { sender: tx, timer }) {
            stale.timer.abort();
            let _ = stale.sender.send(MediaOutcome::Unavailable);
        }

        rx
    }

    /// Resolve a pending request for `cid` with data from a
    /// `media-response`, cancelling its timer (§9: "cancel the timer on
    /// any resolution"). Returns `false` if nothing was waiting on `cid`
    /// (a response arrived for a CID we never requested, or after it
    /// already timed out).
    pub fn resolve(&self, cid: &str, data: Vec<u8>) -> bool {
        let Some(pending) = self.pending.lock().remove(cid) else { return false };
        pending.timer.abort();
        pending.sender.send(MediaOutcome::Found(data)).is_ok()
    }

    /// Number of requests still awaiting a response or timeout.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Drop for MediaRequestTracker {
    fn drop(&mut self) {
        for (_, pending) in self.pending.get_mut().drain() {
            pending.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolve_delivers_the_response_and_cancels_the_timer() {
        let tracker = Arc::new(MediaRequestTracker::new());
        let rx = tracker.request("cid-1".into(), Duration::from_secs(30));
        assert!(tracker.resolve("cid-1", b"data".to_vec()));
        assert_eq!(rx.await.unwrap(), MediaOutcome::Found(b"data".to_vec()));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn unmatched_resolution_returns_false() {
        let tracker = Arc::new(MediaRequestTracker::new());
        assert!(!tracker.resolve("nobody-asked", b"data".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_resolves_unavailable_and_clears_the_entry() {
        let tracker = Arc::new(MediaRequestTracker::new());
        let rx = tracker.request("cid-1".into(), Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(rx.await.unwrap(), MediaOutcome::Unavailable);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn a_second_request_for_the_same_cid_replaces_the_first() {
        let tracker = Arc::new(MediaRequestTracker::new());
        let first = tracker.request("cid-1".into(), Duration::from_secs(30));
        let _second = tracker.request("cid-1".into(), Duration::from_secs(30));
        assert_eq!(first.await.unwrap(), MediaOutcome::Unavailable);
        assert_eq!(tracker.outstanding(), 1);
    }
}
