//! Sweeper (§9 design note): "Periodic sweeping... Seen-nonces, rate
//! buckets, relay dedup cache, pending-auth, and stale clients all use the
//! same scan-and-expire idiom. Share one scheduler interface that takes
//! `(intervalMs, closure)` and drop the redundancy."
//!
//! Grounded in the teacher's own periodic-maintenance tasks
//! (`freeq-server/src/server.rs`'s compaction/reconciliation/cleanup
//! `tokio::spawn` + `tokio::time::interval` loops): every one of those call
//! sites is the same shape, so here it is pulled out once.

use std::time::Duration;

/// Spawns a task that calls `tick` on a fixed interval, skipping the
/// immediate first tick (matching the teacher's `interval.tick().await; //
/// skip first tick` convention so a sweeper doesn't do work the instant a
/// node boots). Dropping or aborting the returned handle stops the sweep.
pub fn spawn_sweeper<F>(interval: Duration, mut tick: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tick();
        }
    })
}
