//! Multi-consumer gating barrier.
//!
//! A channel's back-pressure must respect the *slowest* subscriber, not the
//! fastest: a slot is only safe to reclaim once every fan-out consumer has
//! read it. This tracks one progress counter per registered consumer and
//! exposes the minimum, the same `get_minimum_consumer_sequence` pattern the
//! ring buffer in the teacher crate uses to gate producer claims.

use std::sync::Arc;
use std::sync::atomic::{ AtomicU64, Ordering };

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct GatingBarrier {
    progress: Mutex<Vec<Arc<AtomicU64>>>,
    notify: Notify,
}

impl GatingBarrier {
    pub(crate) fn new() -> Self {
        Self { progress: Mutex::new(Vec::new()), notify: Notify::new() }
    }

    /// Registers a new consumer, returning its index for later `publish` calls.
    /// Only called while a network is still being assembled (push time).
    pub(crate) fn register(&self) -> usize {
        let mut progress = self.progress.lock();
        progress.push(Arc::new(AtomicU64::new(0)));
        progress.len() - 1
    }

    /// Records that consumer `idx` has consumed up through `sequence`.
    pub(crate) fn publish(&self, idx: usize, sequence: u64) {
        let cell = self.progress.lock()[idx].clone();
        cell.fetch_max(sequence, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// The minimum progress across all registered consumers. `0` if none are
    /// registered yet (never observed once a network is closed and spinning).
    pub(crate) fn min_published(&self) -> u64 {
        self.progress
            .lock()
            .iter()
            .map(|cell| cell.load(Ordering::Acquire))
            .min()
            .unwrap_or(0)
    }

    pub(crate) async fn wait_until_published(&self, target: u64) -> u64 {
        loop {
            let notified = self.notify.notified();
            let current = self.min_published();
            if current >= target {
                return current;
            }
            notified.await;
        }
    }

    /// Forces every registered consumer's progress up to `sequence`, used to
    /// release a producer suspended in a claim once its last consumer has
    /// terminated and will never advance further.
    pub(crate) fn force_advance_all(&self, sequence: u64) {
        let progress = self.progress.lock();
        for cell in progress.iter() {
            cell.fetch_max(sequence, Ordering::AcqRel);
        }
        drop(progress);
        self.notify.notify_waiters();
    }

    /// Forces a single consumer's progress up to `sequence`, used to release
    /// a producer or sibling fan-out consumer when that one consumer has
    /// stopped for good (its callback failed) without being the last
    /// subscriber to leave. Left stale, that consumer's index would otherwise
    /// cap `min_published()` forever.
    pub(crate) fn force_advance_one(&self, idx: usize, sequence: u64) {
        let cell = self.progress.lock()[idx].clone();
        cell.fetch_max(sequence, Ordering::AcqRel);
        self.notify.notify_waiters();
    }
}
