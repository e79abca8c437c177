//! Single-cursor publication barrier.
//!
//! Tracks the highest sequence published so far and lets waiters suspend
//! until a target sequence has been reached. Used internally by
//! [`crate::disruptor::sequencer::MultiProducerSequencer`] to publish its own
//! progress to readers.

use std::sync::atomic::{ AtomicU64, Ordering };

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct SequenceBarrier {
    last_published: AtomicU64,
    notify: Notify,
}

impl SequenceBarrier {
    pub(crate) fn new() -> Self {
        Self { last_published: AtomicU64::new(0), notify: Notify::new() }
    }

    /// Advances the published cursor to at least `sequence` and wakes waiters.
    /// Monotonic: calls with a lower sequence than already published are no-ops.
    pub(crate) fn publish(&self, sequence: u64) {
        self.last_published.fetch_max(sequence, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    pub(crate) fn last_published(&self) -> u64 {
        self.last_published.load(Ordering::Acquire)
    }

    /// Suspends until `last_published() >= target`, returning the observed value.
    pub(crate) async fn wait_until_published(&self, target: u64) -> u64 {
        loop {
            // Registering interest before re-checking the condition is what makes
            // this race-free: `Notify::notified()` latches any `notify_waiters()`
            // call that happens after this point, even before the `.await` below.
            let notified = self.notify.notified();
            let current = self.last_published();
            if current >= target {
                return current;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_published() {
        let barrier = SequenceBarrier::new();
        barrier.publish(5);
        let observed = barrier.wait_until_published(3).await;
        assert_eq!(observed, 5);
    }

    #[tokio::test]
    async fn wait_suspends_until_published() {
        let barrier = SequenceBarrier::new();
        let waiter = async { barrier.wait_until_published(1).await };
        let publisher = async {
            tokio::task::yield_now().await;
            barrier.publish(1);
        };
        let (observed, _) = tokio::join!(waiter, publisher);
        assert_eq!(observed, 1);
    }

    #[test]
    fn publish_is_monotonic() {
        let barrier = SequenceBarrier::new();
        barrier.publish(10);
        barrier.publish(4);
        assert_eq!(barrier.last_published(), 10);
    }
}
