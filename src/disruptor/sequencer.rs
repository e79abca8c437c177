//! Multi-producer claim/publish sequencer.
//!
//! Wraps a downstream [`GatingBarrier`] (the consumption side of a channel)
//! and issues producer claims against a fixed-capacity slot range. Claims
//! from concurrent producers never overlap; publication only advances the
//! externally visible cursor once every sequence up to it is ready, so
//! readers never observe a gap.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{ AtomicU64, Ordering };

use crossbeam_utils::CachePadded;

use super::barrier::SequenceBarrier;
use super::gating::GatingBarrier;

pub(crate) struct MultiProducerSequencer {
    capacity: u64,
    mask: u64,
    consumer_barrier: Arc<GatingBarrier>,
    claimed: CachePadded<AtomicU64>,
    published: SequenceBarrier,
    ready: Box<[std::sync::atomic::AtomicBool]>,
}

impl MultiProducerSequencer {
    pub(crate) fn new(capacity: u64, consumer_barrier: Arc<GatingBarrier>) -> Self {
        let ready = (0..capacity).map(|_| std::sync::atomic::AtomicBool::new(false)).collect();
        Self {
            capacity,
            mask: capacity - 1,
            consumer_barrier,
            claimed: CachePadded::new(AtomicU64::new(0)),
            published: SequenceBarrier::new(),
            ready,
        }
    }

    /// Reserves up to `count` sequences, suspending while doing so would put
    /// the producer more than `capacity` sequences ahead of the slowest
    /// consumer. Returns the inclusive range of sequences claimed.
    pub(crate) async fn claim_up_to(&self, count: u64) -> RangeInclusive<u64> {
        let count = count.max(1).min(self.capacity);
        loop {
            let current = self.claimed.load(Ordering::Acquire);
            let hi = current + count;
            let required_consumed = hi.saturating_sub(self.capacity);
            let consumed = self.consumer_barrier.min_published();
            if consumed >= required_consumed {
                match
                    self.claimed.compare_exchange(
                        current,
                        hi,
                        Ordering::AcqRel,
                        Ordering::Relaxed
                    )
                {
                    Ok(_) => {
                        return (current + 1)..=hi;
                    }
                    Err(_) => continue,
                }
            }
            self.consumer_barrier.wait_until_published(required_consumed).await;
        }
    }

    /// Marks `range` ready and advances the published cursor over the longest
    /// contiguous prefix of ready sequences starting just past what was
    /// already published. Safe to call concurrently from multiple producers:
    /// the published cursor only ever moves forward via a monotonic `fetch_max`.
    pub(crate) fn publish(&self, range: RangeInclusive<u64>) {
        for sequence in range {
            self.ready[(sequence & self.mask) as usize].store(true, Ordering::Release);
        }
        let mut cursor = self.published.last_published();
        loop {
            let next = cursor + 1;
            let idx = (next & self.mask) as usize;
            if !self.ready[idx].load(Ordering::Acquire) {
                break;
            }
            self.ready[idx].store(false, Ordering::Release);
            cursor = next;
        }
        self.published.publish(cursor);
    }

    pub(crate) fn last_published_after(&self, _prev: u64) -> u64 {
        self.published.last_published()
    }

    pub(crate) async fn wait_until_published(&self, target: u64) -> u64 {
        self.published.wait_until_published(target).await
    }

    pub(crate) fn claimed_high(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_are_contiguous_and_non_overlapping() {
        let gating = Arc::new(GatingBarrier::new());
        gating.register();
        let sequencer = MultiProducerSequencer::new(8, gating);
        let a = sequencer.claim_up_to(2).await;
        let b = sequencer.claim_up_to(2).await;
        assert_eq!(a, 1..=2);
        assert_eq!(b, 3..=4);
    }

    #[tokio::test]
    async fn publish_advances_only_over_contiguous_ready_sequences() {
        let gating = Arc::new(GatingBarrier::new());
        gating.register();
        let sequencer = MultiProducerSequencer::new(8, gating);
        let a = sequencer.claim_up_to(1).await;
        let b = sequencer.claim_up_to(1).await;
        sequencer.publish(b.clone());
        assert_eq!(sequencer.last_published_after(0), 0, "gap at {a:?} blocks advancement");
        sequencer.publish(a);
        assert_eq!(sequencer.last_published_after(0), 2);
    }

    #[tokio::test]
    async fn claim_suspends_until_capacity_is_released() {
        let gating = Arc::new(GatingBarrier::new());
        let idx = gating.register();
        let sequencer = Arc::new(MultiProducerSequencer::new(2, gating.clone()));
        let _first = sequencer.claim_up_to(2).await;
        let sequencer_clone = sequencer.clone();
        let claimer = async move { sequencer_clone.claim_up_to(1).await };
        let releaser = async {
            tokio::task::yield_now().await;
            gating.publish(idx, 1);
        };
        let (range, _) = tokio::join!(claimer, releaser);
        assert_eq!(range, 3..=3);
    }
}
