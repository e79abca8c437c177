//! Fixed-capacity slot storage with no internal synchronization.
//!
//! Safety is entirely delegated to the claim/publish/consume protocol in
//! [`super::sequencer::MultiProducerSequencer`] and [`super::gating::GatingBarrier`]:
//! a slot is written exactly once after being claimed, and only read once its
//! sequence has been published and before the gating barrier lets a producer
//! reclaim it for a new claim `capacity` sequences later.

use std::cell::UnsafeCell;

use crate::disruptor::envelope::Envelope;
use crate::error::{ PipelineError, Result };

pub(crate) struct RingBuffer<T> {
    slots: Box<[UnsafeCell<Envelope<T>>]>,
    mask: u64,
}

// SAFETY: slots are only ever mutated through `write`, which the sequencer
// protocol guarantees has exclusive access to a given sequence's slot, and
// only ever read through `read`, which the protocol guarantees happens after
// the corresponding `write` has completed (publish is a release, wait is an
// acquire). Concurrent reads of a published slot are safe since `read` hands
// out a shared reference and the writer never touches it again until reclaimed.
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Default> RingBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(
                PipelineError::config(
                    format!("ring buffer capacity must be a nonzero power of two, got {capacity}")
                )
            );
        }
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(Envelope::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self { slots, mask: (capacity - 1) as u64 })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// # Safety
    /// The caller must hold the sequencer's exclusive claim on `envelope.sequence`.
    pub(crate) unsafe fn write(&self, sequence: u64, envelope: Envelope<T>) {
        let idx = (sequence & self.mask) as usize;
        *self.slots[idx].get() = envelope;
    }

    /// # Safety
    /// The caller must only call this after `sequence` has been published by
    /// the sequencer.
    pub(crate) unsafe fn read(&self, sequence: u64) -> &Envelope<T> {
        let idx = (sequence & self.mask) as usize;
        &*self.slots[idx].get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_capacity() {
        assert!(RingBuffer::<u64>::new(3).is_err());
    }

    #[test]
    fn write_then_read_round_trips() {
        let buffer = RingBuffer::<u64>::new(4).unwrap();
        unsafe {
            buffer.write(1, Envelope { sequence: 1, last_message: false, payload: 42 });
            assert_eq!(buffer.read(1).payload, 42);
        }
    }

    #[test]
    fn wraps_around_capacity() {
        let buffer = RingBuffer::<u64>::new(4).unwrap();
        unsafe {
            buffer.write(1, Envelope { sequence: 1, last_message: false, payload: 1 });
            buffer.write(5, Envelope { sequence: 5, last_message: false, payload: 5 });
            assert_eq!(buffer.read(5).payload, 5);
            assert_eq!(buffer.capacity(), 4);
        }
    }
}
