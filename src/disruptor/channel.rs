//! A single named channel: ring buffer + sequencer + gating barrier, plus the
//! producer-side and consumer-side coroutine bodies that drive it.
//!
//! A channel is created once, the first time a routine referencing its name
//! and payload type is pushed onto a [`crate::network::Network`], and lives
//! until every producer and consumer bound to it has returned. Routine
//! callbacks are generic (`F: Fn(...) + Send + Sync + 'static`) rather than
//! boxed trait objects: each routine is spawned as its own task, so there is
//! no need to store heterogeneous callbacks in one collection.

use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };

use crate::cancellation::CancellationToken;
use crate::config::ChannelConfig;
use crate::disruptor::envelope::Envelope;
use crate::disruptor::gating::GatingBarrier;
use crate::disruptor::ring_buffer::RingBuffer;
use crate::disruptor::sequencer::MultiProducerSequencer;
use crate::error::{ PipelineError, Result };

/// Invokes a user callback, converting a panic into a [`PipelineError::CallbackFailed`]
/// instead of unwinding across the routine's coroutine boundary. The channel/sequencer
/// state is never touched inside `f`, so a caught panic leaves no torn writes behind.
fn call_guarded<R>(routine: &str, f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "callback panicked with a non-string payload".to_string());
        PipelineError::callback_failed(routine.to_string(), PanicMessage(message))
    })
}

#[derive(Debug)]
struct PanicMessage(String);

impl std::fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PanicMessage {}

pub(crate) struct Channel<T> {
    name: String,
    capacity: u64,
    stride_length: u64,
    buffer: RingBuffer<T>,
    sequencer: MultiProducerSequencer,
    gating: Arc<GatingBarrier>,
    num_publishers: AtomicUsize,
    num_subscribers: AtomicUsize,
    is_terminated: AtomicBool,
}

impl<T: Send + Sync + 'static + Default> Channel<T> {
    pub(crate) fn new(config: &ChannelConfig, name: impl Into<String>) -> Result<Self> {
        let capacity = config.message_buffer_size as u64;
        let buffer = RingBuffer::new(config.message_buffer_size)?;
        let gating = Arc::new(GatingBarrier::new());
        let sequencer = MultiProducerSequencer::new(capacity, gating.clone());
        Ok(Self {
            name: name.into(),
            capacity,
            stride_length: config.stride_length,
            buffer,
            sequencer,
            gating,
            num_publishers: AtomicUsize::new(0),
            num_subscribers: AtomicUsize::new(0),
            is_terminated: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Registers a producer side. Called once, synchronously, at push time so
    /// that topology (how many producers/consumers a channel ends up with) is
    /// fixed before any routine starts running.
    pub(crate) fn register_publisher(&self) {
        self.num_publishers.fetch_add(1, Ordering::AcqRel);
    }

    /// Registers a consumer side, returning its gating index.
    pub(crate) fn register_subscriber(&self) -> usize {
        self.num_subscribers.fetch_add(1, Ordering::AcqRel);
        self.gating.register()
    }

    /// Whether this channel already has at least one registered consumer,
    /// i.e. whether pushing another consumer on it would be fan-out rather
    /// than the channel's first (network-closing) consumer.
    pub(crate) fn has_subscribers(&self) -> bool {
        self.num_subscribers.load(Ordering::Acquire) > 0
    }

    fn terminate(&self) {
        self.is_terminated.store(true, Ordering::Release);
        // Release anyone suspended in a claim permanently: nothing will ever
        // consume again, so there is nothing left to wait for.
        self.gating.force_advance_all(self.sequencer.claimed_high());
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.is_terminated.load(Ordering::Acquire)
    }

    /// Writes and publishes one claimed batch. If the callback panics partway
    /// through the batch, the already-claimed-but-not-yet-written remainder of
    /// the range is filled with a default-payload, `last_message = true`
    /// sentinel and the whole range is still published: the sequencer's
    /// published cursor must never stall behind a claimed-but-unpublished
    /// range, and any consumer already suspended on this range still needs to
    /// observe a `last_message` frame to unblock. The failure is then returned
    /// so the caller can stop the routine after this batch.
    async fn produce_batch(&self, callback: &impl Fn() -> T, last_message: bool) -> Result<u64> {
        let range = self.sequencer.claim_up_to(self.stride_length).await;
        let hi = *range.end();
        let mut failure = None;
        for sequence in range.clone() {
            if failure.is_some() {
                unsafe {
                    self.buffer.write(sequence, Envelope {
                        sequence,
                        last_message: true,
                        payload: T::default(),
                    });
                }
                continue;
            }
            match call_guarded(&self.name, callback) {
                Ok(payload) => {
                    let is_last = last_message && sequence == hi;
                    unsafe {
                        self.buffer.write(sequence, Envelope { sequence, last_message: is_last, payload });
                    }
                }
                Err(error) => {
                    unsafe {
                        self.buffer.write(sequence, Envelope {
                            sequence,
                            last_message: true,
                            payload: T::default(),
                        });
                    }
                    failure = Some(error);
                }
            }
        }
        self.sequencer.publish(range);
        match failure {
            Some(error) => Err(error),
            None => Ok(hi),
        }
    }

    pub(crate) async fn publish_one(&self, payload: T, last_message: bool) -> u64 {
        let range = self.sequencer.claim_up_to(1).await;
        let sequence = *range.start();
        unsafe {
            self.buffer.write(sequence, Envelope { sequence, last_message, payload });
        }
        self.sequencer.publish(range);
        sequence
    }

    /// Drives a producer routine end to end: loop while there is still at
    /// least one live subscriber, then drain once the producer side closes.
    ///
    /// A panicking callback aborts the loop immediately (skipping drain: the
    /// callback is presumed broken) and surfaces as a [`PipelineError::CallbackFailed`];
    /// `spin` cancels every other routine in response so the rest of the
    /// network still winds down cleanly.
    pub(crate) async fn run_producer<F>(
        self: Arc<Self>,
        callback: F,
        token: CancellationToken
    )
        -> Result<()>
        where F: Fn() -> T + Send + Sync + 'static
    {
        let mut last_claimed = 0u64;
        let result = (async {
            while
                !token.is_cancellation_requested() &&
                self.num_subscribers.load(Ordering::Acquire) > 0
            {
                last_claimed = self.produce_batch(&callback, false).await?;
            }
            Ok(())
        }).await;
        let remaining_publishers = self.num_publishers.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(channel = self.name.as_str(), remaining_publishers, "producer finished main loop");
        result?;
        // Drain: emit one extra batch with `last_message = true` so any
        // subscriber suspended waiting for data is released.
        while
            remaining_publishers == 0 &&
            self.num_subscribers.load(Ordering::Acquire) > 0 &&
            last_claimed <= self.gating.min_published() + self.capacity
        {
            last_claimed = self.produce_batch(&callback, true).await?;
        }
        Ok(())
    }

    async fn consume_once(
        &self,
        idx: usize,
        callback: &impl Fn(&Envelope<T>),
        next_to_read: u64
    ) -> Result<(u64, u64, bool)> {
        let available = self.sequencer.wait_until_published(next_to_read).await;
        let mut sequence = next_to_read;
        let mut saw_last = false;
        while sequence <= available {
            let envelope = unsafe { self.buffer.read(sequence) };
            call_guarded(&self.name, || callback(envelope))?;
            let is_last = envelope.last_message;
            sequence += 1;
            if is_last {
                saw_last = true;
                break;
            }
        }
        self.gating.publish(idx, available);
        Ok((available + 1, available, saw_last))
    }

    /// Drives a consumer routine end to end: loop while there is still at
    /// least one live publisher, then drain once the consumer side closes.
    ///
    /// See [`Channel::run_producer`] for the panic-into-[`PipelineError::CallbackFailed`]
    /// contract; the same applies here.
    pub(crate) async fn run_consumer<F>(
        self: Arc<Self>,
        idx: usize,
        callback: F,
        token: CancellationToken
    )
        -> Result<()>
        where F: Fn(&Envelope<T>) + Send + Sync + 'static
    {
        let mut next_to_read = 1u64;
        let result = (async {
            while
                !token.is_cancellation_requested() &&
                self.num_publishers.load(Ordering::Acquire) > 0
            {
                let (nr, _lc, saw_last) = self.consume_once(idx, &callback, next_to_read).await?;
                next_to_read = nr;
                if saw_last {
                    break;
                }
            }
            Ok(())
        }).await;
        let remaining_subscribers = self.num_subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(channel = self.name.as_str(), remaining_subscribers, "consumer finished main loop");
        if let Err(error) = result {
            // Force this consumer's gating index forward even if it was not
            // the last subscriber: left stale, it caps `min_published()`
            // forever and wedges the producer's claim and any sibling
            // fan-out consumer's wait, since cancellation only flips an
            // `AtomicBool` and never touches a parked barrier directly.
            self.gating.force_advance_one(idx, self.sequencer.claimed_high());
            if remaining_subscribers == 0 {
                self.terminate();
            }
            return Err(error);
        }
        while
            self.num_publishers.load(Ordering::Acquire) > 0 &&
            remaining_subscribers == 0 &&
            next_to_read <= self.sequencer.last_published_after(0)
        {
            let (nr, _lc, _) = self.consume_once(idx, &callback, next_to_read).await?;
            next_to_read = nr;
        }
        if remaining_subscribers == 0 {
            self.terminate();
        }
        Ok(())
    }
}

/// Drives a transformer end to end: one side subscribes to `input`, the
/// other publishes to `output`, interleaved message by message so the
/// callback runs synchronously between a read and the write it produces.
///
/// See [`Channel::run_producer`] for the panic-into-[`PipelineError::CallbackFailed`]
/// contract; the same applies here, named by `input`'s channel name.
pub(crate) async fn run_transformer<In, Out, F>(
    input: Arc<Channel<In>>,
    output: Arc<Channel<Out>>,
    idx: usize,
    callback: F,
    token: CancellationToken
)
    -> Result<()>
    where
        In: Send + Sync + 'static + Default,
        Out: Send + Sync + 'static + Default,
        F: Fn(&In) -> Out + Send + Sync + 'static
{
    let mut next_to_read = 1u64;
    let mut last_claimed_out = 0u64;

    let transform_once = |envelope: &Envelope<In>| -> Result<Option<Out>> {
        if envelope.last_message {
            Ok(None)
        } else {
            call_guarded(&input.name, || callback(&envelope.payload)).map(Some)
        }
    };

    // The main loop's `Result` is captured here rather than let a mid-batch
    // `?` unwind straight out of the function: the input-side bookkeeping
    // below (subscriber decrement, gating release, termination) must run
    // whether the loop finished cleanly or a callback failed partway through
    // a batch, or a dead consumer's stale gating index wedges every producer
    // and sibling fan-out consumer on `input` forever.
    let main_loop_result: Result<()> = (async {
        loop {
            let keep_going =
                !token.is_cancellation_requested() &&
                input.num_publishers.load(Ordering::Acquire) > 0 &&
                output.num_subscribers.load(Ordering::Acquire) > 0;
            if !keep_going {
                break;
            }
            let available = input.sequencer.wait_until_published(next_to_read).await;
            let mut sequence = next_to_read;
            let mut saw_last = false;
            let mut failure = None;
            while sequence <= available {
                let envelope = unsafe { input.buffer.read(sequence) };
                match transform_once(envelope) {
                    Ok(Some(value)) => {
                        last_claimed_out = output.publish_one(value, false).await;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
                let is_last = envelope.last_message;
                sequence += 1;
                if is_last {
                    saw_last = true;
                    break;
                }
            }
            input.gating.publish(idx, available);
            next_to_read = available + 1;
            if let Some(error) = failure {
                return Err(error);
            }
            if saw_last {
                break;
            }
        }
        Ok(())
    }).await;

    let input_remaining_subscribers = input.num_subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
    tracing::debug!(
        channel = input.name.as_str(),
        input_remaining_subscribers,
        "transformer finished main loop"
    );

    if let Err(error) = main_loop_result {
        // Force this consumer's gating index forward regardless of whether it
        // was the last subscriber: left stale, it caps `min_published()`
        // forever and wedges `input`'s producers and any sibling fan-out
        // consumer's wait.
        input.gating.force_advance_one(idx, input.sequencer.claimed_high());
        if input_remaining_subscribers == 0 {
            input.terminate();
        }
        // The callback is presumed broken, so release the output side with a
        // bare sentinel instead of re-entering it.
        let output_remaining_publishers = output.num_publishers.fetch_sub(1, Ordering::AcqRel) - 1;
        if output_remaining_publishers == 0 && output.num_subscribers.load(Ordering::Acquire) > 0 {
            output.publish_one(Out::default(), true).await;
        }
        return Err(error);
    }

    let drain_result: Result<()> = (async {
        while
            input_remaining_subscribers == 0 &&
            input.num_publishers.load(Ordering::Acquire) > 0 &&
            next_to_read <= input.sequencer.last_published_after(0)
        {
            let available = input.sequencer.wait_until_published(next_to_read).await;
            let mut sequence = next_to_read;
            while sequence <= available {
                let envelope = unsafe { input.buffer.read(sequence) };
                if let Some(value) = transform_once(envelope)? {
                    last_claimed_out = output.publish_one(value, false).await;
                }
                sequence += 1;
            }
            input.gating.publish(idx, available);
            next_to_read = available + 1;
        }
        Ok(())
    }).await;

    if input_remaining_subscribers == 0 {
        input.terminate();
    }

    if let Err(error) = drain_result {
        input.gating.force_advance_one(idx, input.sequencer.claimed_high());
        let output_remaining_publishers = output.num_publishers.fetch_sub(1, Ordering::AcqRel) - 1;
        if output_remaining_publishers == 0 && output.num_subscribers.load(Ordering::Acquire) > 0 {
            output.publish_one(Out::default(), true).await;
        }
        return Err(error);
    }

    let output_remaining_publishers = output.num_publishers.fetch_sub(1, Ordering::AcqRel) - 1;
    while
        output_remaining_publishers == 0 &&
        output.num_subscribers.load(Ordering::Acquire) > 0 &&
        last_claimed_out <= output.gating.min_published() + output.capacity
    {
        last_claimed_out = output.publish_one(Out::default(), true).await;
    }
    Ok(())
}

/// Drives a spinner end to end: no channel, just the callback and a
/// cooperative yield between invocations.
///
/// See [`Channel::run_producer`] for the panic-into-[`PipelineError::CallbackFailed`]
/// contract; the same applies here, named `"spinner"` since a spinner has no channel.
pub(crate) async fn run_spinner<F>(callback: F, token: CancellationToken) -> Result<()>
    where F: Fn() + Send + Sync + 'static
{
    while !token.is_cancellation_requested() {
        call_guarded("spinner", &callback)?;
        tokio::task::yield_now().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn producer_then_consumer_delivers_every_message() {
        let config = ChannelConfig::new(8).unwrap();
        let channel = Arc::new(Channel::<u64>::new(&config, "counts").unwrap());
        channel.register_publisher();
        let idx = channel.register_subscriber();

        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = counter.clone();

        let producer_token = CancellationToken::new();
        let cancel_token = producer_token.clone();
        let producer = channel
            .clone()
            .run_producer(move || counter_clone.fetch_add(1, Ordering::Relaxed), producer_token);
        let consumer = channel
            .clone()
            .run_consumer(
                idx,
                move |envelope: &Envelope<u64>| {
                    received_clone.lock().push(envelope.payload);
                },
                CancellationToken::new()
            );
        let canceller = async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            cancel_token.request_cancellation();
        };

        tokio::join!(producer, consumer, canceller);
        assert!(!received.lock().is_empty());
    }

    #[tokio::test]
    async fn last_consumer_leaving_terminates_the_channel() {
        let config = ChannelConfig::new(4).unwrap();
        let channel = Arc::new(Channel::<u64>::new(&config, "terminates").unwrap());
        channel.register_publisher();
        let idx = channel.register_subscriber();

        let producer_token = CancellationToken::new();
        let consumer_token = producer_token.clone();
        let producer = channel.clone().run_producer(|| 1u64, producer_token);
        let consumer = channel.clone().run_consumer(idx, |_: &Envelope<u64>| {}, consumer_token.clone());
        let canceller = async move {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            consumer_token.request_cancellation();
        };

        assert!(!channel.is_terminated());
        tokio::join!(producer, consumer, canceller);
        assert!(channel.is_terminated());
    }

    #[tokio::test]
    async fn a_panicking_producer_callback_surfaces_as_callback_failed() {
        let config = ChannelConfig::new(4).unwrap();
        let channel = Arc::new(Channel::<u64>::new(&config, "panics").unwrap());
        channel.register_publisher();
        let idx = channel.register_subscriber();

        let producer = channel.clone().run_producer(
            || panic!("synthetic producer failure"),
            CancellationToken::new()
        );
        let consumer = channel.clone().run_consumer(idx, |_: &Envelope<u64>| {}, CancellationToken::new());

        let (producer_result, _consumer_result) = tokio::join!(producer, consumer);
        let error = producer_result.expect_err("a panicking callback must surface as an error");
        assert!(matches!(error, PipelineError::CallbackFailed { .. }));
    }
}
