//! Assembles routines into a dataflow network and tracks its assembly state.
//!
//! A network starts `Empty`. Pushing a [`crate::routine::Producer`] opens it;
//! pushing a [`crate::routine::Consumer`] closes it. [`crate::spin::spin`]
//! only accepts a closed network, so a half-built pipeline (a dangling
//! transformer with nothing reading its output, say) is rejected before any
//! task ever runs.

use std::any::{ Any, TypeId };
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::{ CancellationHandle, CancellationToken };
use crate::config::NetworkConfig;
use crate::disruptor::channel::{ run_transformer, Channel };
use crate::disruptor::Envelope;
use crate::error::{ PipelineError, Result };
use crate::routine::Routine;
use crate::timeout::timeout_future;

pub(crate) type PendingFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetworkState {
    Empty,
    Open,
    Closed,
}

/// A network under construction (or, after [`crate::spin::spin`] consumes it,
/// already running).
pub struct Network {
    channels: HashMap<(TypeId, String), Box<dyn Any + Send + Sync>>,
    pending: Vec<PendingFuture>,
    handle: CancellationHandle,
    state: NetworkState,
    config: NetworkConfig,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            channels: HashMap::new(),
            pending: Vec::new(),
            handle: CancellationHandle::new(),
            state: NetworkState::Empty,
            config,
        }
    }

    /// Installs a routine, enforcing the `empty -> open -> closed` assembly
    /// protocol. Generic over [`Routine`] so producers, transformers,
    /// consumers and spinners all go through one call.
    pub fn push<R: Routine>(&mut self, routine: R) -> Result<()> {
        routine.install(self)
    }

    /// Returns a handle that can cancel every routine pushed so far. Safe to
    /// call before, during, or after [`crate::spin::spin`].
    pub fn handle(&self) -> CancellationHandle {
        self.handle.clone()
    }

    /// Schedules cancellation of the whole network after `duration`, driven by
    /// a timeout routine spawned alongside everything else in `spin`.
    pub fn cancel_after(&mut self, duration: Duration) {
        let handle = self.handle.clone();
        self.pending.push(Box::pin(timeout_future(handle, duration)));
    }

    pub(crate) fn state(&self) -> NetworkState {
        self.state
    }

    pub(crate) fn into_parts(self) -> (Vec<PendingFuture>, CancellationHandle) {
        (self.pending, self.handle)
    }

    fn get_or_create_channel<T>(&mut self, name: &str) -> Result<Arc<Channel<T>>>
        where T: Send + Sync + 'static + Default
    {
        let key = (TypeId::of::<T>(), name.to_string());
        if let Some(existing) = self.channels.get(&key) {
            // The map is keyed on `(TypeId, name)`, so a hit here can only ever
            // be the `Arc<Channel<T>>` this same `T` inserted. A failed downcast
            // would mean the registry itself is corrupted, not a caller mistake:
            // that is an internal invariant violation, not a recoverable error.
            let channel = existing.downcast_ref::<Arc<Channel<T>>>().unwrap_or_else(|| {
                tracing::error!(channel = name, "channel registry entry did not match its own type key");
                panic!("internal invariant violated: channel registry entry did not match its own type key");
            });
            return Ok(channel.clone());
        }
        let channel = Arc::new(Channel::<T>::new(&self.config.channel, name)?);
        self.channels.insert(key, Box::new(channel.clone()));
        Ok(channel)
    }

    pub(crate) fn install_producer<T, F>(
        &mut self,
        name: String,
        callback: F,
        token: CancellationToken
    )
        -> Result<()>
        where T: Send + Sync + 'static + Default, F: Fn() -> T + Send + Sync + 'static
    {
        match self.state {
            NetworkState::Empty | NetworkState::Open => {}
            NetworkState::Closed => {
                return Err(PipelineError::topology("cannot push a producer onto a closed network"));
            }
        }
        let channel = self.get_or_create_channel::<T>(&name)?;
        channel.register_publisher();
        self.handle.push(token.clone());
        self.pending.push(Box::pin(channel.run_producer(callback, token)));
        self.state = NetworkState::Open;
        Ok(())
    }

    pub(crate) fn install_transformer<In, Out, F>(
        &mut self,
        input_name: String,
        output_name: String,
        callback: F,
        token: CancellationToken
    )
        -> Result<()>
        where
            In: Send + Sync + 'static + Default,
            Out: Send + Sync + 'static + Default,
            F: Fn(&In) -> Out + Send + Sync + 'static
    {
        if self.state != NetworkState::Open {
            return Err(
                PipelineError::topology(
                    "a transformer requires an open network (push a producer first)"
                )
            );
        }
        let input = self.get_or_create_channel::<In>(&input_name)?;
        let output = self.get_or_create_channel::<Out>(&output_name)?;
        output.register_publisher();
        let idx = input.register_subscriber();
        self.handle.push(token.clone());
        self.pending.push(Box::pin(run_transformer(input, output, idx, callback, token)));
        Ok(())
    }

    pub(crate) fn install_consumer<T, F>(
        &mut self,
        name: String,
        callback: F,
        token: CancellationToken
    )
        -> Result<()>
        where T: Send + Sync + 'static + Default, F: Fn(&Envelope<T>) + Send + Sync + 'static
    {
        // A second (or third, ...) consumer pushed onto a channel that
        // already has a subscriber is fan-out, and stays legal even once the
        // network has closed: only the *first* consumer on a channel is the
        // one that requires an otherwise-open network and performs the
        // empty/open -> closed transition.
        let key = (TypeId::of::<T>(), name.clone());
        let is_fan_out = self.channels
            .get(&key)
            .and_then(|boxed| boxed.downcast_ref::<Arc<Channel<T>>>())
            .is_some_and(|channel| channel.has_subscribers());
        if self.state != NetworkState::Open && !is_fan_out {
            return Err(
                PipelineError::topology(
                    "a consumer requires an open network (push a producer first), or must fan out onto a channel that already has a subscriber"
                )
            );
        }
        let channel = self.get_or_create_channel::<T>(&name)?;
        let idx = channel.register_subscriber();
        self.handle.push(token.clone());
        self.pending.push(Box::pin(channel.run_consumer(idx, callback, token)));
        self.state = NetworkState::Closed;
        Ok(())
    }

    pub(crate) fn install_spinner<F>(&mut self, callback: F, token: CancellationToken) -> Result<()>
        where F: Fn() + Send + Sync + 'static
    {
        if self.state != NetworkState::Empty {
            return Err(
                PipelineError::topology("a spinner may only be pushed onto an otherwise-empty network")
            );
        }
        self.handle.push(token.clone());
        self.pending.push(Box::pin(crate::disruptor::channel::run_spinner(callback, token)));
        self.state = NetworkState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::{ make_consumer, make_producer, make_spinner, make_transformer };

    #[test]
    fn producer_then_consumer_closes_the_network() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("nums", || 1)).unwrap();
        assert_eq!(network.state(), NetworkState::Open);
        network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap();
        assert_eq!(network.state(), NetworkState::Closed);
    }

    #[test]
    fn consumer_before_producer_is_a_topology_error() {
        let mut network = Network::default();
        let err = network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }

    #[test]
    fn spinner_alone_closes_an_empty_network() {
        let mut network = Network::default();
        network.push(make_spinner(|| {})).unwrap();
        assert_eq!(network.state(), NetworkState::Closed);
    }

    #[test]
    fn spinner_after_producer_is_rejected() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("nums", || 1)).unwrap();
        let err = network.push(make_spinner(|| {})).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }

    #[test]
    fn pushing_onto_a_closed_network_is_rejected() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("nums", || 1)).unwrap();
        network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap();
        let err = network.push(make_producer::<u64, _>("more", || 2)).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }

    #[test]
    fn a_second_consumer_on_the_same_channel_is_legal_fan_out() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("nums", || 1)).unwrap();
        network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap();
        assert_eq!(network.state(), NetworkState::Closed);
        network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap();
        assert_eq!(network.state(), NetworkState::Closed);
    }

    #[test]
    fn a_second_consumer_on_a_different_channel_is_still_rejected() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("nums", || 1)).unwrap();
        network.push(make_consumer::<u64, _>("nums", |_: &u64| {})).unwrap();
        let err = network.push(make_consumer::<u64, _>("other", |_: &u64| {})).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }

    #[test]
    fn chained_transformer_builds_a_three_stage_pipeline() {
        let mut network = Network::default();
        network.push(make_producer::<u64, _>("raw", || 1)).unwrap();
        network.push(make_transformer::<u64, u64, _>("raw", "doubled", |v: &u64| v * 2)).unwrap();
        network.push(make_consumer::<u64, _>("doubled", |_: &u64| {})).unwrap();
        assert_eq!(network.state(), NetworkState::Closed);
    }
}
