//! Typed routine constructors: `make_producer`, `make_transformer`,
//! `make_consumer` and `make_spinner`.
//!
//! A routine pairs a plain synchronous callback with the channel name(s) it
//! reads from or writes to. Building one does not start any work; pushing it
//! onto a [`crate::network::Network`] does.

use std::marker::PhantomData;

use crate::cancellation::CancellationToken;
use crate::disruptor::Envelope;
use crate::error::Result;
use crate::network::Network;

/// Implemented by every routine kind; `Network::push` is generic over it.
pub trait Routine {
    #[doc(hidden)]
    fn install(self, network: &mut Network) -> Result<()>;
}

/// No input, one output: the only routine allowed to open an empty network.
pub struct Producer<T, F> {
    pub(crate) name: String,
    pub(crate) callback: F,
    pub(crate) token: CancellationToken,
    _marker: PhantomData<fn() -> T>,
}

pub fn make_producer<T, F>(name: impl Into<String>, callback: F) -> Producer<T, F>
    where T: Send + Sync + 'static + Default, F: Fn() -> T + Send + Sync + 'static
{
    Producer { name: name.into(), callback, token: CancellationToken::new(), _marker: PhantomData }
}

impl<T, F> Routine
    for Producer<T, F>
    where T: Send + Sync + 'static + Default, F: Fn() -> T + Send + Sync + 'static
{
    fn install(self, network: &mut Network) -> Result<()> {
        network.install_producer(self.name, self.callback, self.token)
    }
}

/// One input, one output.
pub struct Transformer<In, Out, F> {
    pub(crate) input_name: String,
    pub(crate) output_name: String,
    pub(crate) callback: F,
    pub(crate) token: CancellationToken,
    _marker: PhantomData<fn(&In) -> Out>,
}

pub fn make_transformer<In, Out, F>(
    input_name: impl Into<String>,
    output_name: impl Into<String>,
    callback: F
) -> Transformer<In, Out, F>
    where
        In: Send + Sync + 'static + Default,
        Out: Send + Sync + 'static + Default,
        F: Fn(&In) -> Out + Send + Sync + 'static
{
    Transformer {
        input_name: input_name.into(),
        output_name: output_name.into(),
        callback,
        token: CancellationToken::new(),
        _marker: PhantomData,
    }
}

impl<In, Out, F> Routine
    for Transformer<In, Out, F>
    where
        In: Send + Sync + 'static + Default,
        Out: Send + Sync + 'static + Default,
        F: Fn(&In) -> Out + Send + Sync + 'static
{
    fn install(self, network: &mut Network) -> Result<()> {
        network.install_transformer(self.input_name, self.output_name, self.callback, self.token)
    }
}

/// One input, no output: the only routine allowed to close a network.
pub struct Consumer<T, F> {
    pub(crate) name: String,
    pub(crate) callback: F,
    pub(crate) token: CancellationToken,
    _marker: PhantomData<fn(&Envelope<T>)>,
}

/// Callback observes the plain payload; sequence/last_message stay internal.
pub fn make_consumer<T, F>(name: impl Into<String>, callback: F) -> Consumer<T, impl Fn(&Envelope<T>) + Send + Sync + 'static>
    where T: Send + Sync + 'static + Default, F: Fn(&T) + Send + Sync + 'static
{
    Consumer {
        name: name.into(),
        callback: move |envelope: &Envelope<T>| callback(&envelope.payload),
        token: CancellationToken::new(),
        _marker: PhantomData,
    }
}

/// Callback opts into seeing the full envelope (sequence, `last_message`, payload).
pub fn make_consumer_with_envelope<T, F>(name: impl Into<String>, callback: F) -> Consumer<T, F>
    where T: Send + Sync + 'static + Default, F: Fn(&Envelope<T>) + Send + Sync + 'static
{
    Consumer { name: name.into(), callback, token: CancellationToken::new(), _marker: PhantomData }
}

impl<T, F> Routine
    for Consumer<T, F>
    where T: Send + Sync + 'static + Default, F: Fn(&Envelope<T>) + Send + Sync + 'static
{
    fn install(self, network: &mut Network) -> Result<()> {
        network.install_consumer(self.name, self.callback, self.token)
    }
}

/// No input, no output: only legal as the sole routine in a network.
pub struct Spinner<F> {
    pub(crate) callback: F,
    pub(crate) token: CancellationToken,
}

pub fn make_spinner<F>(callback: F) -> Spinner<F> where F: Fn() + Send + Sync + 'static {
    Spinner { callback, token: CancellationToken::new() }
}

impl<F> Routine for Spinner<F> where F: Fn() + Send + Sync + 'static {
    fn install(self, network: &mut Network) -> Result<()> {
        network.install_spinner(self.callback, self.token)
    }
}
