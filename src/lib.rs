//! fluxgraph - cooperative dataflow networks over a lock-free, LMAX-disruptor
//! style channel engine.
//!
//! Build a network out of four routine kinds connected by named, typed
//! channels, then hand it to [`spin`] to run to completion on the ambient
//! tokio runtime:
//!
//! ```no_run
//! use fluxgraph::{ make_consumer, make_producer, spin, Network };
//!
//! # #[tokio::main]
//! # async fn main() -> fluxgraph::Result<()> {
//! let mut network = Network::default();
//! network.push(make_producer::<u32, _>("greeting", || 1))?;
//! network.push(make_consumer::<u32, _>("greeting", |n: &u32| println!("got {n}")))?;
//! spin(network).await
//! # }
//! ```

mod cancellation;
mod config;
mod constants;
mod disruptor;
mod error;
mod network;
mod routine;
mod spin;
mod timeout;

pub use cancellation::{ CancellationHandle, CancellationToken };
pub use config::{ ChannelConfig, NetworkConfig };
pub use disruptor::Envelope;
pub use error::{ PipelineError, Result };
pub use network::Network;
pub use routine::{
    make_consumer,
    make_consumer_with_envelope,
    make_producer,
    make_spinner,
    make_transformer,
    Consumer,
    Producer,
    Routine,
    Spinner,
    Transformer,
};
pub use spin::spin;

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
