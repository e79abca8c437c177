//! Error types for network assembly, configuration and routine execution.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors produced while building or running a dataflow network.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A `push` call violated the network's assembly state machine, e.g. pushing
    /// a consumer onto a network that has not seen a producer yet.
    #[error("topology error: {0}")]
    Topology(String),

    /// A configuration value (buffer size, stride length, thread pool size, ...)
    /// failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A user-supplied routine callback returned an error or panicked.
    #[error("routine '{routine}' failed")]
    CallbackFailed {
        routine: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An internal invariant of the channel/sequencer/barrier protocol was violated.
    /// Reaching this is a bug in the library rather than misuse by a caller.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl PipelineError {
    pub fn topology(message: impl Into<String>) -> Self {
        Self::Topology(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn callback_failed(
        routine: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CallbackFailed { routine: routine.into(), source: Box::new(source) }
    }
}
