//! Drives a closed network to completion.

use tokio::task::JoinSet;

use crate::error::{ PipelineError, Result };
use crate::network::{ Network, NetworkState };

/// Spawns every routine and channel wait-path in `network` onto the ambient
/// tokio runtime and waits for all of them to finish. Requires `network` to
/// be `closed` (a pipeline with a terminal consumer, or a lone spinner) —
/// anything else is rejected as a topology error before any task runs.
///
/// Returns the first error observed, cancelling every other routine as soon
/// as one fails or panics so the rest of the network winds down instead of
/// running forever.
pub async fn spin(network: Network) -> Result<()> {
    if network.state() != NetworkState::Closed {
        return Err(
            PipelineError::topology(
                "cannot spin a network that is not closed: it is missing a terminal consumer (or, for a spinner-only network, anything past the first push)"
            )
        );
    }
    let (pending, handle) = network.into_parts();

    let mut join_set = JoinSet::new();
    for task in pending {
        join_set.spawn(task);
    }

    let mut first_error = None;
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::error!(%error, "routine failed, cancelling the rest of the network");
                handle.request_cancellation();
                first_error.get_or_insert(error);
            }
            Err(join_error) => {
                tracing::error!(%join_error, "routine panicked, cancelling the rest of the network");
                handle.request_cancellation();
                first_error.get_or_insert(
                    PipelineError::invariant(format!("routine task failed: {join_error}"))
                );
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
