//! The timeout routine backing [`crate::network::Network::cancel_after`].

use std::time::Duration;

use crate::cancellation::CancellationHandle;
use crate::error::Result;

pub(crate) async fn timeout_future(handle: CancellationHandle, duration: Duration) -> Result<()> {
    tokio::time::sleep(duration).await;
    tracing::debug!(?duration, "cancel_after timeout elapsed, requesting cancellation");
    handle.request_cancellation();
    Ok(())
}
