//! Deadlines for remote calls.
//!
//! A bounded call runs on its own tokio task. When the deadline wins the race
//! the caller gets a [`TimeoutError`] and the task is left to finish on its
//! own; whatever it eventually produces is dropped with its join handle.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use staffdesk_shared::{CallError, TimeoutError, TransportError};

/// Race `op` against a `limit` timer.
pub async fn with_timeout<T, F>(op: F, limit: Duration) -> Result<T, CallError>
where
    F: Future<Output = Result<T, TransportError>> + Send + 'static,
    T: Send + 'static,
{
    with_deadline(op, Instant::now() + limit).await
}

/// Race `op` against an absolute deadline.
///
/// A completion observed in the same poll as the deadline counts as success.
pub async fn with_deadline<T, F>(op: F, deadline: Instant) -> Result<T, CallError>
where
    F: Future<Output = Result<T, TransportError>> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let mut task = tokio::spawn(op);

    tokio::select! {
        biased;

        joined = &mut task => match joined {
            Ok(result) => result.map_err(CallError::from),
            Err(e) => Err(TransportError::Other(format!("call aborted: {e}")).into()),
        },
        _ = tokio::time::sleep_until(deadline) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(elapsed_ms, "bounded call timed out, detaching");
            Err(TimeoutError { elapsed_ms }.into())
        }
    }
}
