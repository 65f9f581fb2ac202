//! Fixed-interval polling bounded by a wall-clock timeout.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PollError<E: std::error::Error + 'static> {
    #[error("timed out after {0:?} waiting for the result")]
    TimedOut(Duration),
    #[error("operation failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Check(E),
}

/// Calls `check` until it reports `Ready` or `Failed`.
///
/// Between pending answers the loop sleeps for `interval`. Once the time
/// since the first call reaches `timeout`, the next pending answer ends the
/// loop with `PollError::TimedOut`. An error from `check` ends it at once.
pub async fn poll<T, E, F, Fut>(
    mut check: F,
    timeout: Duration,
    interval: Duration,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match check().await.map_err(PollError::Check)? {
            PollStatus::Ready(value) => {
                debug!(attempts, elapsed = ?started.elapsed(), "poll succeeded");
                return Ok(value);
            }
            PollStatus::Failed(reason) => return Err(PollError::Failed(reason)),
            PollStatus::Pending => {
                if Instant::now() < deadline {
                    sleep(interval).await;
                } else {
                    return Err(PollError::TimedOut(started.elapsed()));
                }
            }
        }
    }
}
