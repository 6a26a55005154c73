//! Cancellation and timeout helpers
//!
//! Every network await and interactive wait in this crate races a
//! [`CancellationToken`]. Timeouts resolve to `None` so callers can tell
//! "took too long" apart from "the user cancelled".

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hublink_core::{HubError, HubResult};

/// Sleep that wakes early with [`HubError::Cancelled`] when `cancel` fires.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> HubResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(HubError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn race_cancellation<T, F>(cancel: &CancellationToken, fut: F) -> HubResult<T>
where
    F: Future<Output = HubResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(HubError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(HubError::Cancelled),
        result = fut => result,
    }
}

/// Run `fut` for at most `duration`; `None` on timeout.
pub async fn race_timeout<F: Future>(duration: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(duration, fut).await.ok()
}

/// Measures elapsed time on the tokio clock (so paused test time applies).
#[derive(Debug, Clone, Copy)]
pub struct StopWatch {
    started: Instant,
}

impl StopWatch {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::new()
    }
}
