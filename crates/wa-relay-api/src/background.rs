//! Tracked, bounded background work.
//!
//! Accepted webhook deliveries are processed after the HTTP response has been
//! sent. [`BackgroundTasks`] runs each delivery as its own task and:
//!
//! - limits how many run at the same time (the permit is acquired inside the
//!   task, so spawning never waits),
//! - tracks every task so shutdown can wait for them to drain,
//! - cancels whatever is still running once the drain timeout elapses.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl BackgroundTasks {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Run `work` in the background.
    ///
    /// Work spawned after [`shutdown`](Self::shutdown) has started is still
    /// tracked but is cancelled with everything else if the drain times out.
    pub fn spawn<F>(&self, name: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let run = async {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                work.await;
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(task = name, "Background task cancelled before completion");
                }
                _ = run => {
                    debug!(task = name, "Background task finished");
                }
            }
        });
    }

    /// Number of spawned tasks that have not finished
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Number of tasks that may run right now without waiting
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait up to `timeout` for tracked tasks to finish, then cancel the rest.
    ///
    /// Returns `true` when every task finished within the timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for background tasks to finish");
        }

        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
        {
            return true;
        }

        warn!(
            remaining = self.tracker.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Background tasks did not finish in time; cancelling"
        );
        self.cancel.cancel();
        self.tracker.wait().await;
        false
    }
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
