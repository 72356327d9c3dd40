use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};

/// Cancellable set of background workers with a bounded wait on termination.
///
/// Every worker spawned through the group observes [`WorkerGroup::token`];
/// [`WorkerGroup::close`] cancels it and returns only once all of them exited.
#[derive(Debug, Clone, Default)]
pub struct WorkerGroup {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancelled when the group is cancelled or closed.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for every worker without cancelling them.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub async fn close(&self) {
        self.cancel();
        self.wait().await;
    }

    /// Like [`WorkerGroup::wait`], but gives up once `deadline` fires.
    pub async fn wait_until(&self, deadline: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = self.wait() => Ok(()),
            _ = deadline.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Like [`WorkerGroup::wait`], but gives up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| Error::ShutdownTimeout(timeout))
    }
}
