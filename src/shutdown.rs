//! Shutdown coordination
//!
//! One root cancellation token shared by the acceptor and every session,
//! plus a task tracker so shutdown can wait for sessions to finish.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Process-wide shutdown flag with session join support
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag; every child token is cancelled with it
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Check if shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is requested
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Token for one connection, cancelled on shutdown or on its own
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Spawn a task that shutdown will wait for
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tracked tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every tracked task, up to `grace`
    ///
    /// Returns false if tasks were still running when the deadline passed.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.trigger();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("All sessions finished");
                true
            }
            Err(_) => {
                warn!(
                    "{} tasks still running after {:?}",
                    self.tracker.len(),
                    grace
                );
                false
            }
        }
    }
}
