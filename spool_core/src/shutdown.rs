use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Termination signal plus completion latch shared by the reader and the
/// delivery workers.
///
/// The finished flag only ever goes from `false` to `true`. It is set by the
/// reader once the input is exhausted, after its last enqueue, so a worker
/// that observes it and then finds the queue empty knows no more events can
/// arrive.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    finished: AtomicBool,
    latch: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that no more events will be enqueued.
    ///
    /// Returns `false` if the signal was already set.
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Spawns a worker that the latch waits for.
    pub fn spawn_worker<F>(&self, worker: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.latch.spawn(worker)
    }

    /// Number of spawned workers that have not exited yet.
    pub fn running_workers(&self) -> usize {
        self.latch.len()
    }

    /// Waits until every spawned worker has exited.
    ///
    /// No worker can be spawned after this is called.
    pub async fn wait_for_workers(&self) {
        self.latch.close();
        self.latch.wait().await;
    }
}
