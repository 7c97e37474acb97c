//! Fixed-size pool of [`Worker`]s sharing one request channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::barrier::CompletionBarrier;
use crate::channel::{Receiver, Sender};
use crate::error::AppError;
use crate::models::{Payload, Task};
use crate::traits::Fetcher;
use crate::worker::{Worker, WorkerReporter, WorkerStats};

/// Handles to `P` spawned workers.
///
/// Workers run until the request channel is closed and drained, so the pool
/// is joined after the submitter drops its sender.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime.
    ///
    /// Each worker gets its own clone of both channel ends; the caller's
    /// `results` sender is consumed so the result channel closes once every
    /// worker has exited.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<F, WR>(
        size: usize,
        fetcher: &F,
        requests: Receiver<Task>,
        results: Sender<Payload>,
        barrier: &CompletionBarrier,
        reporter: Arc<WR>,
        timeout: Option<Duration>,
    ) -> Self
    where
        F: Fetcher,
        WR: WorkerReporter,
    {
        let handles = (0..size)
            .map(|id| {
                let mut worker = Worker::new(
                    id,
                    fetcher.clone(),
                    requests.clone(),
                    results.clone(),
                    barrier.clone(),
                );
                if let Some(limit) = timeout {
                    worker = worker.with_timeout(limit);
                }
                let reporter = reporter.clone();
                tokio::spawn(async move { worker.run(reporter.as_ref()).await })
            })
            .collect();

        tracing::debug!(workers = size, "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit and sum their stats.
    pub async fn join(self) -> Result<WorkerStats, AppError> {
        let mut total = WorkerStats::default();
        let mut failures = 0;
        for handle in self.handles {
            match handle.await {
                Ok(stats) => total.merge(&stats),
                Err(e) => {
                    tracing::error!(error = %e, "Worker task failed");
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            return Err(AppError::Worker(format!("{failures} worker(s) panicked")));
        }
        Ok(total)
    }
}
