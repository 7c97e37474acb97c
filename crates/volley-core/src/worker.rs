use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::barrier::CompletionBarrier;
use crate::channel::{Receiver, Sender};
use crate::models::{DropReason, Outcome, Payload, Task};
use crate::traits::Fetcher;

/// Events emitted by workers for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: usize,
    },
    TaskStarted {
        worker_id: usize,
        task: &'a Task,
    },
    Delivered {
        worker_id: usize,
        seq: usize,
        bytes: usize,
    },
    Dropped {
        worker_id: usize,
        seq: usize,
        reason: &'a DropReason,
    },
    /// The result channel was closed before the payload could be enqueued.
    Discarded {
        worker_id: usize,
        seq: usize,
    },
    Stopped {
        worker_id: usize,
        processed: usize,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync + 'static {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::trace!(worker_id, "Worker started");
            }
            WorkerEvent::TaskStarted { worker_id, task } => {
                tracing::trace!(worker_id, seq = task.seq, url = %task.url, "Fetching");
            }
            WorkerEvent::Delivered {
                worker_id,
                seq,
                bytes,
            } => {
                tracing::debug!(worker_id, seq, bytes, "Payload delivered");
            }
            WorkerEvent::Dropped {
                worker_id,
                seq,
                reason,
            } => {
                tracing::debug!(worker_id, seq, %reason, "Task dropped");
            }
            WorkerEvent::Discarded { worker_id, seq } => {
                tracing::warn!(worker_id, seq, "Result channel closed, payload discarded");
            }
            WorkerEvent::Stopped {
                worker_id,
                processed,
            } => {
                tracing::trace!(worker_id, processed, "Worker stopped");
            }
        }
    }
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl WorkerReporter for NullReporter {}

/// Per-worker tallies, summed by the pool when it is joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: usize,
    pub delivered: usize,
    /// Dropped tasks keyed by [`DropReason::class`].
    pub dropped: BTreeMap<&'static str, usize>,
    /// Payloads fetched but not enqueued because the result channel closed.
    pub discarded: usize,
}

impl WorkerStats {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.processed += other.processed;
        self.delivered += other.delivered;
        self.discarded += other.discarded;
        for (class, n) in &other.dropped {
            *self.dropped.entry(*class).or_default() += n;
        }
    }
}

/// One pool member: pulls tasks until the request channel closes.
pub struct Worker<F: Fetcher> {
    id: usize,
    fetcher: F,
    requests: Receiver<Task>,
    results: Sender<Payload>,
    barrier: CompletionBarrier,
    timeout: Option<Duration>,
}

impl<F: Fetcher> Worker<F> {
    pub fn new(
        id: usize,
        fetcher: F,
        requests: Receiver<Task>,
        results: Sender<Payload>,
        barrier: CompletionBarrier,
    ) -> Self {
        Self {
            id,
            fetcher,
            requests,
            results,
            barrier,
            timeout: None,
        }
    }

    /// Give up on a fetch after `timeout`, on top of whatever the fetcher enforces.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run until the request channel is closed and drained.
    ///
    /// Returns what this worker did over its lifetime.
    pub async fn run<WR: WorkerReporter>(self, reporter: &WR) -> WorkerStats {
        reporter.report(WorkerEvent::Started { worker_id: self.id });

        let mut stats = WorkerStats::default();
        while let Some(task) = self.requests.get().await {
            // Marks the task done on every path out of this iteration.
            let _completion = self.barrier.completion();
            self.process(&task, reporter, &mut stats).await;
            stats.processed += 1;
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: self.id,
            processed: stats.processed,
        });
        stats
    }

    async fn process<WR: WorkerReporter>(
        &self,
        task: &Task,
        reporter: &WR,
        stats: &mut WorkerStats,
    ) {
        reporter.report(WorkerEvent::TaskStarted {
            worker_id: self.id,
            task,
        });

        match self.fetch(&task.url).await {
            Outcome::Payload(payload) => {
                let bytes = payload.len();
                match self.results.put(payload).await {
                    Ok(()) => {
                        stats.delivered += 1;
                        reporter.report(WorkerEvent::Delivered {
                            worker_id: self.id,
                            seq: task.seq,
                            bytes,
                        });
                    }
                    Err(_) => {
                        stats.discarded += 1;
                        reporter.report(WorkerEvent::Discarded {
                            worker_id: self.id,
                            seq: task.seq,
                        });
                    }
                }
            }
            Outcome::Dropped(reason) => {
                *stats.dropped.entry(reason.class()).or_default() += 1;
                reporter.report(WorkerEvent::Dropped {
                    worker_id: self.id,
                    seq: task.seq,
                    reason: &reason,
                });
            }
        }
    }

    async fn fetch(&self, url: &str) -> Outcome {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(url))
                .await
                .unwrap_or(Outcome::Dropped(DropReason::Timeout)),
            None => self.fetcher.fetch(url).await,
        }
    }
}
