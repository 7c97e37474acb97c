//! One fetch-and-aggregate run.
//!
//! ```text
//! submitter --put--> [requests: bounded] --get--> worker x P --put--> [results: bounded]
//!     |                                             |                       |
//!     +--------------- wait() <---- done() ---------+                 aggregator
//! ```
//!
//! Everything a run touches (channels, barrier, pool, aggregator) is built
//! inside [`Pipeline::run`] and torn down before it returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::aggregator::{AggregateStats, Aggregator};
use crate::barrier::CompletionBarrier;
use crate::channel::bounded;
use crate::config::{DrainMode, PipelineConfig};
use crate::error::AppError;
use crate::models::{OutputTable, Payload, Task};
use crate::pool::WorkerPool;
use crate::traits::Fetcher;
use crate::worker::{TracingWorkerReporter, WorkerReporter, WorkerStats};

/// Counters describing a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub drain: DrainMode,
    pub workers: usize,
    pub submitted: usize,
    pub completed: usize,
    pub delivered: usize,
    pub dropped: BTreeMap<&'static str, usize>,
    pub discarded: usize,
    pub decoded: usize,
    pub sentinels: usize,
    pub rejected: usize,
    pub rows: usize,
    pub columns: usize,
    pub request_capacity: usize,
    pub request_peak: usize,
    pub result_capacity: usize,
    pub result_peak: usize,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Table plus report of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: OutputTable,
    pub report: RunReport,
}

/// Run context: configuration, fetcher and event sink for one batch.
pub struct Pipeline<F, WR = TracingWorkerReporter>
where
    F: Fetcher,
    WR: WorkerReporter,
{
    config: PipelineConfig,
    fetcher: F,
    reporter: Arc<WR>,
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(config: PipelineConfig, fetcher: F) -> Self {
        Self::with_reporter(config, fetcher, TracingWorkerReporter)
    }
}

impl<F, WR> Pipeline<F, WR>
where
    F: Fetcher,
    WR: WorkerReporter,
{
    pub fn with_reporter(config: PipelineConfig, fetcher: F, reporter: WR) -> Self {
        Self {
            config,
            fetcher,
            reporter: Arc::new(reporter),
        }
    }

    /// Submit the batch, wait for every task, and build the table.
    ///
    /// With [`DrainMode::AfterBarrier`] this never returns if more payloads
    /// are delivered than the result channel can hold.
    pub async fn run(&self) -> Result<RunOutput, AppError> {
        self.config.validate()?;
        let started = Instant::now();
        let config = &self.config;

        let (req_tx, req_rx) = bounded::<Task>("requests", config.request_capacity());
        let (res_tx, res_rx) = bounded::<Payload>("results", config.result_capacity());
        let barrier = CompletionBarrier::new();

        let pool = WorkerPool::spawn(
            config.workers,
            &self.fetcher,
            req_rx,
            res_tx,
            &barrier,
            self.reporter.clone(),
            Some(config.timeout),
        );

        let concurrent = match config.drain {
            DrainMode::Concurrent => {
                let results = res_rx.clone();
                Some(tokio::spawn(async move {
                    let mut aggregator = Aggregator::new();
                    let outcome = aggregator.drain_until_closed(&results).await;
                    outcome.map(|()| aggregator)
                }))
            }
            DrainMode::AfterBarrier => None,
        };

        tracing::info!(
            url = %config.target,
            workers = config.workers,
            batch_size = config.batch_size,
            drain = %config.drain,
            "Submitting batch"
        );

        for seq in 0..config.batch_size {
            // Registered before the put so a fast worker cannot finish it first.
            barrier.submit(1);
            req_tx.put(Task::new(seq, config.target.as_str())).await?;
        }
        let request_peak = req_tx.peak();
        drop(req_tx);

        barrier.wait().await;
        tracing::info!(
            completed = barrier.completed(),
            elapsed_ms = millis(started.elapsed()),
            "All tasks accounted for"
        );

        let worker_stats = pool.join().await?;

        let aggregator = match concurrent {
            Some(handle) => handle
                .await
                .map_err(|e| AppError::Worker(format!("aggregator task failed: {e}")))??,
            None => {
                let mut aggregator = Aggregator::new();
                aggregator.drain_buffered(&res_rx)?;
                aggregator
            }
        };

        let (table, stats) = aggregator.finish();
        let report = self.report(
            &barrier,
            &worker_stats,
            stats,
            &table,
            request_peak,
            res_rx.peak(),
            started,
        );

        tracing::info!(
            delivered = report.delivered,
            dropped = report.dropped_total(),
            rows = report.rows,
            sentinels = report.sentinels,
            rejected = report.rejected,
            "Batch aggregated"
        );

        Ok(RunOutput { table, report })
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        barrier: &CompletionBarrier,
        workers: &WorkerStats,
        aggregate: AggregateStats,
        table: &OutputTable,
        request_peak: usize,
        result_peak: usize,
        started: Instant,
    ) -> RunReport {
        RunReport {
            target: self.config.target.clone(),
            drain: self.config.drain,
            workers: self.config.workers,
            submitted: barrier.submitted(),
            completed: barrier.completed(),
            delivered: workers.delivered,
            dropped: workers.dropped.clone(),
            discarded: workers.discarded,
            decoded: aggregate.decoded,
            sentinels: aggregate.sentinels,
            rejected: aggregate.rejected,
            rows: table.rows().len(),
            columns: table.header().len(),
            request_capacity: self.config.request_capacity(),
            request_peak,
            result_capacity: self.config.result_capacity(),
            result_peak,
            elapsed_ms: millis(started.elapsed()),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(5)), 5);
        assert_eq!(millis(Duration::from_micros(1999)), 1);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
