use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::AppError;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 200;
/// Default number of tasks submitted per run.
pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(500);

/// When the aggregator consumes the result channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrainMode {
    /// Aggregate while workers are still producing.
    #[default]
    Concurrent,
    /// Wait for the completion barrier, then drain whatever is buffered.
    ///
    /// Hangs forever once more payloads arrive than the result channel holds.
    AfterBarrier,
}

impl DrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainMode::Concurrent => "concurrent",
            DrainMode::AfterBarrier => "after-barrier",
        }
    }
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DrainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concurrent" => Ok(DrainMode::Concurrent),
            "after-barrier" | "after_barrier" => Ok(DrainMode::AfterBarrier),
            _ => Err(format!("Unknown drain mode: {}", s)),
        }
    }
}

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Endpoint fetched by every task.
    pub target: String,
    /// Pool size `P`.
    pub workers: usize,
    /// Number of tasks `N` submitted.
    pub batch_size: usize,
    /// Per-request timeout handed to the fetcher.
    pub timeout: Duration,
    /// Request channel capacity; `None` means 2 × workers.
    pub request_capacity: Option<usize>,
    /// Result channel capacity; `None` means 2 × workers.
    pub result_capacity: Option<usize>,
    pub drain: DrainMode,
}

impl PipelineConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
            request_capacity: None,
            result_capacity: None,
            drain: DrainMode::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = Some(capacity);
        self
    }

    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = Some(capacity);
        self
    }

    pub fn with_drain(mut self, drain: DrainMode) -> Self {
        self.drain = drain;
        self
    }

    pub fn request_capacity(&self) -> usize {
        self.request_capacity
            .unwrap_or_else(|| self.workers.saturating_mul(2))
    }

    pub fn result_capacity(&self) -> usize {
        self.result_capacity
            .unwrap_or_else(|| self.workers.saturating_mul(2))
    }

    /// Reject configurations that cannot run.
    ///
    /// Logs a warning (but accepts) an after-barrier drain whose result
    /// channel is smaller than the batch.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("batch size must be at least 1".into()));
        }
        if self.request_capacity() == 0 || self.result_capacity() == 0 {
            return Err(AppError::Config(
                "channel capacity must be at least 1".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(AppError::Config("timeout must be non-zero".into()));
        }

        let url = Url::parse(&self.target)
            .map_err(|e| AppError::Config(format!("Invalid target URL {}: {e}", self.target)))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::Config(format!(
                    "Target scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(AppError::Config("Target URL has no host".into()));
        }

        if self.hangs_on_full_results() {
            tracing::warn!(
                batch_size = self.batch_size,
                result_capacity = self.result_capacity(),
                "after-barrier drain with result capacity below batch size can deadlock"
            );
        }
        Ok(())
    }

    /// True when an after-barrier run would deadlock if every task succeeded.
    pub fn hangs_on_full_results(&self) -> bool {
        self.drain == DrainMode::AfterBarrier && self.result_capacity() < self.batch_size
    }
}
