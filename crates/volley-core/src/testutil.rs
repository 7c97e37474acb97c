//! Test utilities: mock fetchers and payload fixtures.
//!
//! Handwritten mocks for dependency injection in unit and integration tests.
//! All mocks share state through `Arc`, so clones handed to workers still
//! report into the same counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::decode::encode_record;
use crate::models::{DropReason, Outcome, Payload};
use crate::traits::Fetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FetchStats {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Mock fetcher with scripted outcomes and concurrency accounting.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each call pops the first element; when empty, `fallback` is returned.
    script: Arc<Mutex<VecDeque<Outcome>>>,
    fallback: Outcome,
    delay: Duration,
    stats: Arc<FetchStats>,
}

impl MockFetcher {
    /// Every call returns `outcome`.
    pub fn always(outcome: Outcome) -> Self {
        Self::build(VecDeque::new(), outcome)
    }

    /// Calls return `outcomes` in order, then drop with a transport error.
    pub fn with_outcomes(outcomes: Vec<Outcome>) -> Self {
        Self::build(
            outcomes.into(),
            Outcome::Dropped(DropReason::Transport("script exhausted".into())),
        )
    }

    /// Every call fails at the transport level.
    pub fn failing() -> Self {
        Self::always(Outcome::Dropped(DropReason::Connect(
            "connection refused".into(),
        )))
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn build(script: VecDeque<Outcome>, fallback: Outcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            fallback,
            delay: Duration::ZERO,
            stats: Arc::new(FetchStats::default()),
        }
    }

    /// Total number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.stats.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running `fetch` calls.
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        let mut script = self.script.lock().unwrap();
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Outcome {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.next_outcome();

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Successful outcome carrying `record` double-encoded.
pub fn record_outcome(record: serde_json::Value) -> Outcome {
    Outcome::Payload(encode_record(&record))
}

/// Successful outcome carrying the `{}` sentinel.
pub fn sentinel_outcome() -> Outcome {
    Outcome::Payload(Payload::from(r#""{}""#))
}

/// Successful outcome whose body is not JSON.
pub fn malformed_outcome() -> Outcome {
    Outcome::Payload(Payload::from("<html>Internal Server Error</html>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let fetcher = MockFetcher::with_outcomes(vec![record_outcome(json!({"a": 1}))]);
        assert!(fetcher.fetch("http://x").await.is_payload());
        assert!(!fetcher.fetch("http://x").await.is_payload());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let fetcher = MockFetcher::failing();
        let clone = fetcher.clone();
        clone.fetch("http://x").await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fetcher.peak_in_flight(), 1);
    }
}
