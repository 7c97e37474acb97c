use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use volley_core::testutil::{
    MockFetcher, malformed_outcome, record_outcome, sentinel_outcome,
};
use volley_core::{AppError, DecodeError, DrainMode, DropReason, NullReporter, Outcome, Pipeline};

use crate::common::{config, row_set};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_trip_five_identical_records() {
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1, "b": 2})));
    let pipeline = Pipeline::with_reporter(config(3, 5), fetcher, NullReporter);

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.table.header(), ["a", "b"]);
    assert_eq!(output.table.rows().len(), 5);
    for record in output.table.records() {
        assert_eq!(serde_json::Value::Object(record), json!({"a": 1, "b": 2}));
    }
    assert_eq!(output.report.submitted, 5);
    assert_eq!(output.report.delivered, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sentinel_payload_is_excluded() {
    let fetcher = MockFetcher::with_outcomes(vec![
        record_outcome(json!({"a": 1})),
        sentinel_outcome(),
        record_outcome(json!({"a": 2})),
    ]);
    let pipeline = Pipeline::with_reporter(config(2, 3), fetcher, NullReporter);

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.table.rows().len(), 2);
    assert_eq!(output.report.sentinels, 1);
    assert_eq!(
        row_set(&output.table),
        [r#"{"a":1}"#, r#"{"a":2}"#]
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn barrier_accounts_for_every_task() {
    // Deterministic mix: 7 delivered, 5 dropped for assorted reasons.
    let mut outcomes = Vec::new();
    for i in 0..12 {
        outcomes.push(match i % 12 {
            0 | 3 | 6 | 9 => Outcome::Dropped(DropReason::Status(503)),
            11 => Outcome::Dropped(DropReason::Timeout),
            n => record_outcome(json!({"n": n})),
        });
    }
    let fetcher = MockFetcher::with_outcomes(outcomes).with_delay(Duration::from_millis(5));
    let pipeline = Pipeline::with_reporter(config(4, 12), fetcher.clone(), NullReporter);

    let output = pipeline.run().await.unwrap();
    let report = output.report;

    assert_eq!(report.submitted, 12);
    assert_eq!(report.completed, 12);
    assert_eq!(report.delivered + report.dropped_total(), 12);
    assert_eq!(report.delivered, 7);
    assert_eq!(report.dropped.get("status"), Some(&4));
    assert_eq!(report.dropped.get("timeout"), Some(&1));
    assert_eq!(fetcher.calls(), 12);
    assert_eq!(output.table.rows().len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn always_failing_transport_still_completes() {
    let fetcher = MockFetcher::failing();
    let pipeline = Pipeline::with_reporter(config(8, 50), fetcher.clone(), NullReporter);

    let output = tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("run must finish when every call fails")
        .unwrap();

    assert!(output.table.is_empty());
    assert!(output.table.header().is_empty());
    assert_eq!(output.report.completed, 50);
    assert_eq!(output.report.dropped.get("connect"), Some(&50));
    assert_eq!(fetcher.calls(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_fetches_bounded_by_pool_size() {
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1})))
        .with_delay(Duration::from_millis(10));
    let pipeline = Pipeline::with_reporter(config(5, 60), fetcher.clone(), NullReporter);

    pipeline.run().await.unwrap();

    assert!(fetcher.peak_in_flight() <= 5, "peak {}", fetcher.peak_in_flight());
    assert!(fetcher.peak_in_flight() >= 2, "workers should overlap");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn channel_occupancy_stays_within_capacity() {
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1})))
        .with_delay(Duration::from_millis(1));
    let cfg = config(6, 300)
        .with_request_capacity(4)
        .with_result_capacity(3);
    let pipeline = Pipeline::with_reporter(cfg, fetcher, NullReporter);

    let output = pipeline.run().await.unwrap();
    let report = output.report;

    assert_eq!(report.rows, 300);
    assert!(report.request_peak <= 4, "request peak {}", report.request_peak);
    assert!(report.result_peak <= 3, "result peak {}", report.result_peak);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_drain_survives_small_result_channel() {
    // 20 guaranteed successes through a result channel holding 2.
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1})));
    let cfg = config(4, 20).with_result_capacity(2);
    let pipeline = Pipeline::with_reporter(cfg, fetcher, NullReporter);

    let output = tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("concurrent drain must not deadlock")
        .unwrap();

    assert_eq!(output.table.rows().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn after_barrier_drain_reproduces_deadlock() {
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1})));
    let cfg = config(4, 20)
        .with_result_capacity(2)
        .with_drain(DrainMode::AfterBarrier);
    assert!(cfg.hangs_on_full_results());
    let pipeline = Pipeline::with_reporter(cfg, fetcher, NullReporter);

    let hung = tokio::time::timeout(Duration::from_millis(500), pipeline.run()).await;
    assert!(hung.is_err(), "after-barrier drain should hang past capacity");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn after_barrier_drain_works_within_capacity() {
    let fetcher = MockFetcher::always(record_outcome(json!({"a": 1, "b": "x"})));
    let cfg = config(4, 8)
        .with_result_capacity(8)
        .with_drain(DrainMode::AfterBarrier);
    let pipeline = Pipeline::with_reporter(cfg, fetcher, NullReporter);

    let output = pipeline.run().await.unwrap();
    assert_eq!(output.table.rows().len(), 8);
    assert_eq!(output.report.drain, DrainMode::AfterBarrier);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_payload_aborts_run() {
    let fetcher = MockFetcher::with_outcomes(vec![
        record_outcome(json!({"a": 1})),
        malformed_outcome(),
        record_outcome(json!({"a": 2})),
    ]);
    let pipeline = Pipeline::with_reporter(config(1, 3), fetcher, NullReporter);

    let err = tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("decode failure must not hang the run")
        .unwrap_err();

    assert!(matches!(err, AppError::Decode(DecodeError::OuterNotJson(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mismatched_records_are_rejected() {
    let fetcher = MockFetcher::with_outcomes(vec![
        record_outcome(json!({"a": 1, "b": 2})),
        record_outcome(json!({"a": 3})),
        record_outcome(json!({"a": 4, "b": 5, "c": 6})),
        record_outcome(json!({"b": 8, "a": 7})),
    ]);
    // Single worker keeps the first record first.
    let pipeline = Pipeline::with_reporter(config(1, 4), fetcher, NullReporter);

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.table.header(), ["a", "b"]);
    assert_eq!(output.report.rejected, 2);
    assert_eq!(
        row_set(&output.table),
        [r#"{"a":1,"b":2}"#, r#"{"a":7,"b":8}"#]
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>()
    );
}

#[tokio::test]
async fn invalid_config_fails_before_fetching() {
    let fetcher = MockFetcher::failing();
    let pipeline = Pipeline::with_reporter(config(0, 5), fetcher.clone(), NullReporter);

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(fetcher.calls(), 0);
}
