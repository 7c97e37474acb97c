use std::collections::HashSet;

use volley_core::{OutputTable, PipelineConfig};

pub const TARGET: &str = "http://telemetry.test/final";

/// Small config suitable for mocks: quick timeout, tiny pool.
pub fn config(workers: usize, batch_size: usize) -> PipelineConfig {
    PipelineConfig::new(TARGET)
        .with_workers(workers)
        .with_batch_size(batch_size)
        .with_timeout(std::time::Duration::from_secs(5))
}

/// Rows rendered to strings, so tables compare as sets regardless of drain order.
pub fn row_set(table: &OutputTable) -> HashSet<String> {
    table
        .records()
        .iter()
        .map(|r| serde_json::Value::Object(r.clone()).to_string())
        .collect()
}
