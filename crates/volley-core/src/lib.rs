pub mod aggregator;
pub mod barrier;
pub mod channel;
pub mod config;
pub mod decode;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod testutil;
pub mod traits;
pub mod worker;

pub use aggregator::{AggregateStats, Aggregator, Disposition};
pub use barrier::{Completion, CompletionBarrier};
pub use config::{DrainMode, PipelineConfig};
pub use decode::{DecodeError, Decoded, decode_payload, encode_record};
pub use error::AppError;
pub use models::{
    DropReason, Outcome, OutputTable, Payload, Record, Schema, SchemaMismatch, Task,
};
pub use pipeline::{Pipeline, RunOutput, RunReport};
pub use traits::Fetcher;
pub use worker::{NullReporter, TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerStats};
