//! Turns delivered payloads into a uniform [`OutputTable`].
//!
//! The first accepted record fixes the schema for the whole run. Later
//! records whose field set differs are rejected (logged, counted, left out of
//! the table). A payload that fails to decode aborts aggregation.

use serde::Serialize;

use crate::channel::Receiver;
use crate::decode::{DecodeError, Decoded, decode_payload};
use crate::models::{OutputTable, Payload, Schema, SchemaMismatch};

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Became a table row.
    Accepted,
    /// Inner `{}`; skipped.
    Sentinel,
    /// Field set differs from the schema; skipped.
    Rejected(SchemaMismatch),
}

/// Aggregation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub decoded: usize,
    pub sentinels: usize,
    pub rejected: usize,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    schema: Option<Schema>,
    rows: Vec<Vec<serde_json::Value>>,
    stats: AggregateStats,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one payload and fold it into the table.
    pub fn push(&mut self, payload: &Payload) -> Result<Disposition, DecodeError> {
        let record = match decode_payload(payload)? {
            Decoded::Sentinel => {
                self.stats.sentinels += 1;
                return Ok(Disposition::Sentinel);
            }
            Decoded::Record(record) => record,
        };
        self.stats.decoded += 1;

        let schema = self.schema.get_or_insert_with(|| {
            let schema = Schema::from_record(&record);
            tracing::info!(columns = ?schema.fields(), "Schema fixed by first record");
            schema
        });

        if let Err(mismatch) = schema.check(&record) {
            tracing::warn!(%mismatch, "Record does not match schema, row rejected");
            self.stats.rejected += 1;
            return Ok(Disposition::Rejected(mismatch));
        }

        self.rows.push(schema.project(&record));
        Ok(Disposition::Accepted)
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn finish(self) -> (OutputTable, AggregateStats) {
        (OutputTable::new(self.schema, self.rows), self.stats)
    }

    /// Consume payloads until every sender is gone.
    ///
    /// On a decode error the channel is closed, so producers blocked on a full
    /// channel are released instead of waiting forever.
    pub async fn drain_until_closed(
        &mut self,
        results: &Receiver<Payload>,
    ) -> Result<(), DecodeError> {
        while let Some(payload) = results.get().await {
            if let Err(e) = self.push(&payload) {
                results.close();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Consume only what is buffered right now, without waiting for more.
    pub fn drain_buffered(&mut self, results: &Receiver<Payload>) -> Result<(), DecodeError> {
        tracing::debug!(buffered = results.len(), "Draining buffered payloads");
        while let Some(payload) = results.try_get() {
            self.push(&payload)?;
        }
        Ok(())
    }
}
