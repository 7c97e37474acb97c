use std::fmt;

use serde::Serialize;

/// One unit of fetch work: a single GET against `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// 0-based submission index, only used for logging.
    pub seq: usize,
    pub url: String,
}

impl Task {
    pub fn new(seq: usize, url: impl Into<String>) -> Self {
        Self {
            seq,
            url: url.into(),
        }
    }
}

/// Raw response body of a successful fetch, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(body: &str) -> Self {
        Self(body.as_bytes().to_vec())
    }
}

/// Why a task produced no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Request exceeded the per-call timeout.
    Timeout,
    /// DNS, TCP or TLS connection could not be established.
    Connect(String),
    /// Server answered with something other than 200.
    Status(u16),
    /// 200 but the body could not be read, or was empty.
    Body(String),
    /// Any other transport failure.
    Transport(String),
}

impl DropReason {
    /// Stable short label, used as a counter key in the run report.
    pub fn class(&self) -> &'static str {
        match self {
            DropReason::Timeout => "timeout",
            DropReason::Connect(_) => "connect",
            DropReason::Status(_) => "status",
            DropReason::Body(_) => "body",
            DropReason::Transport(_) => "transport",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Timeout => write!(f, "request timed out"),
            DropReason::Connect(msg) => write!(f, "connection failed: {msg}"),
            DropReason::Status(code) => write!(f, "HTTP {code}"),
            DropReason::Body(msg) => write!(f, "unreadable body: {msg}"),
            DropReason::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Terminal classification of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Payload(Payload),
    Dropped(DropReason),
}

impl Outcome {
    pub fn is_payload(&self) -> bool {
        matches!(self, Outcome::Payload(_))
    }
}

/// A doubly-decoded JSON object. Key order follows the inner JSON text.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Ordered column names, fixed by the first accepted record of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn from_record(record: &Record) -> Self {
        Self {
            fields: record.keys().cloned().collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compare a record's field set with this schema.
    pub fn check(&self, record: &Record) -> Result<(), SchemaMismatch> {
        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !record.contains_key(f.as_str()))
            .cloned()
            .collect();
        let extra: Vec<String> = record
            .keys()
            .filter(|k| !self.fields.contains(k))
            .cloned()
            .collect();

        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(SchemaMismatch { missing, extra })
        }
    }

    /// Project a record onto the schema's column order.
    ///
    /// Callers are expected to [`check`](Self::check) first; absent fields
    /// come out as `null`.
    pub fn project(&self, record: &Record) -> Vec<serde_json::Value> {
        self.fields
            .iter()
            .map(|f| record.get(f).cloned().unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

/// Field-set difference between a record and the run's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing fields [{}], unexpected fields [{}]",
            self.missing.join(", "),
            self.extra.join(", ")
        )
    }
}

/// Uniform table: one header, rows in drain order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputTable {
    schema: Option<Schema>,
    rows: Vec<Vec<serde_json::Value>>,
}

impl OutputTable {
    pub(crate) fn new(schema: Option<Schema>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { schema, rows }
    }

    /// Column names. Empty when no record was accepted.
    pub fn header(&self) -> &[String] {
        self.schema.as_ref().map(Schema::fields).unwrap_or(&[])
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn rows(&self) -> &[Vec<serde_json::Value>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as records keyed by column name, for order-insensitive comparison.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.header()
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}
