use std::path::Path;

use anyhow::{Context, Result};
use volley_core::OutputTable;

/// Render the table as CSV: header row, then one line per row.
///
/// An empty table (no record accepted) renders as an empty document.
pub fn render_csv(table: &OutputTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !table.header().is_empty() {
        writer.write_record(table.header())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(cell))?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e.error()))
}

/// Render in memory first, then write the file in one go.
pub fn write_csv(table: &OutputTable, path: &Path) -> Result<()> {
    let bytes = render_csv(table)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write output table: {}", path.display()))
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
