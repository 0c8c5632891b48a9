//! JSON snapshots of finished records
//!
//! A snapshot is a JSON array of `{unit, parent, children, usage,
//! real_usage}` objects with usage in bytes. The graph merger reads the same
//! shape back.

use crate::record::PersistedRecord;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Serialize records as a pretty-printed JSON array
pub fn to_json<T: serde::Serialize>(records: &[T]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize records")
}

/// Write records to `writer`, newline-terminated
pub fn write_records<W: Write, T: serde::Serialize>(writer: &mut W, records: &[T]) -> Result<()> {
    let json = to_json(records)?;
    writer
        .write_all(json.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .context("Failed to write records")
}

/// Parse a JSON snapshot
pub fn parse_records(json: &str) -> Result<Vec<PersistedRecord>> {
    serde_json::from_str(json).context("Invalid record snapshot")
}

/// Read a JSON snapshot from disk
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<PersistedRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file: {}", path.display()))?;
    parse_records(&content).with_context(|| format!("In {}", path.display()))
}
