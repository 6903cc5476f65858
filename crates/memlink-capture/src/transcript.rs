//! Session transcript reader.
//!
//! Transcripts are newline-delimited JSON written by the host while the
//! session runs, so the last line may be half-written, possibly in the middle
//! of a multi-byte character. Lines are parsed as raw bytes; malformed lines
//! (bad JSON or bad UTF-8) are skipped and counted and never abort the read.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;

/// Parse JSONL bytes, skipping blank and malformed lines.
pub fn parse_transcript(bytes: &[u8]) -> Vec<Value> {
    let mut skipped = 0usize;
    let records: Vec<Value> = bytes
        .split(|b| *b == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_slice::<Value>(line) {
            Ok(v) if v.is_object() => Some(v),
            _ => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, kept = records.len(), "skipped malformed transcript lines");
    }
    records
}

/// Read and parse a transcript file.
pub async fn read_transcript(path: &Path) -> Result<Vec<Value>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(parse_transcript(&bytes))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
