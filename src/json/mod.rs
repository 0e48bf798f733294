//! Purpose: JSON boundary for rows: newline-delimited input and rendered output.
//! Exports: `JsonRow`, `JsonList`, `row_to_json`, `parse_rows`.
//! Role: Keeps serde_json usage out of the core encoder and stores.
//! Invariants: Blank lines are skipped; any other line must be one JSON value.

mod row;

pub use row::{JsonList, JsonRow, row_to_json};

use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

/// Parse newline-delimited JSON; errors carry the 0-based line as the row.
pub fn parse_rows(input: &str) -> Result<Vec<Value>, Error> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line, text)| {
            serde_json::from_str(text).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid JSON row")
                    .with_hint("Input must hold one JSON object per line.")
                    .with_row(line)
                    .with_source(err)
            })
        })
        .collect()
}
