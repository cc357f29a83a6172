//! Result shaping.
//!
//! Turns the raw pages of a result set into the header-stripped,
//! string-celled `QueryResult` callers see.

use std::time::Duration;

use crate::athena::{QueryResult, RawResultSet, RawRow, Row};

/// Shapes a raw result set.
///
/// The first raw row echoes the column names and is dropped. Missing cell
/// values become empty strings, and every row is padded or cut to the
/// column count. Pure: the same input always yields the same output.
pub fn shape_result(raw: &RawResultSet) -> QueryResult {
    let width = raw.columns.len();
    let rows: Vec<Row> = raw
        .rows
        .iter()
        .skip(1)
        .map(|row| shape_row(row, width))
        .collect();

    QueryResult {
        columns: raw.columns.clone(),
        row_count: rows.len(),
        rows,
        execution_time: Duration::ZERO,
        was_truncated: raw.was_truncated,
    }
}

fn shape_row(raw: &RawRow, width: usize) -> Row {
    let mut row: Row = raw
        .iter()
        .map(|cell| cell.clone().unwrap_or_default())
        .collect();
    // No metadata means no width to enforce.
    if width > 0 {
        row.resize(width, String::new());
    }
    row
}
