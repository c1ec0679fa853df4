//! Order file loader: the extraction stage.
//!
//! Reads a comma-delimited order export with a header row into a
//! `RawTable`. Nothing is typed or trimmed here; header names and cells
//! are kept exactly as they appear so the cleaner owns every decision.
//!
//! RULE: A short row is padded with empty cells to the header width and
//! flows on as missing values. A row wider than the header has cells no
//! column can own, so it fails extraction.

use crate::{
    error::{PipelineError, PipelineResult},
    types::StageId,
};
use std::io::Read;

/// Untyped order table as read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows:    Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. Callers are trusted to match the header width;
    /// `load_orders` enforces it for file input.
    pub fn push_row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }
}

/// Load an order table from any CSV reader.
pub fn load_orders<R: Read>(reader: R) -> PipelineResult<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::MissingInput { what: "header row".into() });
    }

    let width = headers.len();
    let mut table = RawTable::new(headers);
    let mut padded = 0usize;
    for result in csv_reader.records() {
        let record = result?;
        if record.len() > width {
            return Err(PipelineError::MalformedRow {
                line:     record.position().map_or(table.rows.len() as u64 + 2, |p| p.line()),
                expected: width,
                found:    record.len(),
            });
        }
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        if cells.len() < width {
            padded += 1;
            cells.resize(width, String::new());
        }
        table.rows.push(cells);
    }
    if padded > 0 {
        log::warn!(
            "{}: {padded} short rows padded with missing cells",
            StageId::Extract
        );
    }

    log::info!(
        "{}: extracted {} rows x {} columns",
        StageId::Extract,
        table.rows.len(),
        table.headers.len()
    );
    Ok(table)
}

/// Load an order table from a file path.
pub fn load_orders_file(path: &str) -> PipelineResult<RawTable> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::MissingInput {
            what: format!("order file '{path}'"),
        },
        _ => PipelineError::Io(e),
    })?;
    load_orders(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Order ID, Customer ID ,Order Date
1,C1,01/15/2012
2,C2,02/20/2012
";

    #[test]
    fn keeps_headers_and_cells_verbatim() {
        let table = load_orders(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Order ID", " Customer ID ", "Order Date"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["2", "C2", "02/20/2012"]);
    }

    #[test]
    fn short_rows_are_padded() {
        let data = "a,b,c\n1,2,3\n4\n";
        let table = load_orders(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["4", "", ""]);
    }

    #[test]
    fn wide_rows_are_rejected() {
        let data = "a,b\n1,2\n3,4,5\n";
        match load_orders(data.as_bytes()).unwrap_err() {
            PipelineError::MalformedRow { line, expected, found } => {
                assert_eq!((line, expected, found), (3, 2, 3));
            }
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = load_orders_file("/definitely/not/here/orders.csv").unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
