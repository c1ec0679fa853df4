//! Cleaning stage: raw order table to typed, deduplicated order records.
//!
//! Steps, in order:
//!   1. Trim header whitespace and resolve every required column.
//!   2. Parse Order Date / Ship Date: month/day/year first, then day/month/year.
//!   3. Type the categorical columns.
//!   4. Drop exact duplicate rows (first occurrence wins).
//!   5. Coerce Unit Price, Shipping Cost and Quantity; failures become missing.
//!   6. Derive SalesAmountWithoutShipping and SalesAmountWithShipping.
//!
//! Running the stage on its own rendered output changes nothing.

use crate::{
    error::{PipelineError, PipelineResult},
    loader::RawTable,
    order::{
        column, CustomerSegment, OrderPriority, OrderRecord, ProductCategory, ShipMode,
        SubCategory,
    },
    types::StageId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tried in order; the first format that parses wins.
pub const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%d/%m/%Y"];

/// Format used when a cleaned table is rendered back to text.
pub const OUTPUT_DATE_FORMAT: &str = "%m/%d/%Y";

// ── Options and report ───────────────────────────────────────────────────────

/// What to do with a date that matches neither accepted format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePolicy {
    /// Drop rows with an unparseable Order Date; an unparseable
    /// Ship Date becomes missing.
    #[default]
    Drop,
    /// Abort the stage with `ParseFailure`.
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct CleaningOptions {
    pub unparseable_dates: DatePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows:                usize,
    pub rows_dropped_for_dates:    usize,
    pub duplicates_removed:        usize,
    pub missing_numeric_cells:     usize,
    pub ignored_columns:           Vec<String>,
    pub output_rows:               usize,
}

/// Output of the cleaning stage.
///
/// Alongside the typed rows it keeps each surviving row's source cells,
/// so the table can be rendered back with every input column intact.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    pub rows:   Vec<OrderRecord>,
    pub report: CleaningReport,
    headers:    Vec<String>,
    source:     Vec<Vec<String>>,
}

impl CleanedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render back to a raw table in the source column layout.
    ///
    /// Parsed dates are written in `OUTPUT_DATE_FORMAT`, the two derived
    /// sales columns are (re)computed and appended when absent, and every
    /// other cell is written exactly as it was read. Cleaning the result
    /// again yields the same rows.
    pub fn to_raw(&self) -> RawTable {
        let mut headers = self.headers.clone();
        let derived_at: Vec<usize> = column::DERIVED
            .iter()
            .map(|name| match headers.iter().position(|h| h == name) {
                Some(at) => at,
                None => {
                    headers.push(name.to_string());
                    headers.len() - 1
                }
            })
            .collect();
        let position = |name: &str| headers.iter().position(|h| h == name);
        let order_date_at = position(column::ORDER_DATE);
        let ship_date_at = position(column::SHIP_DATE);
        let width = headers.len();

        let mut raw = RawTable::new(headers.clone());
        for (r, source) in self.rows.iter().zip(&self.source) {
            let mut cells: Vec<String> = (0..width)
                .map(|i| source.get(i).cloned().unwrap_or_default())
                .collect();
            if let Some(at) = order_date_at {
                cells[at] = r.order_date.format(OUTPUT_DATE_FORMAT).to_string();
            }
            if let (Some(at), Some(date)) = (ship_date_at, r.ship_date) {
                cells[at] = date.format(OUTPUT_DATE_FORMAT).to_string();
            }
            let derived = [r.sales_without_shipping, r.sales_with_shipping];
            for (&at, amount) in derived_at.iter().zip(derived) {
                cells[at] = amount.map(|v| v.to_string()).unwrap_or_default();
            }
            raw.push_row(cells);
        }
        raw
    }
}

// ── Column layout ────────────────────────────────────────────────────────────

/// Position of each required column within a raw row.
struct ColumnLayout {
    positions: [usize; 13],
    headers:   Vec<String>,
    ignored:   Vec<String>,
    /// Positions left out of the duplicate key: both dates (compared
    /// parsed) and any incoming derived column (recomputed).
    keyless:   Vec<usize>,
}

impl ColumnLayout {
    fn resolve(headers: &[String]) -> PipelineResult<Self> {
        let trimmed: Vec<&str> = headers.iter().map(|h| h.trim()).collect();

        let mut positions = [0usize; 13];
        for (slot, name) in column::REQUIRED.iter().enumerate() {
            positions[slot] = trimmed
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PipelineError::MissingInput {
                    what: format!("column '{name}'"),
                })?;
        }

        let ignored = trimmed
            .iter()
            .filter(|h| !column::REQUIRED.contains(h) && !column::DERIVED.contains(h))
            .map(|h| h.to_string())
            .collect();
        let keyless = trimmed
            .iter()
            .enumerate()
            .filter(|(_, h)| column::DERIVED.contains(h))
            .map(|(at, _)| at)
            .chain([positions[ORDER_DATE], positions[SHIP_DATE]])
            .collect();

        Ok(Self {
            positions,
            headers: trimmed.iter().map(|h| h.to_string()).collect(),
            ignored,
            keyless,
        })
    }

    fn cell<'a>(&self, row: &'a [String], slot: usize) -> &'a str {
        row.get(self.positions[slot]).map(String::as_str).unwrap_or("")
    }
}

// Slots into `column::REQUIRED`.
const ORDER_ID: usize = 0;
const CUSTOMER_ID: usize = 1;
const ORDER_DATE: usize = 2;
const SHIP_DATE: usize = 3;
const PRODUCT_NAME: usize = 4;
const PRODUCT_CATEGORY: usize = 5;
const PRODUCT_SUB_CATEGORY: usize = 6;
const ORDER_PRIORITY: usize = 7;
const CUSTOMER_SEGMENT: usize = 8;
const SHIP_MODE: usize = 9;
const UNIT_PRICE: usize = 10;
const SHIPPING_COST: usize = 11;
const QUANTITY: usize = 12;

// ── Field parsers ────────────────────────────────────────────────────────────

/// Parse a date trying month/day/year before day/month/year.
/// Ambiguous dates such as 03/04/2020 always resolve month-first.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Coerce a decimal cell; anything unparseable (or NaN) is missing.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Coerce an integer cell. Integral decimals such as "3.0" are accepted.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

// ── Duplicate detection ──────────────────────────────────────────────────────

/// A date cell as compared for duplicates: the parsed date, or the text
/// as read when it did not parse.
#[derive(PartialEq, Eq, Hash)]
enum DateKey<'a> {
    Parsed(NaiveDate),
    Unparsed(&'a str),
}

/// Full-row identity of a source row. Dates compare by parsed value and
/// every other cell compares as read, ignored columns included.
#[derive(PartialEq, Eq, Hash)]
struct RowKey<'a> {
    order_date: NaiveDate,
    ship_date:  DateKey<'a>,
    cells:      Vec<&'a str>,
}

impl<'a> RowKey<'a> {
    fn of(
        layout:     &ColumnLayout,
        row:        &'a [String],
        order_date: NaiveDate,
        ship_date:  Option<NaiveDate>,
    ) -> Self {
        let ship_date = match ship_date {
            Some(date) => DateKey::Parsed(date),
            None       => DateKey::Unparsed(layout.cell(row, SHIP_DATE)),
        };
        // Absent trailing cells compare equal to empty ones.
        let cells = (0..layout.headers.len())
            .filter(|at| !layout.keyless.contains(at))
            .map(|at| row.get(at).map(String::as_str).unwrap_or(""))
            .collect();
        Self { order_date, ship_date, cells }
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

/// Clean a raw order table with default options.
pub fn clean(raw: &RawTable) -> PipelineResult<CleanedTable> {
    clean_with(raw, &CleaningOptions::default())
}

pub fn clean_with(raw: &RawTable, options: &CleaningOptions) -> PipelineResult<CleanedTable> {
    if raw.is_empty() {
        return Err(PipelineError::EmptyInput { stage: StageId::Clean });
    }
    let layout = ColumnLayout::resolve(&raw.headers)?;
    if !layout.ignored.is_empty() {
        log::debug!("{}: ignoring columns {:?}", StageId::Clean, layout.ignored);
    }

    let mut report = CleaningReport {
        input_rows: raw.len(),
        ignored_columns: layout.ignored.clone(),
        ..CleaningReport::default()
    };

    let mut rows: Vec<OrderRecord> = Vec::with_capacity(raw.len());
    let mut source: Vec<Vec<String>> = Vec::with_capacity(raw.len());
    let mut seen = HashSet::with_capacity(raw.len());
    for (idx, row) in raw.rows.iter().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let Some(order_date) = resolve_date(&layout, row, ORDER_DATE, line, true, options)? else {
            report.rows_dropped_for_dates += 1;
            continue;
        };
        let ship_date = resolve_date(&layout, row, SHIP_DATE, line, false, options)?;

        // First occurrence wins.
        if !seen.insert(RowKey::of(&layout, row, order_date, ship_date)) {
            report.duplicates_removed += 1;
            continue;
        }

        let record = OrderRecord {
            order_id:               layout.cell(row, ORDER_ID).to_string(),
            customer_id:            layout.cell(row, CUSTOMER_ID).to_string(),
            order_date,
            ship_date,
            product_name:           layout.cell(row, PRODUCT_NAME).to_string(),
            product_category:       ProductCategory::parse(layout.cell(row, PRODUCT_CATEGORY)),
            product_sub_category:   SubCategory::parse(layout.cell(row, PRODUCT_SUB_CATEGORY)),
            order_priority:         OrderPriority::parse(layout.cell(row, ORDER_PRIORITY)),
            customer_segment:       CustomerSegment::parse(layout.cell(row, CUSTOMER_SEGMENT)),
            ship_mode:              ShipMode::parse(layout.cell(row, SHIP_MODE)),
            unit_price:             parse_decimal(layout.cell(row, UNIT_PRICE)),
            shipping_cost:          parse_decimal(layout.cell(row, SHIPPING_COST)),
            quantity:               parse_quantity(layout.cell(row, QUANTITY)),
            sales_without_shipping: None,
            sales_with_shipping:    None,
        };
        rows.push(record.with_derived_amounts());
        source.push(row.clone());
    }

    if report.rows_dropped_for_dates > 0 {
        log::warn!(
            "{}: dropped {} rows with an unparseable {}",
            StageId::Clean,
            report.rows_dropped_for_dates,
            column::ORDER_DATE
        );
    }

    if report.duplicates_removed > 0 {
        log::info!(
            "{}: found {} duplicate rows, removed",
            StageId::Clean,
            report.duplicates_removed
        );
    }

    report.missing_numeric_cells = rows
        .iter()
        .map(|r| {
            usize::from(r.unit_price.is_none())
                + usize::from(r.shipping_cost.is_none())
                + usize::from(r.quantity.is_none())
        })
        .sum();
    if report.missing_numeric_cells > 0 {
        log::warn!(
            "{}: {} numeric cells coerced to missing",
            StageId::Clean,
            report.missing_numeric_cells
        );
    }

    report.output_rows = rows.len();
    if rows.is_empty() {
        return Err(PipelineError::EmptyInput { stage: StageId::Clean });
    }

    log::info!(
        "{}: {} rows in, {} rows out",
        StageId::Clean,
        report.input_rows,
        report.output_rows
    );
    Ok(CleanedTable {
        rows,
        report,
        headers: layout.headers,
        source,
    })
}

/// Parse one date cell under the configured policy.
///
/// `Ok(None)` means missing: for the order date the caller drops the row.
fn resolve_date(
    layout:   &ColumnLayout,
    row:      &[String],
    slot:     usize,
    line:     usize,
    required: bool,
    options:  &CleaningOptions,
) -> PipelineResult<Option<NaiveDate>> {
    let raw = layout.cell(row, slot);
    if let Some(date) = parse_date(raw) {
        return Ok(Some(date));
    }
    let blank = raw.trim().is_empty();
    match options.unparseable_dates {
        DatePolicy::Fail if required || !blank => Err(PipelineError::ParseFailure {
            row:    line,
            column: column::REQUIRED[slot].to_string(),
            value:  raw.to_string(),
        }),
        _ => {
            if !blank && !required {
                log::warn!(
                    "{}: line {line}: unparseable {} '{raw}', treated as missing",
                    StageId::Clean,
                    column::REQUIRED[slot]
                );
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_first_wins_for_ambiguous_dates() {
        assert_eq!(parse_date("03/04/2020"), NaiveDate::from_ymd_opt(2020, 3, 4));
    }

    #[test]
    fn falls_back_to_day_first() {
        assert_eq!(parse_date("25/12/2011"), NaiveDate::from_ymd_opt(2011, 12, 25));
        assert_eq!(parse_date(" 1/2/2012 "), NaiveDate::from_ymd_opt(2012, 1, 2));
    }

    #[test]
    fn rejects_other_formats() {
        assert_eq!(parse_date("2012-01-02"), None);
        assert_eq!(parse_date("13/13/2012"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(parse_decimal(" 12.5 "), Some(12.5));
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_quantity("7"), Some(7));
        assert_eq!(parse_quantity("7.0"), Some(7));
        assert_eq!(parse_quantity("7.5"), None);
        assert_eq!(parse_quantity(""), None);
    }
}
