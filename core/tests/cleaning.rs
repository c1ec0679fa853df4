//! Cleaning stage tests.

use chrono::NaiveDate;
use superstore_core::{
    cleaning_stage::{clean, clean_with, CleaningOptions, DatePolicy},
    error::PipelineError,
    loader::{load_orders, RawTable},
    order::{CustomerSegment, OrderPriority, ProductCategory, ShipMode},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

const HEADER: &str = "Order ID,Customer ID,Order Date,Ship Date,Product Name,Product Category,\
Product Sub-Category,Order Priority,Customer Segment,Ship Mode,Unit Price,Shipping Cost,Quantity";

fn table(rows: &[&str]) -> RawTable {
    let mut csv = format!("{HEADER}\n");
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    load_orders(csv.as_bytes()).unwrap()
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const ROW_A: &str = "1,C1,01/15/2012,01/17/2012,Widget,Technology,Telephones,High,Consumer,Regular Air,2.5,1,4";
const ROW_B: &str = "2,C2,02/20/2012,02/22/2012,Chair,Furniture,Chairs,Low,Corporate,Delivery Truck,100,10,1";

// ── Tests ────────────────────────────────────────────────────────────────────

/// An exact duplicate row is removed; the output holds one row per distinct row.
#[test]
fn duplicate_rows_are_removed() {
    let cleaned = clean(&table(&[ROW_A, ROW_B, ROW_A])).unwrap();

    assert_eq!(cleaned.len(), 2);
    assert_eq!(cleaned.report.input_rows, 3);
    assert_eq!(cleaned.report.duplicates_removed, 1);
    assert_eq!(cleaned.report.output_rows, 2);
    assert_eq!(cleaned.rows[0].order_id, "1");
    assert_eq!(cleaned.rows[1].order_id, "2");
}

/// Rows that differ only in date spelling are the same row once parsed.
#[test]
fn duplicates_are_detected_after_date_parsing() {
    let padded = ROW_A;
    let unpadded = "1,C1,1/15/2012,1/17/2012,Widget,Technology,Telephones,High,Consumer,Regular Air,2.5,1,4";
    let cleaned = clean(&table(&[padded, unpadded])).unwrap();
    assert_eq!(cleaned.len(), 1);
}

#[test]
fn typed_fields_and_derived_amounts() {
    let cleaned = clean(&table(&[ROW_A])).unwrap();
    let r = &cleaned.rows[0];

    assert_eq!(r.order_date, ymd(2012, 1, 15));
    assert_eq!(r.ship_date, Some(ymd(2012, 1, 17)));
    assert_eq!(r.product_category, Some(ProductCategory::Technology));
    assert_eq!(r.product_sub_category.as_ref().map(|s| s.as_str()), Some("Telephones"));
    assert_eq!(r.order_priority, Some(OrderPriority::High));
    assert_eq!(r.customer_segment, Some(CustomerSegment::Consumer));
    assert_eq!(r.ship_mode, Some(ShipMode::RegularAir));
    assert_eq!(r.quantity, Some(4));
    assert_eq!(r.sales_without_shipping, Some(10.0));
    assert_eq!(r.sales_with_shipping, Some(11.0));
}

#[test]
fn header_whitespace_is_trimmed() {
    let csv = format!(
        "{}\n{ROW_A}\n",
        HEADER.split(',').map(|h| format!("  {h} ")).collect::<Vec<_>>().join(",")
    );
    let cleaned = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap();
    assert_eq!(cleaned.len(), 1);
}

#[test]
fn missing_column_is_missing_input() {
    let csv = "Order ID,Customer ID,Order Date\n1,C1,01/01/2012\n";
    let err = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap_err();
    match err {
        PipelineError::MissingInput { what } => assert!(what.contains("Ship Date"), "{what}"),
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

#[test]
fn empty_table_is_a_stage_failure() {
    // A header-only file loads as zero rows.
    let err = clean(&table(&[])).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput { .. }));
}

/// Unparseable numerics become missing and stay missing in derived amounts.
#[test]
fn bad_numerics_become_missing() {
    let row = "3,C3,03/01/2012,03/02/2012,Lamp,Furniture,Lighting,Medium,Home Office,Express Air,abc,2,3";
    let cleaned = clean(&table(&[row])).unwrap();
    let r = &cleaned.rows[0];

    assert_eq!(r.unit_price, None);
    assert_eq!(r.shipping_cost, Some(2.0));
    assert_eq!(r.quantity, Some(3));
    assert_eq!(r.sales_without_shipping, None);
    assert_eq!(r.sales_with_shipping, None);
    assert_eq!(cleaned.report.missing_numeric_cells, 1);
}

#[test]
fn unknown_categories_become_missing() {
    let row = "4,C4,03/01/2012,03/02/2012,Lamp,Garden,Lighting,Urgent,Consumer,Teleport,5,1,1";
    let cleaned = clean(&table(&[row])).unwrap();
    let r = &cleaned.rows[0];
    assert_eq!(r.product_category, None);
    assert_eq!(r.order_priority, None);
    assert_eq!(r.ship_mode, None);
    assert_eq!(r.customer_segment, Some(CustomerSegment::Consumer));
}

/// Month/day/year wins; day/month/year is the fallback.
#[test]
fn date_parse_order() {
    let ambiguous = "5,C5,03/04/2012,,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    let day_first = "6,C6,25/12/2011,,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    let cleaned = clean(&table(&[ambiguous, day_first])).unwrap();

    assert_eq!(cleaned.rows[0].order_date, ymd(2012, 3, 4));
    assert_eq!(cleaned.rows[1].order_date, ymd(2011, 12, 25));
    assert_eq!(cleaned.rows[0].ship_date, None);
}

#[test]
fn drop_policy_drops_rows_with_bad_order_dates() {
    let bad = "7,C7,2012-13-45,01/01/2012,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    let bad_ship = "8,C8,01/01/2012,soon,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    let cleaned = clean(&table(&[ROW_A, bad, bad_ship])).unwrap();

    assert_eq!(cleaned.len(), 2);
    assert_eq!(cleaned.report.rows_dropped_for_dates, 1);
    assert_eq!(cleaned.rows[1].order_id, "8");
    assert_eq!(cleaned.rows[1].ship_date, None);
}

#[test]
fn fail_policy_reports_the_offending_cell() {
    let bad = "7,C7,someday,01/01/2012,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    let options = CleaningOptions { unparseable_dates: DatePolicy::Fail };
    let err = clean_with(&table(&[ROW_A, bad]), &options).unwrap_err();

    match err {
        PipelineError::ParseFailure { row, column, value } => {
            assert_eq!(row, 3, "header is line 1, bad row is line 3");
            assert_eq!(column, "Order Date");
            assert_eq!(value, "someday");
        }
        other => panic!("expected ParseFailure, got {other:?}"),
    }
}

#[test]
fn all_rows_dropped_is_a_stage_failure() {
    let bad = "7,C7,someday,01/01/2012,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,1,0,1";
    assert!(matches!(clean(&table(&[bad])), Err(PipelineError::EmptyInput { .. })));
}

#[test]
fn extra_columns_are_ignored_and_reported() {
    let csv = format!("{HEADER},Region,SalesAmountWithShipping\n{ROW_A},West,999\n");
    let cleaned = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap();

    assert_eq!(cleaned.report.ignored_columns, vec!["Region".to_string()]);
    // Incoming derived columns are recomputed.
    assert_eq!(cleaned.rows[0].sales_with_shipping, Some(11.0));
}

/// Cleaning already-cleaned data changes nothing.
#[test]
fn cleaning_is_idempotent() {
    let messy = "9,C9,25/12/2011,,Desk,furniture,Tables,not specified,home office,delivery truck,x,3,2.0";
    let first = clean(&table(&[ROW_A, ROW_B, ROW_A, messy])).unwrap();
    let second = clean(&first.to_raw()).unwrap();

    assert_eq!(second.rows, first.rows);
    assert_eq!(second.report.duplicates_removed, 0);
    assert_eq!(second.report.rows_dropped_for_dates, 0);
    assert!(second.report.ignored_columns.is_empty());
}

/// Columns the cleaner ignores still tell rows apart.
#[test]
fn rows_differing_only_in_an_ignored_column_are_kept() {
    let csv = format!("{HEADER},Discount\n{ROW_A},0.1\n{ROW_A},0.2\n{ROW_A},0.1\n");
    let cleaned = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap();

    assert_eq!(cleaned.len(), 2);
    assert_eq!(cleaned.report.duplicates_removed, 1);
}

/// Cells that coerce to missing are compared as they were read.
#[test]
fn rows_differing_only_in_coerced_cells_are_kept() {
    let hovercraft = "1,C1,01/15/2012,01/17/2012,Widget,Technology,Telephones,High,Consumer,Hovercraft,n/a,1,4";
    let teleport = "1,C1,01/15/2012,01/17/2012,Widget,Technology,Telephones,High,Consumer,Teleport,abc,1,4";
    let cleaned = clean(&table(&[hovercraft, teleport])).unwrap();

    assert_eq!(cleaned.len(), 2);
    assert_eq!(cleaned.report.duplicates_removed, 0);
    assert_eq!(cleaned.rows[0].ship_mode, None);
    assert_eq!(cleaned.rows[1].unit_price, None);
}

/// Incoming derived columns are recomputed, so they never tell rows apart.
#[test]
fn incoming_derived_columns_are_not_compared() {
    let csv = format!("{HEADER},SalesAmountWithShipping\n{ROW_A},999\n{ROW_A},998\n");
    let cleaned = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap();
    assert_eq!(cleaned.len(), 1);
    assert_eq!(cleaned.rows[0].sales_with_shipping, Some(11.0));
}

/// Rendering keeps every source column, so rows kept apart by raw cells
/// stay apart when cleaned again.
#[test]
fn cleaning_is_idempotent_with_extra_and_coerced_cells() {
    let csv = format!(
        "{HEADER},Region\n\
         {ROW_A},West\n\
         {ROW_A},East\n\
         1,C1,1/15/2012,1/17/2012,Widget,Technology,Telephones,High,Consumer,Regular Air,n/a,1,4,West\n\
         1,C1,01/15/2012,01/17/2012,Widget,Technology,Telephones,High,Consumer,Regular Air,abc,1,4,West\n\
         2,C2,02/20/2012,soon,Chair,Furniture,Chairs,Low,Corporate,Delivery Truck,100,10,1,North\n\
         2,C2,02/20/2012,later,Chair,Furniture,Chairs,Low,Corporate,Delivery Truck,100,10,1,North\n"
    );
    let first = clean(&load_orders(csv.as_bytes()).unwrap()).unwrap();
    assert_eq!(first.len(), 6);

    let rendered = first.to_raw();
    assert!(rendered.headers.iter().any(|h| h == "Region"));
    assert_eq!(rendered.rows[2][10], "n/a");

    let second = clean(&rendered).unwrap();
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.report.duplicates_removed, 0);
    assert_eq!(second.report.ignored_columns, vec!["Region".to_string()]);
}

/// A row cut short in the file loads with its trailing cells missing.
#[test]
fn short_row_cleans_with_missing_fields() {
    let short = "10,C10,01/05/2012,01/06/2012,Pen,Office Supplies,Pens,Low,Consumer,Regular Air,3";
    let cleaned = clean(&table(&[ROW_A, short])).unwrap();

    assert_eq!(cleaned.len(), 2);
    let r = &cleaned.rows[1];
    assert_eq!(r.unit_price, Some(3.0));
    assert_eq!(r.shipping_cost, None);
    assert_eq!(r.quantity, None);
    assert_eq!(r.sales_with_shipping, None);
    assert_eq!(cleaned.report.missing_numeric_cells, 2);
}
