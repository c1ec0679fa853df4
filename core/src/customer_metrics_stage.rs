//! Customer metrics stage: RFM and lifetime-value profile per customer.
//!
//! Computed in three passes over the cleaned orders:
//!   1. Aggregate each customer's own orders (dates, counts, sums, first order).
//!   2. Derive batch-wide statistics: the recency anchor (latest last-order
//!      date), the highest frequency, and the 25th / 75th CLV percentiles.
//!   3. Finish every customer row against those batch statistics.
//!
//! Value segments are relative to the batch, so they shift between runs.

use crate::{
    cleaning_stage::CleanedTable,
    error::{PipelineError, PipelineResult},
    order::OrderRecord,
    stats,
    types::{natural_cmp, CustomerId, StageId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const DAYS_PER_YEAR: i64 = 365;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueSegment {
    #[serde(rename = "Low Value")]
    Low,
    #[serde(rename = "Medium Value")]
    Medium,
    #[serde(rename = "High Value")]
    High,
}

impl ValueSegment {
    /// Intervals are right-closed: (-inf, low], (low, high], (high, inf).
    pub fn classify(lifetime_value: f64, thresholds: &ValueThresholds) -> Self {
        if lifetime_value <= thresholds.low {
            ValueSegment::Low
        } else if lifetime_value <= thresholds.high {
            ValueSegment::Medium
        } else {
            ValueSegment::High
        }
    }
}

impl fmt::Display for ValueSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSegment::Low    => write!(f, "Low Value"),
            ValueSegment::Medium => write!(f, "Medium Value"),
            ValueSegment::High   => write!(f, "High Value"),
        }
    }
}

/// CLV cut points for the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueThresholds {
    /// 25th percentile of customer lifetime value.
    pub low:  f64,
    /// 75th percentile of customer lifetime value.
    pub high: f64,
}

/// One row per customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(rename = "Customer ID")]
    pub customer_id:             CustomerId,
    #[serde(rename = "First Date")]
    pub first_date:              NaiveDate,
    #[serde(rename = "Last Date")]
    pub last_date:               NaiveDate,
    #[serde(rename = "Customer Tenure")]
    pub tenure_years:            i64,
    #[serde(rename = "Recency")]
    pub recency_days:            i64,
    #[serde(rename = "Frequency")]
    pub frequency:               u64,
    #[serde(rename = "Monetary")]
    pub monetary:                f64,
    #[serde(rename = "Total Quantity")]
    pub total_quantity:          i64,
    #[serde(rename = "First Order Revenue")]
    pub first_order_revenue:     Option<f64>,
    #[serde(rename = "Avg Days Between Orders")]
    pub avg_days_between_orders: i64,
    #[serde(rename = "First Order Quantity")]
    pub first_order_quantity:    Option<i64>,
    #[serde(rename = "Average Order Value")]
    pub average_order_value:     f64,
    #[serde(rename = "Customer Lifetime Value")]
    pub lifetime_value:          f64,
    #[serde(rename = "Repeat Purchase Customer")]
    pub repeat_purchase:         bool,
    #[serde(rename = "Relative Repeat Rate")]
    pub relative_repeat_rate:    f64,
    #[serde(rename = "Churn Likelihood")]
    pub churn_likelihood:        f64,
    #[serde(rename = "Average Basket Size")]
    pub average_basket_size:     f64,
    #[serde(rename = "Customer Value Segment")]
    pub value_segment:           ValueSegment,
}

/// Output of the customer metrics stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTable {
    pub rows:           Vec<CustomerRecord>,
    pub recency_anchor: NaiveDate,
    pub thresholds:     ValueThresholds,
}

impl CustomerTable {
    pub fn get(&self, customer_id: &str) -> Option<&CustomerRecord> {
        self.rows.iter().find(|r| r.customer_id == customer_id)
    }
}

// ── Pass 1: per-customer aggregate ───────────────────────────────────────────

struct CustomerAggregate<'a> {
    customer_id:             &'a str,
    first_date:              NaiveDate,
    last_date:               NaiveDate,
    frequency:               u64,
    monetary:                f64,
    total_quantity:          i64,
    first_order:             &'a OrderRecord,
    first_order_quantity:    Option<i64>,
    avg_days_between_orders: i64,
}

impl<'a> CustomerAggregate<'a> {
    /// `orders` is non-empty and in source order.
    fn build(customer_id: &'a str, orders: &[&'a OrderRecord]) -> Self {
        let mut dates: Vec<NaiveDate> = orders.iter().map(|o| o.order_date).collect();
        dates.sort_unstable();
        let first_date = dates[0];
        let last_date = dates[dates.len() - 1];

        // Earliest date, then lowest order id, then source order.
        let mut chronological: Vec<&'a OrderRecord> = orders.to_vec();
        chronological.sort_by(|a, b| {
            a.order_date
                .cmp(&b.order_date)
                .then_with(|| natural_cmp(&a.order_id, &b.order_id))
        });
        let first_order = chronological[0];
        // Missing quantities are passed over.
        let first_order_quantity = chronological.iter().find_map(|o| o.quantity);

        let avg_days_between_orders = stats::mean(
            dates
                .windows(2)
                .map(|w| (w[1] - w[0]).num_days() as f64),
        )
        .map(|gap| gap.floor() as i64)
        .unwrap_or(0);

        Self {
            customer_id,
            first_date,
            last_date,
            frequency: orders.len() as u64,
            monetary: orders.iter().filter_map(|o| o.sales_with_shipping).sum(),
            total_quantity: orders.iter().filter_map(|o| o.quantity).sum(),
            first_order,
            first_order_quantity,
            avg_days_between_orders,
        }
    }

    fn tenure_years(&self) -> i64 {
        (self.last_date - self.first_date).num_days() / DAYS_PER_YEAR
    }

    fn lifetime_value(&self) -> f64 {
        self.monetary * self.tenure_years() as f64
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

pub fn customer_metrics(cleaned: &CleanedTable) -> PipelineResult<CustomerTable> {
    customer_metrics_from_rows(&cleaned.rows)
}

pub fn customer_metrics_from_rows(rows: &[OrderRecord]) -> PipelineResult<CustomerTable> {
    let stage = StageId::CustomerMetrics;

    let mut groups: HashMap<&str, Vec<&OrderRecord>> = HashMap::new();
    let mut unkeyed = 0usize;
    for row in rows {
        if row.customer_id.trim().is_empty() {
            unkeyed += 1;
            continue;
        }
        groups.entry(row.customer_id.as_str()).or_default().push(row);
    }
    if unkeyed > 0 {
        log::warn!("{stage}: skipped {unkeyed} rows without a customer id");
    }
    if groups.is_empty() {
        return Err(PipelineError::EmptyInput { stage });
    }

    let mut aggregates: Vec<CustomerAggregate<'_>> = groups
        .iter()
        .map(|(id, orders)| CustomerAggregate::build(id, orders))
        .collect();
    aggregates.sort_by(|a, b| natural_cmp(a.customer_id, b.customer_id));

    // Pass 2: batch-wide statistics.
    let recency_anchor = aggregates
        .iter()
        .map(|a| a.last_date)
        .max()
        .ok_or(PipelineError::EmptyInput { stage })?;
    let max_frequency = aggregates.iter().map(|a| a.frequency).max().unwrap_or(1);
    let lifetime_values: Vec<f64> = aggregates.iter().map(CustomerAggregate::lifetime_value).collect();
    let thresholds = ValueThresholds {
        low:  stats::quantile(&lifetime_values, 0.25).unwrap_or(0.0),
        high: stats::quantile(&lifetime_values, 0.75).unwrap_or(0.0),
    };

    // Pass 3: finish rows.
    let rows: Vec<CustomerRecord> = aggregates
        .iter()
        .map(|a| {
            let frequency = a.frequency as f64;
            let recency_days = (recency_anchor - a.last_date).num_days();
            let lifetime_value = a.lifetime_value();
            CustomerRecord {
                customer_id:             a.customer_id.to_string(),
                first_date:              a.first_date,
                last_date:               a.last_date,
                tenure_years:            a.tenure_years(),
                recency_days,
                frequency:               a.frequency,
                monetary:                a.monetary,
                total_quantity:          a.total_quantity,
                first_order_revenue:     a.first_order.sales_without_shipping,
                avg_days_between_orders: a.avg_days_between_orders,
                first_order_quantity:    a.first_order_quantity,
                average_order_value:     a.monetary / frequency,
                lifetime_value,
                repeat_purchase:         a.frequency > 1,
                relative_repeat_rate:    frequency / max_frequency as f64,
                churn_likelihood:        recency_days as f64 / DAYS_PER_YEAR as f64,
                average_basket_size:     a.total_quantity as f64 / frequency,
                value_segment:           ValueSegment::classify(lifetime_value, &thresholds),
            }
        })
        .collect();

    log::info!(
        "{stage}: {} customers, anchor={recency_anchor}, clv p25={:.2} p75={:.2}",
        rows.len(),
        thresholds.low,
        thresholds.high
    );
    Ok(CustomerTable { rows, recency_anchor, thresholds })
}
