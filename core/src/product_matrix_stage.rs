//! Product matrix stage: growth-share (BCG) classification per product.
//!
//! 1. Sum SalesAmountWithShipping per (product, year).
//! 2. Per product: total sales, market share of the grand total, and CAGR
//!    between its first and last observed year.
//! 3. Batch-wide: maximum share and the CAGR midpoint (min + max) / 2.
//! 4. Classify every product against those batch values.
//!
//! A product's quadrant depends on the whole product population.

use crate::{
    cleaning_stage::CleanedTable,
    error::{PipelineError, PipelineResult},
    order::OrderRecord,
    stats,
    types::{StageId, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relative market share above which a product holds a strong position.
pub const HIGH_SHARE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BcgCategory {
    #[serde(rename = "Star")]
    Star,
    #[serde(rename = "Cash Cow")]
    CashCow,
    #[serde(rename = "Question Mark")]
    QuestionMark,
    #[serde(rename = "Dog")]
    Dog,
}

impl BcgCategory {
    pub fn classify(relative_market_share: f64, cagr: f64, cagr_mid: f64) -> Self {
        let high_share = relative_market_share > HIGH_SHARE_THRESHOLD;
        let high_growth = cagr > cagr_mid;
        match (high_share, high_growth) {
            (true, true)   => BcgCategory::Star,
            (true, false)  => BcgCategory::CashCow,
            (false, true)  => BcgCategory::QuestionMark,
            (false, false) => BcgCategory::Dog,
        }
    }
}

impl fmt::Display for BcgCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BcgCategory::Star         => write!(f, "Star"),
            BcgCategory::CashCow      => write!(f, "Cash Cow"),
            BcgCategory::QuestionMark => write!(f, "Question Mark"),
            BcgCategory::Dog          => write!(f, "Dog"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatrixRow {
    #[serde(rename = "Product Name")]
    pub product_name:          String,
    #[serde(rename = "Total Sales")]
    pub total_sales:           f64,
    #[serde(rename = "Market Share (%)")]
    pub market_share_pct:      f64,
    #[serde(rename = "Relative Market Share")]
    pub relative_market_share: f64,
    #[serde(rename = "CAGR")]
    pub cagr:                  f64,
    #[serde(rename = "Category")]
    pub category:              BcgCategory,
}

/// Output of the product matrix stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductMatrix {
    pub rows:        Vec<ProductMatrixRow>,
    pub grand_total: f64,
    pub cagr_mid:    f64,
}

impl ProductMatrix {
    pub fn get(&self, product_name: &str) -> Option<&ProductMatrixRow> {
        self.rows.iter().find(|r| r.product_name == product_name)
    }
}

/// Compound annual growth between the first and last year of `yearly`.
///
/// Zero when only one year exists or the first year had no sales. A
/// negative growth ratio has no real fractional root; that is zero too.
pub fn compound_annual_growth(yearly: &BTreeMap<Year, f64>) -> f64 {
    let (Some((&first_year, &start)), Some((&last_year, &end))) =
        (yearly.first_key_value(), yearly.last_key_value())
    else {
        return 0.0;
    };
    let periods = last_year - first_year;
    if periods == 0 || start == 0.0 {
        return 0.0;
    }
    let cagr = (end / start).powf(1.0 / periods as f64) - 1.0;
    if cagr.is_finite() {
        cagr
    } else {
        0.0
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

pub fn product_matrix(cleaned: &CleanedTable) -> PipelineResult<ProductMatrix> {
    product_matrix_from_rows(&cleaned.rows)
}

pub fn product_matrix_from_rows(rows: &[OrderRecord]) -> PipelineResult<ProductMatrix> {
    let stage = StageId::ProductMatrix;

    // product → year → sales
    let mut sales: BTreeMap<&str, BTreeMap<Year, f64>> = BTreeMap::new();
    let mut unkeyed = 0usize;
    for row in rows {
        if row.product_name.trim().is_empty() {
            unkeyed += 1;
            continue;
        }
        *sales
            .entry(row.product_name.as_str())
            .or_default()
            .entry(row.order_year())
            .or_insert(0.0) += row.sales_with_shipping.unwrap_or(0.0);
    }
    if unkeyed > 0 {
        log::warn!("{stage}: skipped {unkeyed} rows without a product name");
    }
    if sales.is_empty() {
        return Err(PipelineError::EmptyInput { stage });
    }

    let per_product: Vec<(&str, f64, f64)> = sales
        .iter()
        .map(|(name, yearly)| (*name, yearly.values().sum::<f64>(), compound_annual_growth(yearly)))
        .collect();

    let grand_total: f64 = per_product.iter().map(|(_, total, _)| total).sum();
    if grand_total == 0.0 {
        log::debug!("{stage}: grand total sales is zero, shares are 0");
    }
    let shares: Vec<f64> = per_product
        .iter()
        .map(|(_, total, _)| stats::ratio_or_zero(*total, grand_total) * 100.0)
        .collect();
    let max_share = shares.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let max_share = if max_share.is_finite() { max_share } else { 0.0 };

    let cagr_min = per_product.iter().map(|p| p.2).fold(f64::INFINITY, f64::min);
    let cagr_max = per_product.iter().map(|p| p.2).fold(f64::NEG_INFINITY, f64::max);
    let cagr_mid = (cagr_min + cagr_max) / 2.0;

    let rows: Vec<ProductMatrixRow> = per_product
        .iter()
        .zip(&shares)
        .map(|(&(name, total_sales, cagr), &market_share_pct)| {
            let relative_market_share = stats::ratio_or_zero(market_share_pct, max_share);
            ProductMatrixRow {
                product_name: name.to_string(),
                total_sales,
                market_share_pct,
                relative_market_share,
                cagr,
                category: BcgCategory::classify(relative_market_share, cagr, cagr_mid),
            }
        })
        .collect();

    log::info!(
        "{stage}: {} products, grand_total={grand_total:.2}, cagr_mid={cagr_mid:.4}",
        rows.len()
    );
    Ok(ProductMatrix { rows, grand_total, cagr_mid })
}
