//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a customer as it appears in the order file.
pub type CustomerId = String;

/// Identifier of an order as it appears in the order file.
pub type OrderId = String;

/// Calendar year used for the analysis window and product CAGR.
pub type Year = i32;

/// The canonical run identifier.
pub type RunId = String;

/// Every stage of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Extract,
    Clean,
    CustomerMetrics,
    RiskBudget,
    ProductMatrix,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Extract         => "extract",
            StageId::Clean           => "clean",
            StageId::CustomerMetrics => "customer_metrics",
            StageId::RiskBudget      => "risk_budget",
            StageId::ProductMatrix   => "product_matrix",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order two identifiers numerically when both are integers,
/// lexically otherwise. Superstore ids are usually plain integers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _              => a.cmp(b),
    }
}
