//! Risk budget stage: where to spend a retention budget.
//!
//! Losing a high-value customer costs more than losing a low-value one,
//! so the budget is split by value tier, weighted by how likely each tier
//! is to buy again.
//!
//! Populations relative to the analysis year Y:
//!   New       first order in Y
//!   PastAny   first order before Y            (retention denominator)
//!   Retained  first order before Y, last in Y (retention numerator)
//!
//! The summary covers New ∪ Retained. Lapsed past customers only ever
//! appear in the retention denominator.

use crate::{
    customer_metrics_stage::{CustomerRecord, CustomerTable},
    error::{PipelineError, PipelineResult},
    report,
    stats,
    types::{StageId, Year},
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Upper bound (inclusive) of the Low tier's average order value.
pub const LOW_AOV_MAX: f64 = 110.0;
/// Upper bound (inclusive) of the Med tier's average order value.
pub const MED_AOV_MAX: f64 = 900.0;
/// Exclusive lower bound of the Low tier.
pub const AOV_FLOOR: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    New,
    Low,
    Med,
    High,
}

impl RiskLevel {
    /// Tier for a returning customer: (-1, 110] Low, (110, 900] Med,
    /// above that High. Anything at or below the floor (or NaN) has no tier.
    pub fn from_average_order_value(aov: f64) -> Option<Self> {
        if aov.is_nan() || aov <= AOV_FLOOR {
            None
        } else if aov <= LOW_AOV_MAX {
            Some(RiskLevel::Low)
        } else if aov <= MED_AOV_MAX {
            Some(RiskLevel::Med)
        } else {
            Some(RiskLevel::High)
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::New  => write!(f, "New"),
            RiskLevel::Low  => write!(f, "Low"),
            RiskLevel::Med  => write!(f, "Med"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummaryRow {
    pub risk_level:          RiskLevel,
    pub customer_count:      usize,
    pub average_order_value: f64,
    pub retention_pct:       f64,
    pub dollar_at_risk:      f64,
    pub risk_allocation_pct: f64,
}

/// Presentation form of a summary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedRiskRow {
    pub risk_level:          String,
    pub customer_count:      String,
    pub average_order_value: String,
    pub retention_pct:       String,
    pub dollar_at_risk:      String,
    pub risk_allocation_pct: String,
}

impl RiskSummaryRow {
    pub fn formatted(&self) -> FormattedRiskRow {
        FormattedRiskRow {
            risk_level:          self.risk_level.to_string(),
            customer_count:      self.customer_count.to_string(),
            average_order_value: report::format_currency(self.average_order_value),
            retention_pct:       report::format_percent(self.retention_pct),
            dollar_at_risk:      report::format_currency(self.dollar_at_risk),
            risk_allocation_pct: report::format_percent(self.risk_allocation_pct),
        }
    }
}

/// Output of the risk budget stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskBudget {
    pub analysis_year: Year,
    /// Levels present in the summary population, ordered New, Low, Med, High.
    pub rows:          Vec<RiskSummaryRow>,
}

impl RiskBudget {
    pub fn row(&self, level: RiskLevel) -> Option<&RiskSummaryRow> {
        self.rows.iter().find(|r| r.risk_level == level)
    }

    pub fn total_dollar_at_risk(&self) -> f64 {
        self.rows.iter().map(|r| r.dollar_at_risk).sum()
    }

    /// Column headers of the presentation table for this year.
    pub fn headers(&self) -> [String; 6] {
        [
            "Risk Level".to_string(),
            "Number of Customers".to_string(),
            format!("{} AOV", self.analysis_year),
            "Retention (%)".to_string(),
            "$ at Risk".to_string(),
            "Risk Allocation (%)".to_string(),
        ]
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

pub fn risk_budget(customers: &CustomerTable, analysis_year: Year) -> PipelineResult<RiskBudget> {
    risk_budget_from_rows(&customers.rows, analysis_year)
}

pub fn risk_budget_from_rows(
    customers: &[CustomerRecord],
    analysis_year: Year,
) -> PipelineResult<RiskBudget> {
    let stage = StageId::RiskBudget;
    if customers.is_empty() {
        return Err(PipelineError::EmptyInput { stage });
    }

    let mut past:     BTreeMap<RiskLevel, BTreeSet<&str>> = BTreeMap::new();
    let mut retained: BTreeMap<RiskLevel, BTreeSet<&str>> = BTreeMap::new();
    let mut summary:  BTreeMap<RiskLevel, Vec<&CustomerRecord>> = BTreeMap::new();
    let mut untiered = 0usize;

    for c in customers {
        let first_year = c.first_date.year();
        if first_year == analysis_year {
            summary.entry(RiskLevel::New).or_default().push(c);
            continue;
        }
        if first_year > analysis_year {
            continue;
        }

        let Some(level) = RiskLevel::from_average_order_value(c.average_order_value) else {
            untiered += 1;
            continue;
        };
        past.entry(level).or_default().insert(c.customer_id.as_str());
        if c.last_date.year() == analysis_year {
            retained.entry(level).or_default().insert(c.customer_id.as_str());
            summary.entry(level).or_default().push(c);
        }
    }
    if untiered > 0 {
        log::warn!("{stage}: {untiered} returning customers have no tier (AOV <= {AOV_FLOOR})");
    }

    let mut rows: Vec<RiskSummaryRow> = summary
        .iter()
        .map(|(&level, members)| {
            let customer_count = members
                .iter()
                .map(|c| c.customer_id.as_str())
                .collect::<BTreeSet<_>>()
                .len();
            let retained_count = retained.get(&level).map_or(0, BTreeSet::len);
            let past_count = past.get(&level).map_or(0, BTreeSet::len);
            let retention_pct = stats::ratio_or_zero(retained_count as f64, past_count as f64) * 100.0;
            let average_order_value =
                stats::mean(members.iter().map(|c| c.average_order_value)).unwrap_or(0.0);
            let dollar_at_risk =
                customer_count as f64 * (retention_pct / 100.0) * average_order_value;

            RiskSummaryRow {
                risk_level: level,
                customer_count,
                average_order_value,
                retention_pct,
                dollar_at_risk,
                risk_allocation_pct: 0.0,
            }
        })
        .collect();

    let total_at_risk: f64 = rows.iter().map(|r| r.dollar_at_risk).sum();
    if total_at_risk == 0.0 {
        log::debug!("{stage}: total dollar at risk is zero, allocations are 0");
    }
    for row in &mut rows {
        row.risk_allocation_pct = stats::ratio_or_zero(row.dollar_at_risk, total_at_risk) * 100.0;
    }

    if rows.is_empty() {
        log::warn!("{stage}: no new or retained customers in {analysis_year}");
    } else {
        log::info!(
            "{stage}: year={analysis_year} levels={} total_at_risk={:.2}",
            rows.len(),
            total_at_risk
        );
    }
    Ok(RiskBudget { analysis_year, rows })
}
