//! Superstore analytics pipeline.
//!
//! Extracts retail order lines, cleans them, then derives three analysis
//! tables: customer RFM / lifetime-value metrics, a retention risk budget
//! and a growth-share product matrix.
//!
//! The four stage functions are pure and can be driven by any scheduler:
//!
//! - [`cleaning_stage::clean`]
//! - [`customer_metrics_stage::customer_metrics`]
//! - [`risk_budget_stage::risk_budget`]
//! - [`product_matrix_stage::product_matrix`]
//!
//! [`engine::PipelineEngine`] is the local runner that sequences them.

pub mod cleaning_stage;
pub mod config;
pub mod customer_metrics_stage;
pub mod engine;
pub mod error;
pub mod event;
pub mod loader;
pub mod order;
pub mod product_matrix_stage;
pub mod report;
pub mod risk_budget_stage;
pub mod stats;
pub mod store;
pub mod types;

pub use cleaning_stage::{clean, CleanedTable};
pub use customer_metrics_stage::{customer_metrics, CustomerTable};
pub use error::{PipelineError, PipelineResult};
pub use product_matrix_stage::{product_matrix, ProductMatrix};
pub use risk_budget_stage::{risk_budget, RiskBudget};
