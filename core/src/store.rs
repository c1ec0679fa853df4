//! Flat-file persistence for stage outputs.
//!
//! RULE: Only store.rs writes files.
//! Stages return tables; the engine hands them to the store.

use crate::{
    cleaning_stage::CleanedTable,
    customer_metrics_stage::CustomerTable,
    error::PipelineResult,
    event::EventLogEntry,
    product_matrix_stage::ProductMatrix,
    risk_budget_stage::RiskBudget,
    types::StageId,
};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CLEANED_FILE:  &str = "cleaned_data.csv";
pub const CUSTOMER_FILE: &str = "customer_metrics.csv";
pub const RISK_FILE:     &str = "risk_budget.csv";
pub const MATRIX_FILE:   &str = "boston_matrix.csv";
pub const RUN_LOG_FILE:  &str = "run_log.jsonl";

/// Output file a stage writes, if it writes one.
pub fn file_of(stage: StageId) -> Option<&'static str> {
    match stage {
        StageId::Extract         => None,
        StageId::Clean           => Some(CLEANED_FILE),
        StageId::CustomerMetrics => Some(CUSTOMER_FILE),
        StageId::RiskBudget      => Some(RISK_FILE),
        StageId::ProductMatrix   => Some(MATRIX_FILE),
    }
}

pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Open (or create) the output directory.
    pub fn open(dir: impl AsRef<Path>) -> PipelineResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    // ── Stage outputs ──────────────────────────────────────────

    /// Written in the same layout the loader reads, so the file can be
    /// fed back through the cleaner.
    pub fn write_cleaned(&self, cleaned: &CleanedTable) -> PipelineResult<PathBuf> {
        let path = self.path_of(CLEANED_FILE);
        let raw = cleaned.to_raw();
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&raw.headers)?;
        for row in &raw.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn write_customers(&self, customers: &CustomerTable) -> PipelineResult<PathBuf> {
        let path = self.path_of(CUSTOMER_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in &customers.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// `formatted` selects currency / percent strings over raw numbers.
    pub fn write_risk_budget(&self, budget: &RiskBudget, formatted: bool) -> PipelineResult<PathBuf> {
        let path = self.path_of(RISK_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(budget.headers())?;
        for row in &budget.rows {
            if formatted {
                let f = row.formatted();
                writer.write_record([
                    f.risk_level,
                    f.customer_count,
                    f.average_order_value,
                    f.retention_pct,
                    f.dollar_at_risk,
                    f.risk_allocation_pct,
                ])?;
            } else {
                writer.write_record([
                    row.risk_level.to_string(),
                    row.customer_count.to_string(),
                    row.average_order_value.to_string(),
                    row.retention_pct.to_string(),
                    row.dollar_at_risk.to_string(),
                    row.risk_allocation_pct.to_string(),
                ])?;
            }
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn write_product_matrix(&self, matrix: &ProductMatrix) -> PipelineResult<PathBuf> {
        let path = self.path_of(MATRIX_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in &matrix.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Remove a stage's output, such as one left by an earlier run in the
    /// same directory. A file that is not there is not an error.
    pub fn discard(&self, stage: StageId) -> PipelineResult<()> {
        let Some(file) = file_of(stage) else {
            return Ok(());
        };
        match std::fs::remove_file(self.path_of(file)) {
            Ok(()) => {
                log::debug!("{stage}: removed stale {file}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── Run log ────────────────────────────────────────────────

    pub fn write_run_log(&self, entries: &[EventLogEntry]) -> PipelineResult<PathBuf> {
        let path = self.path_of(RUN_LOG_FILE);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        for entry in entries {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        file.flush()?;
        Ok(path)
    }
}
