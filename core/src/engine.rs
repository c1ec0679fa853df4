//! The run engine: wires the stages into one batch run.
//!
//! EXECUTION ORDER (fixed):
//!   1. Extract          (loader)
//!   2. Clean
//!   3a. CustomerMetrics → 3b. RiskBudget     (customer branch)
//!   4.  ProductMatrix                        (product branch)
//!
//! RULES:
//!   - Branches 3 and 4 start only after Clean succeeds and share nothing
//!     but a read-only borrow of the cleaned table.
//!   - A failing branch never stops its sibling.
//!   - A stage whose upstream failed is recorded as skipped, never run.
//!   - A failed or skipped stage leaves no output file behind.
//!   - Every stage transition is recorded in the event log.

use crate::{
    cleaning_stage::{clean_with, CleanedTable},
    config::PipelineConfig,
    customer_metrics_stage::{customer_metrics, CustomerTable},
    error::PipelineResult,
    event::{EventLogEntry, PipelineEvent},
    loader::{load_orders_file, RawTable},
    product_matrix_stage::{product_matrix, ProductMatrix},
    risk_budget_stage::{risk_budget, RiskBudget},
    store::OutputStore,
    types::{RunId, StageId, Year},
};

/// Tables produced by one run. A stage that failed or was skipped
/// leaves its slot empty.
#[derive(Debug, Default)]
pub struct PipelineOutputs {
    pub cleaned:   Option<CleanedTable>,
    pub customers: Option<CustomerTable>,
    pub risk:      Option<RiskBudget>,
    pub products:  Option<ProductMatrix>,
}

// ── Stage recorder ───────────────────────────────────────────────────────────

/// Collects events for one thread of execution.
#[derive(Default)]
struct StageRecorder {
    events: Vec<(Option<StageId>, PipelineEvent)>,
    failed: Vec<StageId>,
}

impl StageRecorder {
    fn push(&mut self, stage: Option<StageId>, event: PipelineEvent) {
        self.events.push((stage, event));
    }

    /// Run one stage, recording start and outcome.
    fn run<T>(
        &mut self,
        stage:    StageId,
        body:     impl FnOnce() -> PipelineResult<T>,
        rows_out: impl FnOnce(&T) -> usize,
    ) -> PipelineResult<T> {
        self.push(Some(stage), PipelineEvent::StageStarted { stage });
        match body() {
            Ok(output) => {
                let rows_out = rows_out(&output);
                log::info!("{stage}: completed ({rows_out} rows)");
                self.push(Some(stage), PipelineEvent::StageCompleted { stage, rows_out });
                Ok(output)
            }
            Err(e) => {
                log::error!("{stage}: failed: {e}");
                self.push(Some(stage), PipelineEvent::StageFailed { stage, error: e.to_string() });
                self.failed.push(stage);
                Err(e)
            }
        }
    }

    fn skip(&mut self, stage: StageId, upstream: StageId) {
        log::warn!("{stage}: skipped, {upstream} did not complete");
        self.push(
            Some(stage),
            PipelineEvent::StageSkipped { stage, reason: format!("{upstream} did not complete") },
        );
    }
}

// ── Branches ─────────────────────────────────────────────────────────────────

struct CustomerBranch {
    recorder:  StageRecorder,
    customers: Option<CustomerTable>,
    risk:      Option<RiskBudget>,
}

impl CustomerBranch {
    fn panicked() -> Self {
        let mut recorder = StageRecorder::default();
        for stage in [StageId::CustomerMetrics, StageId::RiskBudget] {
            recorder.push(Some(stage), PipelineEvent::StageFailed { stage, error: "branch panicked".into() });
            recorder.failed.push(stage);
        }
        Self { recorder, customers: None, risk: None }
    }
}

struct ProductBranch {
    recorder: StageRecorder,
    products: Option<ProductMatrix>,
}

impl ProductBranch {
    fn panicked() -> Self {
        let stage = StageId::ProductMatrix;
        let mut recorder = StageRecorder::default();
        recorder.push(Some(stage), PipelineEvent::StageFailed { stage, error: "branch panicked".into() });
        recorder.failed.push(stage);
        Self { recorder, products: None }
    }
}

fn run_customer_branch(
    cleaned:          &CleanedTable,
    analysis_year:    Year,
    store:            Option<&OutputStore>,
    format_risk:      bool,
) -> CustomerBranch {
    let mut recorder = StageRecorder::default();

    let customers = recorder
        .run(
            StageId::CustomerMetrics,
            || {
                let table = customer_metrics(cleaned)?;
                if let Some(store) = store {
                    store.write_customers(&table)?;
                }
                Ok(table)
            },
            |t| t.rows.len(),
        )
        .ok();

    let risk = match &customers {
        Some(table) => recorder
            .run(
                StageId::RiskBudget,
                || {
                    let budget = risk_budget(table, analysis_year)?;
                    if let Some(store) = store {
                        store.write_risk_budget(&budget, format_risk)?;
                    }
                    Ok(budget)
                },
                |b| b.rows.len(),
            )
            .ok(),
        None => {
            recorder.skip(StageId::RiskBudget, StageId::CustomerMetrics);
            None
        }
    };

    CustomerBranch { recorder, customers, risk }
}

fn run_product_branch(cleaned: &CleanedTable, store: Option<&OutputStore>) -> ProductBranch {
    let mut recorder = StageRecorder::default();
    let products = recorder
        .run(
            StageId::ProductMatrix,
            || {
                let matrix = product_matrix(cleaned)?;
                if let Some(store) = store {
                    store.write_product_matrix(&matrix)?;
                }
                Ok(matrix)
            },
            |m| m.rows.len(),
        )
        .ok();
    ProductBranch { recorder, products }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct PipelineEngine {
    pub run_id: RunId,
    config:     PipelineConfig,
    store:      Option<OutputStore>,
    log:        Vec<EventLogEntry>,
    failed:     Vec<StageId>,
}

impl PipelineEngine {
    pub fn new(run_id: RunId, config: PipelineConfig, store: Option<OutputStore>) -> Self {
        Self {
            run_id,
            config,
            store,
            log:    Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Build an engine from config: fresh run id, and an output store when
    /// `output_dir` is set.
    pub fn build(config: PipelineConfig) -> PipelineResult<Self> {
        let store = config
            .output_dir
            .as_deref()
            .map(|dir| OutputStore::open(dir))
            .transpose()?;
        Ok(Self::new(Self::new_run_id(), config, store))
    }

    /// In-memory engine with the test config.
    pub fn build_test(run_id: RunId) -> Self {
        Self::new(run_id, PipelineConfig::default_test(), None)
    }

    pub fn new_run_id() -> RunId {
        format!("run-{}", uuid::Uuid::new_v4())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&OutputStore> {
        self.store.as_ref()
    }

    /// Run log of the most recent run.
    pub fn events(&self) -> &[EventLogEntry] {
        &self.log
    }

    /// Stages that failed in the most recent run, in execution order.
    pub fn failed_stages(&self) -> &[StageId] {
        &self.failed
    }

    /// Extract from `path`, then run every downstream stage.
    pub fn run_file(&mut self, path: &str) -> PipelineResult<PipelineOutputs> {
        let mut recorder = self.begin();
        match recorder.run(StageId::Extract, || load_orders_file(path), RawTable::len) {
            Ok(raw) => self.run_after_extract(recorder, &raw),
            Err(e) => {
                for stage in [StageId::Clean, StageId::CustomerMetrics, StageId::RiskBudget, StageId::ProductMatrix] {
                    recorder.skip(stage, StageId::Extract);
                }
                self.absorb(recorder);
                self.finish()?;
                Err(e)
            }
        }
    }

    /// Run from an already extracted table.
    pub fn run(&mut self, raw: &RawTable) -> PipelineResult<PipelineOutputs> {
        let recorder = self.begin();
        self.run_after_extract(recorder, raw)
    }

    fn begin(&mut self) -> StageRecorder {
        self.log.clear();
        self.failed.clear();
        let mut recorder = StageRecorder::default();
        recorder.push(
            None,
            PipelineEvent::RunStarted {
                run_id:        self.run_id.clone(),
                analysis_year: self.config.analysis_year,
            },
        );
        log::info!("run {} started (analysis year {})", self.run_id, self.config.analysis_year);
        recorder
    }

    fn run_after_extract(
        &mut self,
        mut recorder: StageRecorder,
        raw: &RawTable,
    ) -> PipelineResult<PipelineOutputs> {
        let options = self.config.cleaning_options();
        let store = self.store.as_ref();
        let cleaned = recorder.run(
            StageId::Clean,
            || {
                let cleaned = clean_with(raw, &options)?;
                if let Some(store) = store {
                    store.write_cleaned(&cleaned)?;
                }
                Ok(cleaned)
            },
            CleanedTable::len,
        );

        let cleaned = match cleaned {
            Ok(cleaned) => cleaned,
            Err(e) => {
                for stage in [StageId::CustomerMetrics, StageId::RiskBudget, StageId::ProductMatrix] {
                    recorder.skip(stage, StageId::Clean);
                }
                self.absorb(recorder);
                self.finish()?;
                return Err(e);
            }
        };

        let report = &cleaned.report;
        if report.rows_dropped_for_dates > 0 {
            recorder.push(
                Some(StageId::Clean),
                PipelineEvent::RowsDropped {
                    count:  report.rows_dropped_for_dates,
                    reason: "unparseable order date".into(),
                },
            );
        }
        if report.duplicates_removed > 0 {
            recorder.push(
                Some(StageId::Clean),
                PipelineEvent::DuplicatesRemoved { count: report.duplicates_removed },
            );
        }

        let year = self.config.analysis_year;
        let format_risk = self.config.format_risk_output;
        let (customer_branch, product_branch) = if self.config.parallel_branches {
            std::thread::scope(|s| {
                let customers = s.spawn(|| run_customer_branch(&cleaned, year, store, format_risk));
                let products = s.spawn(|| run_product_branch(&cleaned, store));
                (
                    customers.join().unwrap_or_else(|_| CustomerBranch::panicked()),
                    products.join().unwrap_or_else(|_| ProductBranch::panicked()),
                )
            })
        } else {
            (
                run_customer_branch(&cleaned, year, store, format_risk),
                run_product_branch(&cleaned, store),
            )
        };

        self.absorb(recorder);
        self.absorb(customer_branch.recorder);
        self.absorb(product_branch.recorder);
        self.finish()?;

        Ok(PipelineOutputs {
            cleaned:   Some(cleaned),
            customers: customer_branch.customers,
            risk:      customer_branch.risk,
            products:  product_branch.products,
        })
    }

    /// Move a recorder's events into the run log.
    fn absorb(&mut self, recorder: StageRecorder) {
        for (stage, event) in recorder.events {
            self.append(stage, event);
        }
        self.failed.extend(recorder.failed);
    }

    fn append(&mut self, stage: Option<StageId>, event: PipelineEvent) {
        let entry = EventLogEntry {
            run_id:     self.run_id.clone(),
            seq:        self.log.len() as u64,
            stage:      stage.map_or("engine", |s| s.as_str()).to_string(),
            event_type: event.type_name().to_string(),
            payload:    event,
        };
        self.log.push(entry);
    }

    fn finish(&mut self) -> PipelineResult<()> {
        let failed_stages = self.failed.clone();
        if failed_stages.is_empty() {
            log::info!("run {} completed", self.run_id);
        } else {
            log::warn!("run {} completed with failed stages {failed_stages:?}", self.run_id);
        }
        self.append(
            None,
            PipelineEvent::RunCompleted { run_id: self.run_id.clone(), failed_stages },
        );
        if let Some(store) = &self.store {
            let unfinished = self.log.iter().filter_map(|entry| match entry.payload {
                PipelineEvent::StageFailed { stage, .. } | PipelineEvent::StageSkipped { stage, .. } => {
                    Some(stage)
                }
                _ => None,
            });
            for stage in unfinished {
                store.discard(stage)?;
            }
            let path = store.write_run_log(&self.log)?;
            log::debug!("run log written to {}", path.display());
        }
        Ok(())
    }
}
