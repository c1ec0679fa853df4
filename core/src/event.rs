//! Run events: the record of what every stage did.
//!
//! RULE: Stages never log run progress to files themselves.
//! The engine turns each stage transition into a PipelineEvent and the
//! store persists the resulting entries once the run ends.

use crate::types::{RunId, StageId, Year};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
/// Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Engine events ──────────────────────────────
    RunStarted {
        run_id:        RunId,
        analysis_year: Year,
    },
    RunCompleted {
        run_id:        RunId,
        failed_stages: Vec<StageId>,
    },

    // ── Stage lifecycle ────────────────────────────
    StageStarted {
        stage: StageId,
    },
    StageCompleted {
        stage:    StageId,
        rows_out: usize,
    },
    StageFailed {
        stage: StageId,
        error: String,
    },
    StageSkipped {
        stage:  StageId,
        reason: String,
    },

    // ── Cleaning detail ────────────────────────────
    DuplicatesRemoved {
        count: usize,
    },
    RowsDropped {
        count:  usize,
        reason: String,
    },
}

impl PipelineEvent {
    /// Stable string name for the event_type field of the run log.
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. }        => "run_started",
            PipelineEvent::RunCompleted { .. }      => "run_completed",
            PipelineEvent::StageStarted { .. }      => "stage_started",
            PipelineEvent::StageCompleted { .. }    => "stage_completed",
            PipelineEvent::StageFailed { .. }       => "stage_failed",
            PipelineEvent::StageSkipped { .. }      => "stage_skipped",
            PipelineEvent::DuplicatesRemoved { .. } => "duplicates_removed",
            PipelineEvent::RowsDropped { .. }       => "rows_dropped",
        }
    }
}

/// One persisted line of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub run_id:     RunId,
    pub seq:        u64,
    /// Stage name, or "engine" for run-level events.
    pub stage:      String,
    pub event_type: String,
    pub payload:    PipelineEvent,
}
