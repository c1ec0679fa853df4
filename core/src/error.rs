use crate::types::StageId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing input: {what}")]
    MissingInput { what: String },

    #[error("Parse failure at row {row}, column '{column}': cannot parse '{value}'")]
    ParseFailure {
        row:    usize,
        column: String,
        value:  String,
    },

    #[error("Malformed row at line {line}: expected at most {expected} cells, found {found}")]
    MalformedRow {
        line:     u64,
        expected: usize,
        found:    usize,
    },

    #[error("Stage '{stage}' received an empty table")]
    EmptyInput { stage: StageId },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
