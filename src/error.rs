//! Error taxonomy for the batch pipeline.
//!
//! Every variant here is fatal for a run. Recoverable conditions (a missing
//! cost, a stats row whose product left the catalog, two queries that
//! normalize to the same key) never become errors; see [`crate::aggregate`],
//! [`crate::merge`] and [`crate::modifiers`] for how each is handled.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed row {row} in {}: {reason}", path.display())]
    MalformedRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("missing required column '{column}' in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error(
        "column '{column}' in {} clashes with a generated document field",
        path.display()
    )]
    ConflictingColumn { path: PathBuf, column: String },

    #[error("duplicate product id '{item_id}' at row {row} in {}", path.display())]
    DuplicateProduct {
        path: PathBuf,
        row: usize,
        item_id: String,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn malformed(path: &std::path::Path, row: usize, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRow {
            path: path.to_path_buf(),
            row,
            reason: reason.into(),
        }
    }

    pub(crate) fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
