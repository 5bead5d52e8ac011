//! Error type for workbook operations

use thiserror::Error;
use xlcalc_formula::{EditError, EvalError, ParseError};

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a workbook operation can fail with
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] xlcalc_core::Error),

    #[error("Formula parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("Edit rejected: {0}")]
    Edit(#[from] EditError),

    #[error("Sheet index {0} out of range")]
    SheetIndex(usize),

    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Duplicate table name: {0}")]
    DuplicateTable(String),

    /// A row move would take only part of a table
    #[error("Cannot move part of table {0}")]
    SplitsTable(String),

    /// A fixture document that parses as JSON but not as a workbook
    #[cfg(feature = "serde")]
    #[error("Invalid fixture: {0}")]
    Fixture(String),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
