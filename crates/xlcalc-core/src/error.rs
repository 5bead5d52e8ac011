//! Errors for addresses, names and worksheet edits

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Validation failures raised before any state changes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u64, u32),

    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u16),

    /// Rejected by [`validate_sheet_name`](crate::validate_sheet_name), or a duplicate
    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid table '{name}': {reason}")]
    InvalidTable { name: String, reason: String },
}
