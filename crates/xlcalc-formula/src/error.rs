//! Formula error types
//!
//! Parse failures, evaluation outcomes and structural edit failures are kept in
//! separate enums. Excel error values (`#REF!`, `#VALUE!`, ...) are not errors
//! here: they are ordinary [`FormulaValue`](crate::FormulaValue)s.

use crate::dependency::CellKey;
use thiserror::Error;

/// Result type for evaluation
pub type FormulaResult<T> = std::result::Result<T, EvalError>;

/// Result type for parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors raised while turning formula text into tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Formula text was empty
    #[error("Empty formula")]
    Empty,

    #[error("Unknown name '{name}' at position {pos}")]
    UnknownName { name: String, pos: usize },

    #[error("Unknown sheet '{name}' at position {pos}")]
    UnknownSheet { name: String, pos: usize },

    #[error("Unknown table '{name}' at position {pos}")]
    UnknownTable { name: String, pos: usize },

    #[error("Table '{table}' has no column '{column}' (position {pos})")]
    UnknownTableColumn {
        table: String,
        column: String,
        pos: usize,
    },

    #[error("Unknown external workbook '[{book}]' at position {pos}")]
    UnknownExternalBook { book: String, pos: usize },

    #[error("Invalid reference '{text}' at position {pos}")]
    InvalidReference { text: String, pos: usize },

    #[error("Expected {expected}, found '{found}' at position {pos}")]
    Unexpected {
        expected: &'static str,
        found: String,
        pos: usize,
    },

    #[error("Unterminated literal starting at position {pos}")]
    UnterminatedString { pos: usize },

    #[error("Unbalanced bracket starting at position {pos}")]
    UnbalancedBracket { pos: usize },

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("'{table}[#This Row]' needs a row context (position {pos})")]
    ThisRowWithoutContext { table: String, pos: usize },

    #[error("Invalid structured reference '{text}' at position {pos}")]
    InvalidStructuredReference { text: String, pos: usize },
}

/// Internal evaluation outcomes that are not Excel error values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The cell is part of a cycle; lists every cell on it
    #[error("Circular reference: {}", format_cells(.0))]
    CircularReference(Vec<CellKey>),

    /// Evaluation nested deeper than `EngineOptions::max_depth`
    #[error("Evaluation depth {0} exceeded")]
    DepthExceeded(usize),

    /// No implementation registered under this name
    #[error("Unregistered function: {0}")]
    UnregisteredFunction(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Token array does not form a valid postfix program
    #[error("Malformed token array: {0}")]
    MalformedTokens(String),

    /// Formula text supplied by the cell source failed to parse
    #[error("Formula at {cell} failed to parse: {source}")]
    Parse {
        cell: CellKey,
        #[source]
        source: ParseError,
    },
}

fn format_cells(cells: &[CellKey]) -> String {
    cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Structural edits the engine refuses to apply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("Moving rows {first}..={last} by {delta} leaves the sheet")]
    RowShiftOutOfBounds { first: u32, last: u32, delta: i64 },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// An edit would cut through an array formula
    #[error("Cannot change part of an array formula anchored at {0}")]
    SplitsArrayFormula(CellKey),
}
