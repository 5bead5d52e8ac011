//! # xlcalc
//!
//! An Excel-compatible formula engine with an in-memory workbook.
//!
//! ## Features
//!
//! - Excel formula grammar: A1 and whole-row/column references, 3-D sheet
//!   spans, external workbooks, defined names, structured table references
//!   and array constants
//! - Formulas stored as postfix token arrays and rendered back to text
//! - Cached evaluation with dependency tracking and cycle detection
//! - Shared and array formulas
//! - Row shifts, inserts, deletes and sheet renames that keep formulas intact
//! - JSON workbook fixtures (`serde` feature)
//!
//! ## Example
//!
//! ```rust
//! use xlcalc::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! workbook.set_value(0, "A1", 10.0).unwrap();
//! workbook.set_value(0, "A2", 32.0).unwrap();
//! workbook.set_formula(0, "A3", "=SUM(A1:A2)").unwrap();
//!
//! assert_eq!(workbook.evaluate_cell(0, "A3").unwrap(), FormulaValue::Number(42.0));
//! assert_eq!(workbook.formula(0, "A3").unwrap().as_deref(), Some("=SUM(A1:A2)"));
//! ```

pub mod calculation;
pub mod error;
#[cfg(feature = "serde")]
pub mod fixture;
pub mod prelude;
pub mod workbook;

pub use calculation::{CalculationOptions, CalculationStats, WorkbookCalculationExt};
pub use error::{Error, Result};
pub use workbook::Workbook;

// Re-export core types
pub use xlcalc_core::{
    CellAddress, CellError, CellRange, CellValue, NameScope, TableDef, Worksheet, MAX_COLS,
    MAX_ROWS, MAX_SHEET_NAME_LEN,
};

// Re-export formula types
pub use xlcalc_formula::{
    parse, render, ArrayId, CalcEngine, CellKey, CellState, ChainEntry, EditError, EngineOptions,
    EvalError, EvaluationContext, Formula, FormulaResult, FormulaValue, FunctionDef, FunctionImpl,
    FunctionRegistry, GroupId, NameId, ParseContext, ParseError, RenderContext, Token,
};
