//! # xlcalc-formula
//!
//! Formula engine for xlcalc.
//!
//! This crate provides:
//! - Formula tokenizing and parsing (text → postfix token array)
//! - Rendering token arrays back to formula text
//! - A stack-machine evaluator with a pluggable function registry
//! - The calculation engine: cached outcomes, dependency tracking, cycle
//!   detection, shared and array formulas, row shifts and sheet renames
//!
//! The host workbook is a collaborator reached through [`CellSource`] and
//! [`WorkbookMetadata`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use xlcalc_formula::{parse, CalcEngine, ParseContext};
//!
//! let formula = parse("=SUM(A1:A10)", &ParseContext::new(&book, 0))?;
//! let mut engine = CalcEngine::new();
//! let value = engine.evaluate(&book, &formula, 0, 0, 1)?;
//! ```

pub mod cache;
pub mod chain;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod render;
pub mod resolver;
pub mod token;
pub mod tokenizer;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use dependency::CellKey;
pub use engine::{ArrayId, CalcEngine, CellState, ChainEntry, EngineOptions, GroupId};
pub use error::{EditError, EvalError, FormulaResult, ParseError, ParseResult};
pub use evaluator::{EvaluationContext, RefOrigin};
pub use functions::{FunctionDef, FunctionImpl, FunctionRegistry};
pub use parser::{parse, ParseContext};
pub use render::{render, RenderContext};
pub use resolver::{
    CellContent, CellSource, ExternalBook, ExternalLink, NameDef, SheetModel, WorkbookMetadata,
};
pub use token::{EditedSheet, Formula, NameId, RowEdit, ThisRow, Token};
pub use value::FormulaValue;
