//! Prelude module - common imports for xlcalc users
//!
//! ```rust
//! use xlcalc::prelude::*;
//! ```

pub use crate::{
    // Calculation types
    CalculationOptions,
    CalculationStats,
    // Cell types
    CellAddress,
    CellError,
    CellRange,
    CellValue,
    // Engine types
    EngineOptions,
    // Error types
    Error,
    FormulaValue,
    NameScope,
    Result,
    TableDef,
    // Main types
    Workbook,
    // Extension traits
    WorkbookCalculationExt,
    Worksheet,
};
