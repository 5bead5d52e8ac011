//! # xlcalc-core
//!
//! Core data structures shared by the xlcalc crates.
//!
//! This crate provides:
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing with per-axis absolute flags
//! - [`CellValue`] and [`CellError`] - Plain cell values and the Excel error codes
//! - [`TableDef`] - Structured table metadata (header/data/totals rows, columns)
//! - [`Worksheet`] - A sparse value store used by the in-memory workbook
//!
//! ## Example
//!
//! ```rust
//! use xlcalc_core::{CellAddress, CellValue, Worksheet};
//!
//! let mut sheet = Worksheet::new("Sheet1");
//! sheet.set_value("B2", 42.0).unwrap();
//!
//! let addr = CellAddress::parse("$B2").unwrap();
//! assert!(addr.col_absolute);
//! assert_eq!(sheet.value_at(addr.row, addr.col), &CellValue::Number(42.0));
//! ```

pub mod cell;
pub mod error;
pub mod named_range;
pub mod table;
pub mod worksheet;

pub use cell::{CellAddress, CellError, CellRange, CellValue, SharedString};
pub use error::{Error, Result};
pub use named_range::{validate_name, NameEntry, NameScope, NameTable};
pub use table::{unescape_column_name, TableDef};
pub use worksheet::{check_row_shift, validate_sheet_name, Worksheet};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
