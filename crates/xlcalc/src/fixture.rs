//! JSON workbook fixtures
//!
//! A small document format for describing a workbook in tests and on the
//! command line:
//!
//! ```json
//! {
//!   "sheets": [
//!     { "name": "Sheet1", "cells": { "A1": 10, "A2": "=A1*2", "A3": "'=not a formula" } }
//!   ],
//!   "names": [ { "name": "Rate", "formula": "=0.25" } ],
//!   "tables": [
//!     { "name": "Sales", "sheet": "Sheet1", "range": "C1:D4", "columns": ["Item", "Qty"] }
//!   ],
//!   "shared": [ { "sheet": "Sheet1", "range": "B1:B3", "formula": "=A1+1" } ],
//!   "arrays": [ { "sheet": "Sheet1", "range": "E1:F1", "formula": "={1,2}" } ]
//! }
//! ```
//!
//! Cell strings starting with `=` are formulas, strings matching an error
//! literal are errors and a leading `'` keeps the rest as text. Names and
//! tables are registered before any formula is parsed, in document order.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use xlcalc_core::{CellAddress, CellError, CellRange, CellValue, NameScope, TableDef};

use crate::error::{Error, Result};
use crate::workbook::Workbook;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BookFixture {
    sheets: Vec<SheetFixture>,
    #[serde(default)]
    names: Vec<NameFixture>,
    #[serde(default)]
    tables: Vec<TableFixture>,
    #[serde(default)]
    shared: Vec<RangeFormulaFixture>,
    #[serde(default)]
    arrays: Vec<RangeFormulaFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetFixture {
    name: String,
    #[serde(default)]
    cells: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameFixture {
    name: String,
    /// Sheet scope; workbook scope when absent
    sheet: Option<String>,
    formula: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableFixture {
    name: String,
    sheet: String,
    range: String,
    #[serde(default = "default_true")]
    headers: bool,
    #[serde(default)]
    totals: bool,
    columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeFormulaFixture {
    sheet: String,
    range: String,
    formula: String,
}

fn default_true() -> bool {
    true
}

/// What a fixture cell holds
enum CellEntry {
    Value(CellValue),
    Formula(String),
}

fn cell_entry(address: &str, value: Value) -> Result<Option<CellEntry>> {
    let entry = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => CellEntry::Value(CellValue::Boolean(b)),
        Value::Number(n) => {
            let n = n
                .as_f64()
                .ok_or_else(|| Error::Fixture(format!("{}: number out of range", address)))?;
            CellEntry::Value(CellValue::Number(n))
        }
        Value::String(s) => {
            if let Some(text) = s.strip_prefix('\'') {
                CellEntry::Value(CellValue::string(text))
            } else if s.starts_with('=') {
                CellEntry::Formula(s)
            } else if let Some(e) = CellError::from_str(&s) {
                CellEntry::Value(CellValue::Error(e))
            } else {
                CellEntry::Value(CellValue::string(s))
            }
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(Error::Fixture(format!(
                "{}: cells hold numbers, booleans or strings",
                address
            )))
        }
    };
    Ok(Some(entry))
}

impl Workbook {
    /// Build a workbook from a JSON fixture
    pub fn from_json(text: &str) -> Result<Self> {
        let fixture: BookFixture = serde_json::from_str(text)?;
        let mut book = Workbook::empty();
        for sheet in &fixture.sheets {
            book.add_sheet(sheet.name.as_str())?;
        }

        let mut formulas = Vec::new();
        for (index, sheet) in fixture.sheets.into_iter().enumerate() {
            for (address, value) in sheet.cells {
                match cell_entry(&address, value)? {
                    Some(CellEntry::Value(v)) => book.set_value(index, &address, v)?,
                    Some(CellEntry::Formula(f)) => formulas.push((index, address, f)),
                    None => {}
                }
            }
        }

        for name in fixture.names {
            let scope = match &name.sheet {
                Some(sheet) => NameScope::Sheet(book.sheet_by_name(sheet)?),
                None => NameScope::Workbook,
            };
            book.define_name(&name.name, scope, &name.formula)?;
        }
        for table in fixture.tables {
            let sheet = book.sheet_by_name(&table.sheet)?;
            book.add_table(TableDef::new(
                table.name,
                sheet,
                CellRange::parse(&table.range)?,
                table.headers,
                table.totals,
                table.columns,
            )?)?;
        }

        for (sheet, address, text) in formulas {
            book.set_formula(sheet, &address, &text)?;
        }
        for shared in fixture.shared {
            let sheet = book.sheet_by_name(&shared.sheet)?;
            book.set_shared_formula(sheet, &shared.range, &shared.formula)?;
        }
        for array in fixture.arrays {
            let sheet = book.sheet_by_name(&array.sheet)?;
            book.set_array_formula(sheet, &array.range, &array.formula)?;
        }
        Ok(book)
    }

    /// Stored values of every sheet as `{ sheet: { address: value } }`
    pub fn values_json(&self) -> Value {
        let mut sheets = Map::new();
        for index in 0..self.sheet_count() {
            let Some(ws) = self.worksheet(index) else {
                continue;
            };
            let mut cells = Map::new();
            for (row, col, value) in ws.iter() {
                let address = CellAddress::new(row, col).to_a1_string();
                cells.insert(address, serde_json::to_value(value).unwrap_or(Value::Null));
            }
            sheets.insert(ws.name().to_string(), Value::Object(cells));
        }
        Value::Object(sheets)
    }

    fn sheet_by_name(&self, name: &str) -> Result<usize> {
        self.sheet_index(name)
            .ok_or_else(|| Error::UnknownSheet(name.to_string()))
    }
}
