//! Worksheet type

use std::collections::BTreeMap;

use crate::cell::{CellAddress, CellRange, CellValue};
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS, MAX_SHEET_NAME_LEN};

static EMPTY: CellValue = CellValue::Empty;

/// A worksheet holding plain cell values
///
/// Storage is sparse and ordered row-major, so iteration and used-range
/// computation follow sheet order.
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Non-empty cells keyed by (row, col)
    cells: BTreeMap<(u32, u16), CellValue>,
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the sheet
    pub fn set_name<S: Into<String>>(&mut self, name: S) -> Result<()> {
        let name = name.into();
        validate_sheet_name(&name)?;
        self.name = name;
        Ok(())
    }

    /// Get a cell value by A1 address
    pub fn value(&self, address: &str) -> Result<&CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.value_at(addr.row, addr.col))
    }

    /// Get a cell value by position (empty when nothing is stored)
    pub fn value_at(&self, row: u32, col: u16) -> &CellValue {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    /// Set a cell value by A1 address
    pub fn set_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_value_at(addr.row, addr.col, value)
    }

    /// Set a cell value by position; storing `Empty` clears the cell
    pub fn set_value_at<V: Into<CellValue>>(&mut self, row: u32, col: u16, value: V) -> Result<()> {
        validate_cell_position(row, col)?;
        match value.into() {
            CellValue::Empty => {
                self.cells.remove(&(row, col));
            }
            value => {
                self.cells.insert((row, col), value);
            }
        }
        Ok(())
    }

    pub fn clear_at(&mut self, row: u32, col: u16) {
        self.cells.remove(&(row, col));
    }

    /// Clear every cell in a range
    pub fn clear_range(&mut self, range: &CellRange) {
        self.cells.retain(|&(r, c), _| !range.contains(r, c));
    }

    /// Bounding range of the stored cells
    pub fn used_range(&self) -> Option<CellRange> {
        let mut keys = self.cells.keys();
        let &(first_row, first_col) = keys.next()?;
        let mut bounds = (first_row, first_col, first_row, first_col);
        for &(row, col) in keys {
            bounds.1 = bounds.1.min(col);
            bounds.2 = bounds.2.max(row);
            bounds.3 = bounds.3.max(col);
        }
        Some(CellRange::from_indices(bounds.0, bounds.1, bounds.2, bounds.3))
    }

    /// Move rows `first..=last` by `delta` rows
    ///
    /// Cells already at the destination are overwritten and the vacated rows
    /// end up empty. Fails without changing anything when the block would
    /// leave the sheet.
    pub fn shift_rows(&mut self, first: u32, last: u32, delta: i64) -> Result<()> {
        check_row_shift(first, last, delta)?;
        if delta == 0 {
            return Ok(());
        }
        let dest_first = (first as i64 + delta) as u32;
        let dest_last = (last as i64 + delta) as u32;

        let moved: Vec<_> = self
            .cells
            .range((first, 0)..=(last, MAX_COLS - 1))
            .map(|(&k, _)| k)
            .collect();
        let mut block = Vec::with_capacity(moved.len());
        for key in moved {
            if let Some(value) = self.cells.remove(&key) {
                block.push((key, value));
            }
        }
        self.cells
            .retain(|&(r, _), _| r < dest_first || r > dest_last);
        for ((row, col), value) in block {
            self.cells.insert(((row as i64 + delta) as u32, col), value);
        }
        Ok(())
    }

    /// Insert `count` empty rows before row `at`
    ///
    /// Fails without changing anything when populated rows would be pushed
    /// off the sheet.
    pub fn insert_rows(&mut self, at: u32, count: u32) -> Result<()> {
        let last = self.cells.keys().next_back().map(|&(row, _)| row);
        match last {
            Some(last) if count > 0 && last >= at => self.shift_rows(at, last, count as i64),
            _ => Ok(()),
        }
    }

    /// Remove rows `at..at + count`; the rows below move up
    pub fn delete_rows(&mut self, at: u32, count: u32) -> Result<()> {
        let below = at as u64 + count as u64;
        if below > MAX_ROWS as u64 {
            return Err(Error::RowOutOfBounds(below - 1, MAX_ROWS - 1));
        }
        if count == 0 {
            return Ok(());
        }
        self.cells.retain(|&(r, _), _| r < at || r as u64 >= below);
        if below < MAX_ROWS as u64 {
            self.shift_rows(below as u32, MAX_ROWS - 1, -(count as i64))?;
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over stored cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        self.cells.iter().map(|(&(r, c), v)| (r, c, v))
    }
}

/// Validate a row block shift against the sheet bounds
pub fn check_row_shift(first: u32, last: u32, delta: i64) -> Result<()> {
    if first > last || last >= MAX_ROWS {
        return Err(Error::InvalidRange(format!("rows {}..={}", first + 1, last + 1)));
    }
    let dest_first = first as i64 + delta;
    let dest_last = last as i64 + delta;
    if dest_first < 0 {
        return Err(Error::RowOutOfBounds(0, MAX_ROWS - 1));
    }
    if dest_last >= MAX_ROWS as i64 {
        return Err(Error::RowOutOfBounds(dest_last as u64, MAX_ROWS - 1));
    }
    Ok(())
}

fn validate_cell_position(row: u32, col: u16) -> Result<()> {
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row as u64, MAX_ROWS - 1));
    }
    if col >= MAX_COLS {
        return Err(Error::ColumnOutOfBounds(col as u32, MAX_COLS - 1));
    }
    Ok(())
}

/// Check a sheet name against Excel's rules
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = |why: &str| Error::InvalidSheetName(format!("'{}': {}", name, why));
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(invalid("longer than 31 characters"));
    }
    if name.contains(['[', ']', ':', '*', '?', '/', '\\']) {
        return Err(invalid("contains a reserved character"));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid("starts or ends with an apostrophe"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_clear_values() {
        let mut sheet = Worksheet::new("Data");
        sheet.set_value("A1", 1.0).unwrap();
        sheet.set_value("B2", "text").unwrap();
        assert_eq!(sheet.value("A1").unwrap(), &CellValue::Number(1.0));
        assert_eq!(sheet.value_at(1, 1).as_string(), Some("text"));
        assert_eq!(sheet.cell_count(), 2);

        sheet.set_value("A1", CellValue::Empty).unwrap();
        assert!(sheet.value("A1").unwrap().is_empty());
        assert_eq!(sheet.cell_count(), 1);
        assert!(sheet.set_value_at(MAX_ROWS, 0, 1.0).is_err());
    }

    #[test]
    fn test_used_range() {
        let mut sheet = Worksheet::new("Data");
        assert!(sheet.used_range().is_none());
        sheet.set_value("C2", 1.0).unwrap();
        sheet.set_value("A5", 1.0).unwrap();
        assert_eq!(sheet.used_range().unwrap().to_a1_string(), "A2:C5");
    }

    #[test]
    fn test_shift_rows_overwrites_destination() {
        let mut sheet = Worksheet::new("Data");
        sheet.set_value("A1", 1.0).unwrap();
        sheet.set_value("A2", 2.0).unwrap();
        sheet.set_value("A3", 3.0).unwrap();

        // delete row 1: move rows 2.. up by one
        sheet.shift_rows(1, MAX_ROWS - 1, -1).unwrap();
        let values: Vec<_> = sheet.iter().map(|(r, _, v)| (r, v.clone())).collect();
        assert_eq!(
            values,
            vec![(0, CellValue::Number(2.0)), (1, CellValue::Number(3.0))]
        );

        assert!(sheet.shift_rows(0, 1, -1).is_err());
        assert!(sheet.shift_rows(0, MAX_ROWS - 1, 1).is_err());
        assert_eq!(sheet.cell_count(), 2);
    }

    #[test]
    fn test_insert_and_delete_rows() {
        let mut sheet = Worksheet::new("Data");
        sheet.set_value("A1", 1.0).unwrap();
        sheet.set_value("A3", 3.0).unwrap();
        sheet.set_value("B4", 4.0).unwrap();

        sheet.insert_rows(2, 2).unwrap();
        let rows: Vec<_> = sheet.iter().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(rows, vec![(0, 0), (4, 0), (5, 1)]);

        sheet.delete_rows(0, 5).unwrap();
        let rows: Vec<_> = sheet.iter().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(rows, vec![(0, 1)]);
        assert_eq!(sheet.value("B1").unwrap(), &CellValue::Number(4.0));

        sheet.set_value_at(MAX_ROWS - 1, 0, 9.0).unwrap();
        assert!(sheet.insert_rows(0, 1).is_err());
        sheet.delete_rows(MAX_ROWS - 1, 1).unwrap();
        assert!(sheet.delete_rows(MAX_ROWS - 1, 2).is_err());
        assert_eq!(sheet.cell_count(), 1);
    }

    #[test]
    fn test_sheet_name_rules() {
        assert!(validate_sheet_name("Q1 Sales").is_ok());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("'quoted").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
    }
}
