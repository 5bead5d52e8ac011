//! Structured table metadata
//!
//! A table occupies a rectangle on one sheet: an optional header row, the data
//! body, then an optional totals row. Structured references (`Table1[Qty]`)
//! resolve against these parts.

use crate::cell::{CellAddress, CellRange};
use crate::error::{Error, Result};
use crate::named_range::validate_name;

/// A table definition
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableDef {
    /// Table name, unique in the workbook (case-insensitive)
    pub name: String,
    /// Sheet index holding the table
    pub sheet: usize,
    /// Whole table extent, header and totals rows included
    pub range: CellRange,
    /// Whether the first row is a header row
    pub has_headers: bool,
    /// Whether the last row is a totals row
    pub has_totals: bool,
    /// Column names, left to right
    pub columns: Vec<String>,
}

impl TableDef {
    /// Create a table, checking that the columns fit the range
    pub fn new(
        name: impl Into<String>,
        sheet: usize,
        range: CellRange,
        has_headers: bool,
        has_totals: bool,
        columns: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name).map_err(|_| Error::InvalidTable {
            name: name.clone(),
            reason: "not a valid name".into(),
        })?;
        if columns.len() != range.col_count() as usize {
            return Err(Error::InvalidTable {
                name,
                reason: format!(
                    "{} column names for a range {} columns wide",
                    columns.len(),
                    range.col_count()
                ),
            });
        }
        let frame_rows = has_headers as u32 + has_totals as u32;
        if range.row_count() < frame_rows.max(1) {
            return Err(Error::InvalidTable {
                name,
                reason: "range too small for its header and totals rows".into(),
            });
        }
        Ok(Self {
            name,
            sheet,
            range,
            has_headers,
            has_totals,
            columns,
        })
    }

    /// Index of a column by name
    ///
    /// Matching is case-insensitive; `'` escapes (`'#`, `'[`, `']`, `''`) in the
    /// requested name are removed first.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = unescape_column_name(name.trim());
        self.columns
            .iter()
            .position(|c| c.to_lowercase() == wanted.to_lowercase())
    }

    /// Header row, if the table has one
    pub fn header_range(&self) -> Option<CellRange> {
        self.has_headers
            .then(|| self.rows(self.range.start.row, self.range.start.row))
    }

    /// Totals row, if the table has one
    pub fn totals_range(&self) -> Option<CellRange> {
        self.has_totals
            .then(|| self.rows(self.range.end.row, self.range.end.row))
    }

    /// Data body rows, `None` when the table has no data rows
    pub fn data_range(&self) -> Option<CellRange> {
        let (first, last) = self.data_rows()?;
        Some(self.rows(first, last))
    }

    /// First and last data row (inclusive)
    pub fn data_rows(&self) -> Option<(u32, u32)> {
        let first = self.range.start.row + self.has_headers as u32;
        let last = self.range.end.row.checked_sub(self.has_totals as u32)?;
        (first <= last).then_some((first, last))
    }

    /// Column of the sheet holding table column `idx`
    pub fn sheet_column(&self, idx: usize) -> u16 {
        self.range.start.col + idx as u16
    }

    fn rows(&self, first: u32, last: u32) -> CellRange {
        CellRange::new(
            CellAddress::absolute(first, self.range.start.col),
            CellAddress::absolute(last, self.range.end.col),
        )
    }
}

/// Remove the apostrophe escapes used inside bracketed column names
pub fn unescape_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '#' | '[' | ']' | '\'') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> TableDef {
        TableDef::new(
            "Sales",
            0,
            CellRange::parse("B2:D6").unwrap(),
            true,
            false,
            vec!["Region".into(), "Qty".into(), "Price [USD]".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_table_parts() {
        let t = sales();
        assert_eq!(t.header_range().unwrap().to_a1_string(), "$B$2:$D$2");
        assert_eq!(t.data_range().unwrap().to_a1_string(), "$B$3:$D$6");
        assert!(t.totals_range().is_none());
        assert_eq!(t.data_rows(), Some((2, 5)));
    }

    #[test]
    fn test_column_lookup() {
        let t = sales();
        assert_eq!(t.column_index("qty"), Some(1));
        assert_eq!(t.column_index("Price '[USD']"), Some(2));
        assert_eq!(t.column_index("Missing"), None);
        assert_eq!(t.sheet_column(1), 2);
    }

    #[test]
    fn test_rejects_mismatched_columns() {
        let err = TableDef::new(
            "T",
            0,
            CellRange::parse("A1:B3").unwrap(),
            true,
            true,
            vec!["only".into()],
        );
        assert!(err.is_err());
    }
}
