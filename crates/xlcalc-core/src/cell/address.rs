//! A1 cell addresses and rectangular ranges

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// One cell position plus the `$` flag of each axis.
///
/// Coordinates are 0-based. Copying or rebasing a formula moves only the
/// axes that are not absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellAddress {
    pub row: u32,
    pub col: u16,
    pub row_absolute: bool,
    pub col_absolute: bool,
}

impl CellAddress {
    /// Fully relative address
    pub fn new(row: u32, col: u16) -> Self {
        Self::with_absolute(row, col, false, false)
    }

    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// `$A$1` style address
    pub fn absolute(row: u32, col: u16) -> Self {
        Self::with_absolute(row, col, true, true)
    }

    /// Parse `C10`, `$C10`, `C$10` or `$C$10`.
    ///
    /// ```
    /// use xlcalc_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("C10").unwrap();
    /// assert_eq!((addr.row, addr.col), (9, 2));
    ///
    /// let addr = CellAddress::parse("A$7").unwrap();
    /// assert!(addr.row_absolute && !addr.col_absolute);
    ///
    /// assert!(CellAddress::parse("XFE10").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (col_part, row_part) = split_a1(s)
            .ok_or_else(|| Error::InvalidAddress(format!("'{}' is not an A1 reference", s)))?;
        let (col_absolute, letters) = strip_dollar(col_part);
        let (row_absolute, digits) = strip_dollar(row_part);
        Ok(Self {
            row: parse_row_number(digits)?,
            col: Self::letters_to_column(letters)?,
            row_absolute,
            col_absolute,
        })
    }

    /// Bijective base-26 column name: 0 is `A`, 26 is `AA`
    pub fn column_to_letters(col: u16) -> String {
        let mut n = u32::from(col) + 1;
        let mut out = Vec::new();
        while n > 0 {
            let digit = (n - 1) % 26;
            out.push(char::from(b'A' + digit as u8));
            n = (n - 1) / 26;
        }
        out.iter().rev().collect()
    }

    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() || letters.len() > 3 {
            return Err(Error::InvalidAddress(format!(
                "invalid column letters '{}'",
                letters
            )));
        }
        let n = letters.bytes().try_fold(0u32, |acc, b| {
            if b.is_ascii_alphabetic() {
                Ok(acc * 26 + u32::from(b.to_ascii_uppercase() - b'A') + 1)
            } else {
                Err(Error::InvalidAddress(format!(
                    "invalid column letter '{}'",
                    char::from(b)
                )))
            }
        })?;
        let col = n - 1;
        if col >= u32::from(MAX_COLS) {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        Ok(col as u16)
    }

    pub fn to_a1_string(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            Self::column_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }

    /// Move both axes by a delta, keeping the flags.
    ///
    /// `None` when the result leaves the sheet.
    pub fn offset(&self, row_delta: i64, col_delta: i64) -> Option<Self> {
        let row = u32::try_from(i64::from(self.row) + row_delta).ok()?;
        let col = u16::try_from(i64::from(self.col) + col_delta).ok()?;
        if row >= MAX_ROWS || col >= MAX_COLS {
            return None;
        }
        Some(Self { row, col, ..*self })
    }

    /// Move only the relative axes
    pub fn rebase(&self, row_delta: i64, col_delta: i64) -> Option<Self> {
        self.offset(
            if self.row_absolute { 0 } else { row_delta },
            if self.col_absolute { 0 } else { col_delta },
        )
    }

    pub fn position(&self) -> (u32, u16) {
        (self.row, self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `$AB$12` into `("$AB", "$12")`
fn split_a1(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('$').unwrap_or(s);
    let letters = body.bytes().take_while(u8::is_ascii_alphabetic).count();
    if letters == 0 {
        return None;
    }
    let split = s.len() - body.len() + letters;
    let rest = &s[split..];
    let digits = rest.strip_prefix('$').unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&s[..split], rest))
}

fn strip_dollar(s: &str) -> (bool, &str) {
    match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

/// 1-based row text to a 0-based index
pub(crate) fn parse_row_number(digits: &str) -> Result<u32> {
    let row: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("invalid row number '{}'", digits)))?;
    match row {
        0 => Err(Error::InvalidAddress("row number must be >= 1".into())),
        r if r > u64::from(MAX_ROWS) => Err(Error::RowOutOfBounds(r - 1, MAX_ROWS - 1)),
        r => Ok((r - 1) as u32),
    }
}

/// A rectangle of cells with `start` top-left and `end` bottom-right.
///
/// The absolute flags travel with whichever coordinate lands in each corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Build a range from any two corners
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let rows = if a.row <= b.row { (a, b) } else { (b, a) };
        let cols = if a.col <= b.col { (a, b) } else { (b, a) };
        Self {
            start: CellAddress::with_absolute(
                rows.0.row,
                cols.0.col,
                rows.0.row_absolute,
                cols.0.col_absolute,
            ),
            end: CellAddress::with_absolute(
                rows.1.row,
                cols.1.col,
                rows.1.row_absolute,
                cols.1.col_absolute,
            ),
        }
    }

    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Parse `A1:B10` or a lone `A1`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some((first, last)) = s.split_once(':') else {
            return Ok(Self::single(CellAddress::parse(s)?));
        };
        let corner = |part: &str| {
            CellAddress::parse(part).map_err(|_| Error::InvalidRange(s.to_string()))
        };
        Ok(Self::new(corner(first)?, corner(last)?))
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        (self.start.row..=self.end.row).contains(&row)
            && (self.start.col..=self.end.col).contains(&col)
    }

    pub fn is_single_cell(&self) -> bool {
        self.row_count() == 1 && self.col_count() == 1
    }

    /// Spans every row of its columns, as in `A:C`
    pub fn is_whole_columns(&self) -> bool {
        self.start.row == 0 && self.end.row == MAX_ROWS - 1
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.row_count()) * u64::from(self.col_count())
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.intersect(other).is_some()
    }

    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        let top = self.start.row.max(other.start.row);
        let bottom = self.end.row.min(other.end.row);
        let left = self.start.col.max(other.start.col);
        let right = self.end.col.min(other.end.col);
        (top <= bottom && left <= right).then(|| CellRange::from_indices(top, left, bottom, right))
    }

    /// Smallest range covering both
    pub fn bounding(&self, other: &CellRange) -> CellRange {
        CellRange::from_indices(
            self.start.row.min(other.start.row),
            self.start.col.min(other.start.col),
            self.end.row.max(other.end.row),
            self.end.col.max(other.end.col),
        )
    }

    /// `A1:B10`, or just `A1` when both corners are the same address
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters_round_trip() {
        for (col, name) in [(0, "A"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(CellAddress::column_to_letters(col), name);
            assert_eq!(CellAddress::letters_to_column(name).unwrap(), col);
        }
        assert_eq!(CellAddress::column_to_letters(16383), "XFD");
        assert_eq!(CellAddress::letters_to_column("abc").unwrap(), 730);
        assert!(CellAddress::letters_to_column("XFE").is_err());
        assert!(CellAddress::letters_to_column("AAAA").is_err());
        assert!(CellAddress::letters_to_column("A1").is_err());
    }

    #[test]
    fn test_parse_flags() {
        let addr = CellAddress::parse("$A1").unwrap();
        assert!(addr.col_absolute);
        assert!(!addr.row_absolute);

        let addr = CellAddress::parse("XFD1048576").unwrap();
        assert_eq!(addr.position(), (1_048_575, 16_383));

        assert_eq!(CellAddress::parse("$b$12").unwrap().to_a1_string(), "$B$12");
        assert!(CellAddress::parse("A0").is_err());
        assert!(CellAddress::parse("A1048577").is_err());
        assert!(CellAddress::parse("A1B").is_err());
        assert!(CellAddress::parse("A$").is_err());
        assert!(CellAddress::parse("$").is_err());
        assert!(CellAddress::parse("12").is_err());
    }

    #[test]
    fn test_rebase_keeps_absolute_axes() {
        let addr = CellAddress::parse("A$3").unwrap();
        assert_eq!(addr.rebase(5, 2).unwrap().to_a1_string(), "C$3");
        assert_eq!(addr.offset(5, 2).unwrap().to_a1_string(), "C$8");

        let addr = CellAddress::parse("B2").unwrap();
        assert!(addr.rebase(-2, 0).is_none());
        assert!(addr.offset(0, i64::from(MAX_COLS)).is_none());
    }

    #[test]
    fn test_range_normalizes_corners() {
        let range = CellRange::parse("C$5:$A1").unwrap();
        assert_eq!(range.to_a1_string(), "$A1:C$5");
        assert_eq!(range.row_count(), 5);
        assert_eq!(range.col_count(), 3);
        assert_eq!(range.cell_count(), 15);
        assert!(range.contains(4, 0));
        assert!(!range.contains(5, 0));
        assert!(CellRange::parse("A1:").is_err());
    }

    #[test]
    fn test_intersect_and_bounding() {
        let a = CellRange::parse("A1:C3").unwrap();
        let b = CellRange::parse("B2:D4").unwrap();
        assert_eq!(a.intersect(&b).unwrap().to_a1_string(), "B2:C3");
        assert_eq!(a.bounding(&b).to_a1_string(), "A1:D4");
        assert!(a.overlaps(&b));

        let e5 = CellRange::parse("E5").unwrap();
        assert!(e5.is_single_cell());
        assert!(a.intersect(&e5).is_none());
        assert!(!a.overlaps(&e5));
    }
}
