//! Parsed formula tokens
//!
//! A [`Formula`] is a postfix program: operands push, operators and function
//! calls pop. Reference tokens store absolute grid positions together with
//! per-axis `$` flags, so moving a formula (shared formulas, row shifts)
//! rewrites only the relative axes.

use std::fmt;

use xlcalc_core::{CellAddress, CellError, CellRange, SharedString, MAX_COLS, MAX_ROWS};

use crate::value::FormulaValue;

/// Index into the workbook's defined-name table
pub type NameId = usize;

/// Inclusive range of sheet indices (`Sheet1:Sheet3!`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetSpan {
    pub first: usize,
    pub last: usize,
}

impl SheetSpan {
    pub fn single(sheet: usize) -> Self {
        Self {
            first: sheet,
            last: sheet,
        }
    }

    pub fn new(a: usize, b: usize) -> Self {
        Self {
            first: a.min(b),
            last: a.max(b),
        }
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }

    pub fn sheets(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

/// How an area was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaShape {
    /// `A1:B2`
    Cells,
    /// `A:C`, every row of the columns
    Columns,
    /// `1:3`, every column of the rows
    Rows,
}

/// A rectangular reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    pub range: CellRange,
    pub shape: AreaShape,
}

impl Area {
    pub fn cells(first: CellAddress, last: CellAddress) -> Self {
        Self {
            range: CellRange::new(first, last),
            shape: AreaShape::Cells,
        }
    }

    /// Whole columns `first..=last`
    pub fn columns(first: u16, first_abs: bool, last: u16, last_abs: bool) -> Self {
        Self {
            range: CellRange::new(
                CellAddress::with_absolute(0, first, true, first_abs),
                CellAddress::with_absolute(MAX_ROWS - 1, last, true, last_abs),
            ),
            shape: AreaShape::Columns,
        }
    }

    /// Whole rows `first..=last`
    pub fn rows(first: u32, first_abs: bool, last: u32, last_abs: bool) -> Self {
        Self {
            range: CellRange::new(
                CellAddress::with_absolute(first, 0, first_abs, true),
                CellAddress::with_absolute(last, MAX_COLS - 1, last_abs, true),
            ),
            shape: AreaShape::Rows,
        }
    }

    /// Move the relative axes; `None` when a corner leaves the sheet
    pub fn rebase(&self, row_delta: i64, col_delta: i64) -> Option<Self> {
        let (dr, dc) = match self.shape {
            AreaShape::Cells => (row_delta, col_delta),
            AreaShape::Columns => (0, col_delta),
            AreaShape::Rows => (row_delta, 0),
        };
        let start = self.range.start.rebase(dr, dc)?;
        let end = self.range.end.rebase(dr, dc)?;
        Some(Self {
            range: CellRange::new(start, end),
            shape: self.shape,
        })
    }
}

/// What an external reference points at
#[derive(Debug, Clone, PartialEq)]
pub enum ExternTarget {
    Cell(CellAddress),
    Area(Area),
    Name(String),
}

/// `[k]Sheet!A1`, `[k]!Name`; book 0 is the current workbook
#[derive(Debug, Clone, PartialEq)]
pub struct ExternRef {
    pub book: usize,
    pub sheet: Option<String>,
    pub target: ExternTarget,
}

/// Function identity as stored in the token stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Built-in with a fixed argument count
    Fixed,
    /// Built-in with a variable argument count
    Variable,
    /// Not a built-in; dispatched by name
    AddIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `:`
    Range,
    /// `,` inside parentheses
    Union,
    /// space
    Intersect,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Range => ":",
            BinaryOp::Union => ",",
            BinaryOp::Intersect => " ",
        }
    }

    pub fn is_reference_op(&self) -> bool {
        matches!(self, BinaryOp::Range | BinaryOp::Union | BinaryOp::Intersect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    /// Postfix `%`
    Percent,
}

/// `Table[@]`, `Table[@Col]`, `Table[@[A]:[B]]`
///
/// Resolved against the row of the evaluating cell, so one formula can be
/// shared down a table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThisRow {
    pub table: SharedString,
    /// First and last column; `None` for every column
    pub columns: Option<(SharedString, SharedString)>,
}

/// One element of a parsed formula
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Text(SharedString),
    Bool(bool),
    Error(CellError),
    /// An omitted argument (`ROUND(1,)`)
    MissingArg,
    /// Inline array constant `{1,2;3,4}`
    Array(Vec<Vec<FormulaValue>>),

    /// Cell on the formula's own sheet
    Ref(CellAddress),
    /// Area on the formula's own sheet
    Area(Area),
    /// Cell on an explicit sheet span
    Ref3d { sheets: SheetSpan, cell: CellAddress },
    /// Area on an explicit sheet span
    Area3d { sheets: SheetSpan, area: Area },
    ExternRef(ExternRef),
    Name(NameId),
    ThisRow(ThisRow),

    Function {
        name: SharedString,
        argc: usize,
        kind: FunctionKind,
    },
    Binary(BinaryOp),
    Unary(UnaryOp),

    /// Parentheses around the preceding operand (rendering only)
    Paren,
    /// Single-argument SUM
    AttrSum,
    /// Formula contains a volatile function; always the first token
    AttrVolatile,
    /// Pops the IF condition; when false skips this many tokens
    AttrIf(usize),
    /// End of the taken IF branch; skips this many tokens
    AttrSkip(usize),
}

impl Token {
    /// Whether the token pushes a reference operand
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Token::Ref(_)
                | Token::Area(_)
                | Token::Ref3d { .. }
                | Token::Area3d { .. }
                | Token::ExternRef(_)
                | Token::Name(_)
                | Token::ThisRow(_)
        )
    }

    fn rebased(&self, row_delta: i64, col_delta: i64) -> Token {
        let moved = match self {
            Token::Ref(cell) => cell.rebase(row_delta, col_delta).map(Token::Ref),
            Token::Area(area) => area.rebase(row_delta, col_delta).map(Token::Area),
            Token::Ref3d { sheets, cell } => cell
                .rebase(row_delta, col_delta)
                .map(|cell| Token::Ref3d { sheets: *sheets, cell }),
            Token::Area3d { sheets, area } => area
                .rebase(row_delta, col_delta)
                .map(|area| Token::Area3d { sheets: *sheets, area }),
            Token::ExternRef(ext) => {
                let target = match &ext.target {
                    ExternTarget::Cell(cell) => {
                        cell.rebase(row_delta, col_delta).map(ExternTarget::Cell)
                    }
                    ExternTarget::Area(area) => {
                        area.rebase(row_delta, col_delta).map(ExternTarget::Area)
                    }
                    ExternTarget::Name(name) => Some(ExternTarget::Name(name.clone())),
                };
                target.map(|target| {
                    Token::ExternRef(ExternRef {
                        book: ext.book,
                        sheet: ext.sheet.clone(),
                        target,
                    })
                })
            }
            other => return other.clone(),
        };
        moved.unwrap_or(Token::Error(CellError::Ref))
    }
}

/// A parsed formula: a postfix token array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formula {
    tokens: Vec<Token>,
}

impl Formula {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the formula calls a volatile function
    pub fn is_volatile(&self) -> bool {
        matches!(self.tokens.first(), Some(Token::AttrVolatile))
    }

    /// Copy of the formula moved by the given offset
    ///
    /// Only relative axes move. A reference pushed off the sheet becomes a
    /// `#REF!` literal, as Excel does when copying.
    pub fn rebase(&self, row_delta: i64, col_delta: i64) -> Formula {
        if row_delta == 0 && col_delta == 0 {
            return self.clone();
        }
        Formula {
            tokens: self
                .tokens
                .iter()
                .map(|t| t.rebased(row_delta, col_delta))
                .collect(),
        }
    }

    /// Rewrite references that name sheet `old` of the current workbook
    /// textually (`[0]Old!A1`). Returns `None` when nothing changed.
    pub fn rename_sheet(&self, old: &str, new: &str) -> Option<Formula> {
        let mut changed = false;
        let tokens = self
            .tokens
            .iter()
            .map(|t| match t {
                Token::ExternRef(ext)
                    if ext.book == 0
                        && ext
                            .sheet
                            .as_deref()
                            .is_some_and(|s| s.eq_ignore_ascii_case(old)) =>
                {
                    changed = true;
                    Token::ExternRef(ExternRef {
                        sheet: Some(new.to_string()),
                        ..ext.clone()
                    })
                }
                other => other.clone(),
            })
            .collect();
        changed.then(|| Formula { tokens })
    }
}

/// Rows inserted into or deleted from one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEdit {
    /// `count` blank rows before row `at`
    Insert { at: u32, count: u32 },
    /// Rows `at..at + count` removed, the rows below move up
    Delete { at: u32, count: u32 },
}

impl RowEdit {
    /// Where `row` ends up; `None` when it is deleted or pushed off the sheet
    pub fn map_row(&self, row: u32) -> Option<u32> {
        match *self {
            RowEdit::Insert { at, count } if row >= at => {
                row.checked_add(count).filter(|r| *r < MAX_ROWS)
            }
            RowEdit::Insert { .. } => Some(row),
            RowEdit::Delete { at, count } => {
                if row < at {
                    Some(row)
                } else if row - at < count {
                    None
                } else {
                    Some(row - count)
                }
            }
        }
    }

    /// Where the rows `first..=last` end up
    ///
    /// An insertion strictly inside the span grows it, a deletion shrinks it.
    /// `None` when every row is deleted or the span leaves the sheet.
    pub fn map_span(&self, first: u32, last: u32) -> Option<(u32, u32)> {
        match *self {
            RowEdit::Insert { .. } => Some((self.map_row(first)?, self.map_row(last)?)),
            RowEdit::Delete { at, count } => {
                let end = at.saturating_add(count);
                if first >= at && last < end {
                    return None;
                }
                let first = if first < at {
                    first
                } else if first >= end {
                    first - count
                } else {
                    at
                };
                let last = if last >= end {
                    last - count
                } else if last >= at {
                    at - 1
                } else {
                    last
                };
                Some((first, last))
            }
        }
    }
}

/// The sheet a row edit applies to
#[derive(Debug, Clone, Copy)]
pub struct EditedSheet<'a> {
    pub index: usize,
    pub name: &'a str,
}

fn adjust_cell(cell: &CellAddress, edit: RowEdit) -> Option<CellAddress> {
    let row = edit.map_row(cell.row)?;
    Some(CellAddress { row, ..*cell })
}

fn adjust_area(area: &Area, edit: RowEdit) -> Option<Area> {
    if area.shape == AreaShape::Columns {
        return Some(*area);
    }
    let (first, last) = edit.map_span(area.range.start.row, area.range.end.row)?;
    Some(Area {
        range: CellRange {
            start: CellAddress {
                row: first,
                ..area.range.start
            },
            end: CellAddress {
                row: last,
                ..area.range.end
            },
        },
        shape: area.shape,
    })
}

impl Formula {
    /// Follow a row insertion or deletion on `sheet`
    ///
    /// `own_sheet` is the sheet unqualified references point at (`None` for
    /// workbook-scope names). Absolute and relative rows both follow the
    /// cells they name; references into deleted rows become `#REF!`.
    /// Returns `None` when nothing changed.
    pub fn adjust_rows(
        &self,
        own_sheet: Option<usize>,
        sheet: EditedSheet<'_>,
        edit: RowEdit,
    ) -> Option<Formula> {
        let local = own_sheet == Some(sheet.index);
        let mut changed = false;
        let tokens = self
            .tokens
            .iter()
            .map(|t| {
                let adjusted = match t {
                    Token::Ref(cell) if local => Some(adjust_cell(cell, edit).map(Token::Ref)),
                    Token::Area(area) if local => Some(adjust_area(area, edit).map(Token::Area)),
                    Token::Ref3d { sheets, cell } if sheets.is_single() && sheets.first == sheet.index => {
                        Some(adjust_cell(cell, edit).map(|cell| Token::Ref3d { sheets: *sheets, cell }))
                    }
                    Token::Area3d { sheets, area } if sheets.is_single() && sheets.first == sheet.index => {
                        Some(adjust_area(area, edit).map(|area| Token::Area3d { sheets: *sheets, area }))
                    }
                    Token::ExternRef(ext)
                        if ext.book == 0
                            && ext
                                .sheet
                                .as_deref()
                                .is_some_and(|s| s.eq_ignore_ascii_case(sheet.name)) =>
                    {
                        let target = match &ext.target {
                            ExternTarget::Cell(cell) => adjust_cell(cell, edit).map(ExternTarget::Cell),
                            ExternTarget::Area(area) => adjust_area(area, edit).map(ExternTarget::Area),
                            ExternTarget::Name(_) => return t.clone(),
                        };
                        Some(target.map(|target| Token::ExternRef(ExternRef { target, ..ext.clone() })))
                    }
                    _ => None,
                };
                match adjusted {
                    Some(moved) => {
                        let moved = moved.unwrap_or(Token::Error(CellError::Ref));
                        changed |= moved != *t;
                        moved
                    }
                    None => t.clone(),
                }
            })
            .collect();
        changed.then(|| Formula { tokens })
    }
}

impl From<Vec<Token>> for Formula {
    fn from(tokens: Vec<Token>) -> Self {
        Formula::new(tokens)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "Number({})", n),
            Token::Text(s) => write!(f, "Text({:?})", s.as_str()),
            Token::Bool(b) => write!(f, "Bool({})", if *b { "TRUE" } else { "FALSE" }),
            Token::Error(e) => write!(f, "Error({})", e),
            Token::MissingArg => f.write_str("MissingArg"),
            Token::Array(rows) => write!(f, "Array({})", FormulaValue::Array(rows.clone())),
            Token::Ref(cell) => write!(f, "Ref({})", cell),
            Token::Area(area) => write!(f, "Area({}:{})", area.range.start, area.range.end),
            Token::Ref3d { sheets, cell } => {
                write!(f, "Ref3d([{}..{}] {})", sheets.first, sheets.last, cell)
            }
            Token::Area3d { sheets, area } => write!(
                f,
                "Area3d([{}..{}] {}:{})",
                sheets.first, sheets.last, area.range.start, area.range.end
            ),
            Token::ExternRef(ext) => {
                write!(f, "ExternRef([{}]", ext.book)?;
                if let Some(sheet) = &ext.sheet {
                    write!(f, "{}", sheet)?;
                }
                match &ext.target {
                    ExternTarget::Cell(cell) => write!(f, "!{})", cell),
                    ExternTarget::Area(area) => {
                        write!(f, "!{}:{})", area.range.start, area.range.end)
                    }
                    ExternTarget::Name(name) => write!(f, "!{})", name),
                }
            }
            Token::Name(id) => write!(f, "Name(#{})", id),
            Token::ThisRow(t) => match &t.columns {
                Some((a, b)) => write!(f, "ThisRow({} {}:{})", t.table, a, b),
                None => write!(f, "ThisRow({})", t.table),
            },
            Token::Function { name, argc, kind } => {
                write!(f, "Function({}, {}, {:?})", name, argc, kind)
            }
            Token::Binary(op) => write!(f, "Binary({:?})", op),
            Token::Unary(op) => write!(f, "Unary({:?})", op),
            Token::Paren => f.write_str("Paren"),
            Token::AttrSum => f.write_str("AttrSum"),
            Token::AttrVolatile => f.write_str("AttrVolatile"),
            Token::AttrIf(n) => write!(f, "AttrIf({})", n),
            Token::AttrSkip(n) => write!(f, "AttrSkip({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    #[test]
    fn test_rebase_moves_relative_axes_only() {
        let formula = Formula::new(vec![
            Token::Ref(cell("B1")),
            Token::Ref(cell("$B$2")),
            Token::Binary(BinaryOp::Add),
        ]);
        let moved = formula.rebase(0, 2);
        assert_eq!(
            moved.tokens(),
            &[
                Token::Ref(cell("D1")),
                Token::Ref(cell("$B$2")),
                Token::Binary(BinaryOp::Add)
            ]
        );
    }

    #[test]
    fn test_rebase_off_sheet_becomes_ref_error() {
        let formula = Formula::new(vec![Token::Ref(cell("A1"))]);
        assert_eq!(formula.rebase(-1, 0).tokens(), &[Token::Error(CellError::Ref)]);
    }

    #[test]
    fn test_whole_column_ignores_row_delta() {
        let area = Area::columns(0, false, 2, true);
        let moved = area.rebase(10, 1).unwrap();
        assert_eq!(moved.range.start.col, 1);
        assert_eq!(moved.range.end.col, 2);
        assert_eq!(moved.range.start.row, 0);
        assert!(moved.range.is_whole_columns());
    }

    const DATA: EditedSheet<'static> = EditedSheet { index: 0, name: "Data" };

    #[test]
    fn test_insert_moves_rows_at_or_below() {
        let formula = Formula::new(vec![
            Token::Ref(cell("A1")),
            Token::Ref(cell("$A$4")),
            Token::Area(Area::cells(cell("B2"), cell("B6"))),
            Token::Area(Area::columns(0, false, 0, false)),
        ]);
        let edit = RowEdit::Insert { at: 2, count: 2 };
        let adjusted = formula.adjust_rows(Some(0), DATA, edit).unwrap();
        assert_eq!(
            adjusted.tokens(),
            &[
                Token::Ref(cell("A1")),
                Token::Ref(cell("$A$6")),
                Token::Area(Area::cells(cell("B2"), cell("B8"))),
                Token::Area(Area::columns(0, false, 0, false)),
            ]
        );
        assert!(formula.adjust_rows(Some(1), DATA, edit).is_none());
    }

    #[test]
    fn test_delete_shrinks_areas_and_breaks_cells() {
        let formula = Formula::new(vec![
            Token::Ref(cell("A3")),
            Token::Ref(cell("A9")),
            Token::Area(Area::cells(cell("B2"), cell("B6"))),
            Token::Area(Area::cells(cell("C3"), cell("C4"))),
        ]);
        let adjusted = formula
            .adjust_rows(Some(0), DATA, RowEdit::Delete { at: 2, count: 3 })
            .unwrap();
        assert_eq!(
            adjusted.tokens(),
            &[
                Token::Error(CellError::Ref),
                Token::Ref(cell("A6")),
                Token::Area(Area::cells(cell("B2"), cell("B3"))),
                Token::Error(CellError::Ref),
            ]
        );
    }

    #[test]
    fn test_row_edit_follows_qualified_references() {
        let formula = Formula::new(vec![
            Token::Ref3d {
                sheets: SheetSpan::single(0),
                cell: cell("A5"),
            },
            Token::ExternRef(ExternRef {
                book: 0,
                sheet: Some("data".into()),
                target: ExternTarget::Cell(cell("A5")),
            }),
        ]);
        let adjusted = formula
            .adjust_rows(None, DATA, RowEdit::Delete { at: 0, count: 1 })
            .unwrap();
        assert_eq!(
            adjusted.tokens()[0],
            Token::Ref3d {
                sheets: SheetSpan::single(0),
                cell: cell("A4")
            }
        );
        match &adjusted.tokens()[1] {
            Token::ExternRef(ext) => assert_eq!(ext.target, ExternTarget::Cell(cell("A4"))),
            other => panic!("unexpected token {other}"),
        }
    }

    #[test]
    fn test_map_span() {
        let insert = RowEdit::Insert { at: 5, count: 1 };
        assert_eq!(insert.map_span(5, 8), Some((6, 9)));
        assert_eq!(insert.map_span(2, 5), Some((2, 6)));
        assert_eq!(insert.map_span(0, 4), Some((0, 4)));
        let delete = RowEdit::Delete { at: 5, count: 2 };
        assert_eq!(delete.map_span(5, 6), None);
        assert_eq!(delete.map_span(6, 9), Some((5, 7)));
        assert_eq!(delete.map_span(0, 5), Some((0, 4)));
        assert_eq!(RowEdit::Insert { at: 0, count: 1 }.map_row(MAX_ROWS - 1), None);
    }

    #[test]
    fn test_rename_sheet_rewrites_self_references() {
        let formula = Formula::new(vec![Token::ExternRef(ExternRef {
            book: 0,
            sheet: Some("Data".into()),
            target: ExternTarget::Cell(cell("A1")),
        })]);
        let renamed = formula.rename_sheet("data", "Input").unwrap();
        match &renamed.tokens()[0] {
            Token::ExternRef(ext) => assert_eq!(ext.sheet.as_deref(), Some("Input")),
            other => panic!("unexpected token {other}"),
        }
        assert!(renamed.rename_sheet("Data", "X").is_none());
    }
}
