//! Reference and name resolution
//!
//! The parser never looks at a workbook directly. Everything it needs to know
//! about sheets, defined names, tables and external links comes through
//! [`WorkbookMetadata`]; the evaluator reads cells through [`CellSource`].

use xlcalc_core::{
    CellAddress, CellError, CellRange, CellValue, NameScope, SharedString, TableDef, MAX_ROWS,
};

use crate::error::{ParseError, ParseResult};
use crate::token::{Area, Formula, NameId, SheetSpan, ThisRow, Token};
use crate::value::FormulaValue;

/// A defined name as seen by the parser and evaluator
#[derive(Debug, Clone, Copy)]
pub struct NameDef<'a> {
    pub name: &'a str,
    pub scope: NameScope,
    pub body: &'a Formula,
}

/// An entry of the external-link table
#[derive(Clone, Copy)]
pub struct ExternalLink<'a> {
    /// File name or key the link was created under (`Book2.xlsx`)
    pub key: &'a str,
    /// Live access to the other workbook, if it is loaded
    pub book: Option<&'a dyn ExternalBook>,
}

/// Values of another workbook
pub trait ExternalBook {
    /// Value of a cell on the named sheet; `None` when the sheet is unknown
    fn cell_value(&self, sheet: &str, row: u32, col: u16) -> Option<FormulaValue>;

    /// Value of a defined name, looked up in `sheet`'s scope first when given
    fn name_value(&self, sheet: Option<&str>, name: &str) -> Option<FormulaValue>;
}

/// Workbook structure consulted while parsing, rendering and evaluating
pub trait WorkbookMetadata {
    fn sheet_count(&self) -> usize;

    fn sheet_name(&self, index: usize) -> Option<&str>;

    /// Case-insensitive sheet lookup
    fn sheet_index(&self, name: &str) -> Option<usize> {
        (0..self.sheet_count()).find(|&i| {
            self.sheet_name(i)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    /// Name defined exactly in `scope` (no fallback)
    fn defined_name(&self, name: &str, scope: NameScope) -> Option<NameId>;

    fn name_def(&self, id: NameId) -> Option<NameDef<'_>>;

    /// Table by name (case-insensitive)
    fn table(&self, name: &str) -> Option<&TableDef>;

    /// External link by 1-based index
    fn external_link(&self, index: usize) -> Option<ExternalLink<'_>>;

    fn external_link_count(&self) -> usize;
}

/// Raw cell content handed to the evaluator
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Blank,
    Number(f64),
    Text(SharedString),
    Boolean(bool),
    Error(CellError),
    /// Formula text not yet known to the engine, with its last stored value
    Formula {
        text: SharedString,
        cached: Option<CellValue>,
    },
}

impl CellContent {
    pub fn to_value(&self) -> FormulaValue {
        match self {
            CellContent::Blank => FormulaValue::Empty,
            CellContent::Number(n) => FormulaValue::Number(*n),
            CellContent::Text(s) => FormulaValue::String(s.as_str().to_string()),
            CellContent::Boolean(b) => FormulaValue::Boolean(*b),
            CellContent::Error(e) => FormulaValue::Error(*e),
            CellContent::Formula { cached, .. } => cached
                .as_ref()
                .map(FormulaValue::from)
                .unwrap_or(FormulaValue::Empty),
        }
    }
}

impl From<&CellValue> for CellContent {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => CellContent::Blank,
            CellValue::Number(n) => CellContent::Number(*n),
            CellValue::String(s) => CellContent::Text(s.clone()),
            CellValue::Boolean(b) => CellContent::Boolean(*b),
            CellValue::Error(e) => CellContent::Error(*e),
        }
    }
}

/// Cell contents of the current workbook
pub trait CellSource {
    fn cell(&self, sheet: usize, row: u32, col: u16) -> CellContent;

    /// Bounding range of non-blank cells, used to clip whole-column areas
    fn used_range(&self, sheet: usize) -> Option<CellRange>;
}

/// Everything the engine needs from its host
pub trait SheetModel: CellSource + WorkbookMetadata {
    fn metadata(&self) -> &dyn WorkbookMetadata;
}

impl<T: CellSource + WorkbookMetadata> SheetModel for T {
    fn metadata(&self) -> &dyn WorkbookMetadata {
        self
    }
}

/// Find a defined name from `sheet`: sheet scope first, then workbook scope
pub fn resolve_name(meta: &dyn WorkbookMetadata, name: &str, sheet: usize) -> Option<NameId> {
    meta.defined_name(name, NameScope::Sheet(sheet))
        .or_else(|| meta.defined_name(name, NameScope::Workbook))
}

pub fn resolve_sheet(meta: &dyn WorkbookMetadata, name: &str, pos: usize) -> ParseResult<usize> {
    meta.sheet_index(name).ok_or_else(|| ParseError::UnknownSheet {
        name: name.to_string(),
        pos,
    })
}

/// Resolve the `k` of `[k]` to an external-link index (0 = this workbook)
///
/// `k` is either the numeric index or the key the link was registered under.
pub fn resolve_external_book(
    meta: &dyn WorkbookMetadata,
    book: &str,
    pos: usize,
) -> ParseResult<usize> {
    let unknown = || ParseError::UnknownExternalBook {
        book: book.to_string(),
        pos,
    };
    let trimmed = book.trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        return if index == 0 || index <= meta.external_link_count() {
            Ok(index)
        } else {
            Err(unknown())
        };
    }
    (1..=meta.external_link_count())
        .find(|&i| {
            meta.external_link(i)
                .is_some_and(|link| link.key.eq_ignore_ascii_case(trimmed))
        })
        .ok_or_else(unknown)
}

/// `A1`, `$A$1`
pub fn cell_ref(text: &str) -> Option<CellAddress> {
    CellAddress::parse(text).ok()
}

/// Column part of a whole-column reference (`A`, `$XFD`)
pub fn column_ref(text: &str) -> Option<(u16, bool)> {
    let (abs, letters) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    CellAddress::letters_to_column(letters)
        .ok()
        .map(|col| (col, abs))
}

/// Row part of a whole-row reference (`3`, `$3`), 0-based
pub fn row_ref(text: &str) -> Option<(u32, bool)> {
    let (abs, digits) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row: u64 = digits.parse().ok()?;
    (1..=MAX_ROWS as u64)
        .contains(&row)
        .then(|| ((row - 1) as u32, abs))
}

/// Row selectors of a structured reference
#[derive(Debug, Default, Clone, Copy)]
struct Specials {
    all: bool,
    data: bool,
    headers: bool,
    totals: bool,
    this_row: bool,
}

impl Specials {
    fn any(&self) -> bool {
        self.all || self.data || self.headers || self.totals || self.this_row
    }
}

/// Resolve `Table[spec]` to a reference token
///
/// `spec` is the bracket body without the outer brackets. References to
/// table parts that do not exist (a totals row on a table without one, a
/// table without columns) become the `#REF!` literal. Current-row
/// references become [`Token::ThisRow`] and are bound to a row only when
/// evaluated; they still need a cell to parse in.
pub fn resolve_structured(
    meta: &dyn WorkbookMetadata,
    table_name: &str,
    spec: &str,
    row_context: Option<u32>,
    pos: usize,
) -> ParseResult<Token> {
    let table = meta.table(table_name).ok_or_else(|| ParseError::UnknownTable {
        name: table_name.to_string(),
        pos,
    })?;
    let invalid = || ParseError::InvalidStructuredReference {
        text: format!("{}[{}]", table_name, spec),
        pos,
    };

    let mut specials = Specials::default();
    let mut columns: Vec<String> = Vec::new();
    let mut column_span = false;

    let body = spec.trim();
    if body.starts_with('[') {
        column_span =
            parse_item_list(body, &mut specials, &mut columns).ok_or_else(invalid)?;
    } else if let Some(col) = body.strip_prefix('@') {
        specials.this_row = true;
        let col = col.trim();
        if col.starts_with('[') {
            column_span =
                parse_item_list(col, &mut specials, &mut columns).ok_or_else(invalid)?;
        } else if !col.is_empty() {
            columns.push(col.to_string());
        }
    } else if !body.is_empty() {
        if classify_item(body, &mut specials, &mut columns).is_none() {
            return Err(invalid());
        }
    }

    if columns.len() > 2 || (columns.len() == 2 && !column_span) {
        return Err(invalid());
    }

    let ref_error = Token::Error(CellError::Ref);

    // column bounds
    let (first_col, last_col) = match columns.as_slice() {
        [] => match table.columns.len().checked_sub(1) {
            Some(last) => (0, last),
            None => return Ok(ref_error),
        },
        [c] => {
            let idx = column_index(table, c, pos)?;
            (idx, idx)
        }
        [a, b] => {
            let a = column_index(table, a, pos)?;
            let b = column_index(table, b, pos)?;
            (a.min(b), a.max(b))
        }
        _ => return Err(invalid()),
    };

    if specials.this_row {
        if specials.all || specials.data || specials.headers || specials.totals {
            return Err(invalid());
        }
        if row_context.is_none() {
            return Err(ParseError::ThisRowWithoutContext {
                table: table.name.clone(),
                pos,
            });
        }
        let columns = (!columns.is_empty()).then(|| {
            (
                SharedString::from(table.columns[first_col].as_str()),
                SharedString::from(table.columns[last_col].as_str()),
            )
        });
        return Ok(Token::ThisRow(ThisRow {
            table: SharedString::from(table.name.as_str()),
            columns,
        }));
    }

    // row bounds
    let rows = if specials.all {
        (table.range.start.row, table.range.end.row)
    } else if !specials.any() || (specials.data && !specials.headers && !specials.totals) {
        match table.data_rows() {
            Some(rows) => rows,
            None => return Ok(ref_error),
        }
    } else if specials.headers && specials.totals && !specials.data {
        return Err(invalid());
    } else {
        let header = table.header_range().map(|r| r.start.row);
        let totals = table.totals_range().map(|r| r.start.row);
        let data = table.data_rows();
        let first = if specials.headers {
            match header {
                Some(r) => r,
                None => return Ok(ref_error),
            }
        } else if specials.data {
            match data {
                Some((first, _)) => first,
                None => match totals {
                    Some(r) => r,
                    None => return Ok(ref_error),
                },
            }
        } else {
            match totals {
                Some(r) => r,
                None => return Ok(ref_error),
            }
        };
        let last = if specials.totals {
            match totals {
                Some(r) => r,
                None => return Ok(ref_error),
            }
        } else if specials.data {
            match data {
                Some((_, last)) => last,
                None => first,
            }
        } else {
            first
        };
        (first, last)
    };

    let start = CellAddress::absolute(rows.0, table.sheet_column(first_col));
    let end = CellAddress::absolute(rows.1, table.sheet_column(last_col));
    let sheets = SheetSpan::single(table.sheet);
    Ok(if start == end {
        Token::Ref3d { sheets, cell: start }
    } else {
        Token::Area3d {
            sheets,
            area: Area::cells(start, end),
        }
    })
}

/// Rows of the evaluating cell's table row, `None` outside the data body
///
/// Returns the sheet and the range a [`ThisRow`] token names when evaluated
/// on `row`. An unknown table or column also gives `None`.
pub fn resolve_this_row(
    meta: &dyn WorkbookMetadata,
    this_row: &ThisRow,
    row: u32,
) -> Option<(usize, CellRange)> {
    let table = meta.table(this_row.table.as_str())?;
    let (first, last) = table.data_rows()?;
    if !(first..=last).contains(&row) {
        return None;
    }
    let (a, b) = match &this_row.columns {
        Some((a, b)) => {
            let a = table.column_index(a.as_str())?;
            let b = table.column_index(b.as_str())?;
            (a.min(b), a.max(b))
        }
        None => (0, table.columns.len().checked_sub(1)?),
    };
    Some((
        table.sheet,
        CellRange::from_indices(row, table.sheet_column(a), row, table.sheet_column(b)),
    ))
}

/// `[a],[b]:[c]...`; returns whether a `:` column span was seen
fn parse_item_list(
    body: &str,
    specials: &mut Specials,
    columns: &mut Vec<String>,
) -> Option<bool> {
    let mut rest = body;
    let mut expect_item = true;
    let mut column_span = false;
    while !rest.is_empty() {
        if expect_item {
            let (item, after) = split_bracket_item(rest)?;
            classify_item(item.trim(), specials, columns)?;
            rest = after.trim_start();
            expect_item = false;
        } else if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
            expect_item = true;
        } else if let Some(after) = rest.strip_prefix(':') {
            if columns.len() != 1 || column_span {
                return None;
            }
            column_span = true;
            rest = after.trim_start();
            expect_item = true;
        } else {
            return None;
        }
    }
    if expect_item || (column_span && columns.len() != 2) {
        return None;
    }
    Some(column_span)
}

fn column_index(table: &TableDef, name: &str, pos: usize) -> ParseResult<usize> {
    table
        .column_index(name)
        .ok_or_else(|| ParseError::UnknownTableColumn {
            table: table.name.clone(),
            column: name.to_string(),
            pos,
        })
}

/// Split `[item]rest`, honouring `'` escapes inside the item
fn split_bracket_item(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('[')?;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\'' => escaped = true,
            ']' => return Some((&body[..i], &body[i + 1..])),
            '[' => return None,
            _ => {}
        }
    }
    None
}

fn classify_item(item: &str, specials: &mut Specials, columns: &mut Vec<String>) -> Option<()> {
    if let Some(special) = item.strip_prefix('#') {
        let flag = match special.to_ascii_lowercase().as_str() {
            "all" => &mut specials.all,
            "data" => &mut specials.data,
            "headers" => &mut specials.headers,
            "totals" => &mut specials.totals,
            "this row" => &mut specials.this_row,
            _ => return None,
        };
        *flag = true;
    } else if item == "@" {
        specials.this_row = true;
    } else if item.is_empty() {
        return None;
    } else {
        columns.push(item.to_string());
    }
    Some(())
}

/// Clip an area to the populated part of a sheet
///
/// Whole-column and whole-row areas would otherwise expand to millions of
/// cells. Returns `None` when nothing of the area is populated.
pub fn clip_to_extent(range: &CellRange, extent: Option<&CellRange>) -> Option<CellRange> {
    if range.cell_count() <= 1 {
        return Some(*range);
    }
    let extent = extent?;
    let last_row = range.end.row.min(extent.end.row);
    let last_col = range.end.col.min(extent.end.col);
    if range.start.row > last_row || range.start.col > last_col {
        return None;
    }
    Some(CellRange::from_indices(
        range.start.row,
        range.start.col,
        last_row,
        last_col,
    ))
}
