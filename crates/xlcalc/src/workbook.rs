//! In-memory workbook wired to the calculation engine
//!
//! The workbook owns sheet values, defined names, tables and external links,
//! and keeps a [`CalcEngine`] in step with every edit: entering a value
//! invalidates the formulas reading it, structural edits are reported to the
//! engine before the stored values move.

use tracing::debug;
use xlcalc_core::{
    check_row_shift, validate_name, validate_sheet_name, CellAddress, CellError, CellRange,
    CellValue, NameScope, NameTable, TableDef, Worksheet, MAX_ROWS,
};
use xlcalc_formula::{
    parse, render, ArrayId, CalcEngine, CellContent, CellSource, EditedSheet, ExternalBook,
    ExternalLink, Formula, FormulaValue, GroupId, NameDef, NameId, ParseContext, ParseError,
    RenderContext, RowEdit, Token, WorkbookMetadata,
};

use crate::error::{Error, Result};

/// A workbook containing worksheets and the engine that calculates them
#[derive(Debug)]
pub struct Workbook {
    pub(crate) data: BookData,
    pub(crate) engine: CalcEngine,
}

/// Everything the engine reads from the workbook
///
/// Kept apart from the engine so that both can be borrowed at once.
#[derive(Debug, Default)]
pub(crate) struct BookData {
    pub(crate) sheets: Vec<Worksheet>,
    names: NameTable<Formula>,
    tables: Vec<TableDef>,
    links: Vec<Link>,
}

#[derive(Debug)]
struct Link {
    key: String,
    book: Option<Box<Workbook>>,
}

impl Workbook {
    /// Create a workbook with a single sheet named `Sheet1`
    pub fn new() -> Self {
        let mut book = Self::empty();
        book.data.sheets.push(Worksheet::new("Sheet1"));
        book
    }

    /// Create a workbook without sheets
    pub fn empty() -> Self {
        Self::with_engine(CalcEngine::new())
    }

    /// Create a workbook without sheets around a configured engine
    pub fn with_engine(engine: CalcEngine) -> Self {
        Self {
            data: BookData::default(),
            engine,
        }
    }

    pub fn engine(&self) -> &CalcEngine {
        &self.engine
    }

    /// Engine access for registering functions or changing options
    pub fn engine_mut(&mut self) -> &mut CalcEngine {
        &mut self.engine
    }

    // === Sheets ===

    /// Append a sheet, returning its index
    pub fn add_sheet<S: Into<String>>(&mut self, name: S) -> Result<usize> {
        let name = name.into();
        validate_sheet_name(&name)?;
        if self.data.sheet_index(&name).is_some() {
            return Err(xlcalc_core::Error::InvalidSheetName(format!("{} already exists", name)).into());
        }
        self.data.sheets.push(Worksheet::new(name));
        Ok(self.data.sheets.len() - 1)
    }

    pub fn sheet_count(&self) -> usize {
        self.data.sheets.len()
    }

    /// Stored values of a sheet
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.data.sheets.get(index)
    }

    /// Case-insensitive sheet lookup
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.data.sheet_index(name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.data.sheets.iter().map(Worksheet::name).collect()
    }

    /// Rename a sheet and rewrite the formulas that name it
    pub fn rename_sheet<S: Into<String>>(&mut self, index: usize, name: S) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.data.sheet_index(&name) {
            if existing != index {
                return Err(
                    xlcalc_core::Error::InvalidSheetName(format!("{} already exists", name)).into(),
                );
            }
        }
        let sheet = self
            .data
            .sheets
            .get_mut(index)
            .ok_or(Error::SheetIndex(index))?;
        let old = sheet.name().to_string();
        sheet.set_name(name.as_str())?;
        self.engine.notify_sheet_renamed(&old, &name);
        Ok(())
    }

    fn check_sheet(&self, index: usize) -> Result<()> {
        if index < self.data.sheets.len() {
            Ok(())
        } else {
            Err(Error::SheetIndex(index))
        }
    }

    // === Cell values ===

    /// Store a plain value, replacing any formula in the cell
    pub fn set_value<V: Into<CellValue>>(&mut self, sheet: usize, address: &str, value: V) -> Result<()> {
        self.check_sheet(sheet)?;
        let addr = CellAddress::parse(address)?;
        self.engine.clear_formula(sheet, addr.row, addr.col)?;
        self.data.sheets[sheet].set_value_at(addr.row, addr.col, value)?;
        self.engine
            .invalidate(Some(&self.data), sheet, addr.row, addr.col);
        Ok(())
    }

    /// Empty a cell, formula included
    pub fn clear_cell(&mut self, sheet: usize, address: &str) -> Result<()> {
        self.set_value(sheet, address, CellValue::Empty)
    }

    /// Last stored value of a cell
    ///
    /// For formula cells this is the value written by the last
    /// [`calculate`](crate::WorkbookCalculationExt::calculate).
    pub fn stored_value(&self, sheet: usize, address: &str) -> Result<&CellValue> {
        let ws = self.data.sheets.get(sheet).ok_or(Error::SheetIndex(sheet))?;
        Ok(ws.value(address)?)
    }

    /// Current value of a cell, evaluating stale formulas on the way
    pub fn evaluate_cell(&mut self, sheet: usize, address: &str) -> Result<FormulaValue> {
        self.check_sheet(sheet)?;
        let addr = CellAddress::parse(address)?;
        Ok(self
            .engine
            .evaluate_cell(&self.data, sheet, addr.row, addr.col)?)
    }

    /// Evaluate formula text that lives in no cell
    ///
    /// Implicit intersection is taken from `A1` of `sheet`.
    pub fn evaluate(&mut self, sheet: usize, text: &str) -> Result<FormulaValue> {
        self.check_sheet(sheet)?;
        let formula = self.parse_formula(sheet, text)?;
        Ok(self.engine.evaluate(&self.data, &formula, sheet, 0, 0)?)
    }

    // === Formulas ===

    /// Parse `text` as the formula of one cell
    pub fn set_formula(&mut self, sheet: usize, address: &str, text: &str) -> Result<()> {
        self.check_sheet(sheet)?;
        let addr = CellAddress::parse(address)?;
        let formula = parse(text, &ParseContext::at(&self.data, sheet, addr.row, addr.col))?;
        self.engine.set_formula(sheet, addr.row, addr.col, formula)?;
        self.data.sheets[sheet].clear_at(addr.row, addr.col);
        Ok(())
    }

    /// Enter one formula over `range`; each cell evaluates it moved by its
    /// offset from the top-left cell
    pub fn set_shared_formula(&mut self, sheet: usize, range: &str, text: &str) -> Result<GroupId> {
        self.check_sheet(sheet)?;
        let range = CellRange::parse(range)?;
        let anchor = range.start;
        let formula = parse(text, &ParseContext::at(&self.data, sheet, anchor.row, anchor.col))?;
        let id = self.engine.set_shared_formula(sheet, range, formula)?;
        self.data.sheets[sheet].clear_range(&range);
        Ok(id)
    }

    /// Enter an array formula whose result spills over `range`
    pub fn set_array_formula(&mut self, sheet: usize, range: &str, text: &str) -> Result<ArrayId> {
        self.check_sheet(sheet)?;
        let range = CellRange::parse(range)?;
        let anchor = range.start;
        let formula = parse(text, &ParseContext::at(&self.data, sheet, anchor.row, anchor.col))?;
        let id = self.engine.set_array_formula(sheet, range, formula)?;
        self.data.sheets[sheet].clear_range(&range);
        Ok(id)
    }

    /// Parse formula text against this workbook's sheets, names and tables
    pub fn parse_formula(&self, sheet: usize, text: &str) -> Result<Formula> {
        self.check_sheet(sheet)?;
        Ok(parse(text, &ParseContext::new(&self.data, sheet))?)
    }

    /// Formula text for tokens living on `sheet`, without the leading `=`
    pub fn render_formula(&self, sheet: usize, formula: &Formula) -> String {
        render(formula, &RenderContext::new(&self.data, sheet))
    }

    /// Formula text of a cell with its leading `=`
    pub fn formula(&self, sheet: usize, address: &str) -> Result<Option<String>> {
        self.check_sheet(sheet)?;
        let addr = CellAddress::parse(address)?;
        Ok(self
            .engine
            .formula_at(sheet, addr.row, addr.col)
            .map(|f| format!("={}", self.render_formula(sheet, &f))))
    }

    // === Names, tables and links ===

    /// Define or replace a name
    ///
    /// The body may refer to the name itself. Formulas already referring to
    /// the name see the new body.
    pub fn define_name(&mut self, name: &str, scope: NameScope, text: &str) -> Result<NameId> {
        validate_name(name)?;
        let sheet = match scope {
            NameScope::Sheet(s) => {
                self.check_sheet(s)?;
                s
            }
            NameScope::Workbook => 0,
        };
        let body = match parse(text, &ParseContext::new(&self.data, sheet)) {
            Ok(body) => body,
            Err(ParseError::UnknownName { name: unknown, .. })
                if unknown.eq_ignore_ascii_case(name) =>
            {
                // a body naming itself; it stays #NAME? if the second parse fails too
                let placeholder = Formula::new(vec![Token::Error(CellError::Name)]);
                self.data.names.define(name, scope, placeholder)?;
                parse(text, &ParseContext::new(&self.data, sheet))?
            }
            Err(e) => return Err(e.into()),
        };
        let id = self.data.names.define(name, scope, body)?;
        self.engine.invalidate_all();
        debug!(name, id, "name defined");
        Ok(id)
    }

    /// Register a table so that structured references can resolve to it
    pub fn add_table(&mut self, table: TableDef) -> Result<()> {
        self.check_sheet(table.sheet)?;
        if self.data.table(&table.name).is_some() {
            return Err(Error::DuplicateTable(table.name));
        }
        self.data.tables.push(table);
        Ok(())
    }

    /// Add an external link, with the linked workbook when it is loaded
    ///
    /// Returns the 1-based link index used by `[n]Sheet!A1` references.
    pub fn link_external<S: Into<String>>(&mut self, key: S, book: Option<Workbook>) -> usize {
        self.data.links.push(Link {
            key: key.into(),
            book: book.map(Box::new),
        });
        self.data.links.len()
    }

    /// Edit a linked workbook; this workbook's formulas recalculate afterwards
    pub fn with_linked_book<R>(&mut self, index: usize, edit: impl FnOnce(&mut Workbook) -> R) -> Option<R> {
        let link = self.data.links.get_mut(index.checked_sub(1)?)?;
        let out = edit(link.book.as_mut()?);
        self.engine.invalidate_all();
        Some(out)
    }

    // === Structural edits ===

    /// Move rows `first..=last` (0-based) of a sheet by `delta`
    ///
    /// A block move, not an insertion: values and formulas at the
    /// destination are overwritten, formulas in the block keep pointing at
    /// the same relative cells and formulas outside it are left alone.
    /// Tables inside the block move with it; a block cutting through a table
    /// is rejected.
    pub fn shift_rows(&mut self, sheet: usize, first: u32, last: u32, delta: i64) -> Result<()> {
        self.check_sheet(sheet)?;
        check_row_shift(first, last, delta)?;
        let inside = |row: u32| (first..=last).contains(&row);
        if let Some(table) = self.data.tables.iter().find(|t| {
            t.sheet == sheet
                && t.range.start.row <= last
                && t.range.end.row >= first
                && !(inside(t.range.start.row) && inside(t.range.end.row))
        }) {
            return Err(Error::SplitsTable(table.name.clone()));
        }
        self.engine.notify_rows_shifted(sheet, first, last, delta)?;
        self.data.sheets[sheet].shift_rows(first, last, delta)?;
        for table in self
            .data
            .tables
            .iter_mut()
            .filter(|t| t.sheet == sheet && inside(t.range.start.row))
        {
            table.range.start.row = (table.range.start.row as i64 + delta) as u32;
            table.range.end.row = (table.range.end.row as i64 + delta) as u32;
        }
        Ok(())
    }

    /// Insert `count` empty rows before row `at` (0-based)
    ///
    /// Cells at or below `at` move down. Every formula, defined name and
    /// table keeps naming the same cells: references below the insertion
    /// move, areas spanning it grow. Fails without changing anything when
    /// populated rows would be pushed off the sheet.
    pub fn insert_rows(&mut self, sheet: usize, at: u32, count: u32) -> Result<()> {
        self.check_sheet(sheet)?;
        if at >= MAX_ROWS {
            return Err(xlcalc_core::Error::RowOutOfBounds(at as u64, MAX_ROWS - 1).into());
        }
        if count == 0 {
            return Ok(());
        }
        let value_rows = self.data.sheets[sheet].used_range().map(|r| r.end.row);
        let table_rows = self
            .data
            .tables
            .iter()
            .filter(|t| t.sheet == sheet)
            .map(|t| t.range.end.row)
            .max();
        if let Some(last) = value_rows.max(table_rows).filter(|last| *last >= at) {
            check_row_shift(at, last, count as i64)?;
        }
        self.edit_rows(sheet, RowEdit::Insert { at, count })
    }

    /// Delete `count` rows starting at row `at` (0-based), moving the rows
    /// below up
    ///
    /// References into the deleted rows become `#REF!`; areas overlapping
    /// them shrink. Formulas in the deleted rows are removed.
    pub fn delete_rows(&mut self, sheet: usize, at: u32, count: u32) -> Result<()> {
        self.check_sheet(sheet)?;
        let below = at as u64 + count as u64;
        if below > MAX_ROWS as u64 {
            return Err(xlcalc_core::Error::RowOutOfBounds(below - 1, MAX_ROWS - 1).into());
        }
        if count == 0 {
            return Ok(());
        }
        self.edit_rows(sheet, RowEdit::Delete { at, count })
    }

    fn edit_rows(&mut self, sheet: usize, edit: RowEdit) -> Result<()> {
        let name = self.data.sheets[sheet].name().to_string();
        let edited = EditedSheet {
            index: sheet,
            name: &name,
        };
        self.engine.notify_rows_edited(edited, edit)?;
        match edit {
            RowEdit::Insert { at, count } => self.data.sheets[sheet].insert_rows(at, count)?,
            RowEdit::Delete { at, count } => self.data.sheets[sheet].delete_rows(at, count)?,
        }

        for entry in self.data.names.iter_mut() {
            let own_sheet = match entry.scope {
                NameScope::Sheet(s) => Some(s),
                NameScope::Workbook => None,
            };
            if let Some(adjusted) = entry.value.adjust_rows(own_sheet, edited, edit) {
                debug!(name = %entry.name, "name follows row edit");
                entry.value = adjusted;
            }
        }

        self.data.tables.retain_mut(|table| {
            if table.sheet != sheet {
                return true;
            }
            let (top, bottom) = (table.range.start.row, table.range.end.row);
            if let RowEdit::Delete { .. } = edit {
                table.has_headers &= edit.map_row(top).is_some();
                table.has_totals &= edit.map_row(bottom).is_some();
            }
            match edit.map_span(top, bottom) {
                Some((first, last)) => {
                    table.range.start.row = first;
                    table.range.end.row = last;
                    true
                }
                None => {
                    debug!(table = %table.name, "table deleted with its rows");
                    false
                }
            }
        });
        debug!(sheet, ?edit, "rows edited");
        Ok(())
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl CellSource for BookData {
    fn cell(&self, sheet: usize, row: u32, col: u16) -> CellContent {
        self.sheets
            .get(sheet)
            .map(|ws| CellContent::from(ws.value_at(row, col)))
            .unwrap_or(CellContent::Blank)
    }

    fn used_range(&self, sheet: usize) -> Option<CellRange> {
        self.sheets.get(sheet)?.used_range()
    }
}

impl WorkbookMetadata for BookData {
    fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    fn sheet_name(&self, index: usize) -> Option<&str> {
        self.sheets.get(index).map(Worksheet::name)
    }

    fn defined_name(&self, name: &str, scope: NameScope) -> Option<NameId> {
        self.names.lookup_exact(name, scope)
    }

    fn name_def(&self, id: NameId) -> Option<NameDef<'_>> {
        self.names.get(id).map(|entry| NameDef {
            name: &entry.name,
            scope: entry.scope,
            body: &entry.value,
        })
    }

    fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn external_link(&self, index: usize) -> Option<ExternalLink<'_>> {
        let link = self.links.get(index.checked_sub(1)?)?;
        Some(ExternalLink {
            key: &link.key,
            book: link.book.as_deref().map(|b| b as &dyn ExternalBook),
        })
    }

    fn external_link_count(&self) -> usize {
        self.links.len()
    }
}

/// A linked workbook answers with its stored values
impl ExternalBook for Workbook {
    fn cell_value(&self, sheet: &str, row: u32, col: u16) -> Option<FormulaValue> {
        let sheet = self.data.sheet_index(sheet)?;
        Some(self.data.cell(sheet, row, col).to_value())
    }

    fn name_value(&self, sheet: Option<&str>, name: &str) -> Option<FormulaValue> {
        let scoped = sheet
            .and_then(|s| self.data.sheet_index(s))
            .and_then(|s| self.data.names.lookup_exact(name, NameScope::Sheet(s)));
        let id = scoped.or_else(|| self.data.names.lookup_exact(name, NameScope::Workbook))?;
        match self.data.names.get(id)?.value.tokens() {
            [Token::Number(n)] => Some(FormulaValue::Number(*n)),
            [Token::Text(s)] => Some(FormulaValue::String(s.to_string())),
            [Token::Bool(b)] => Some(FormulaValue::Boolean(*b)),
            [Token::Error(e)] => Some(FormulaValue::Error(*e)),
            [Token::Ref3d { sheets, cell }] if sheets.is_single() => {
                Some(self.data.cell(*sheets.sheets().start(), cell.row, cell.col).to_value())
            }
            _ => None,
        }
    }
}
