//! In-memory workbook for unit tests

use std::collections::BTreeMap;

use xlcalc_core::{CellAddress, CellRange, CellValue, NameScope, NameTable, SharedString, TableDef};

use crate::parser::{parse, ParseContext};
use crate::resolver::{
    CellContent, CellSource, ExternalBook, ExternalLink, NameDef, WorkbookMetadata,
};
use crate::token::{Formula, NameId};
use crate::value::FormulaValue;

#[derive(Default)]
pub struct TestBook {
    sheets: Vec<String>,
    names: NameTable<Formula>,
    tables: Vec<TableDef>,
    links: Vec<(String, Option<TestBook>)>,
    cells: BTreeMap<(usize, u32, u16), CellContent>,
}

impl TestBook {
    pub fn new(sheets: &[&str]) -> Self {
        Self {
            sheets: sheets.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Define a name; the body may refer to the name itself
    pub fn define_name(&mut self, name: &str, scope: NameScope, body: &str) -> NameId {
        self.names.define(name, scope, Formula::default()).unwrap();
        let sheet = match scope {
            NameScope::Sheet(s) => s,
            NameScope::Workbook => 0,
        };
        let formula = parse(body, &ParseContext::new(self, sheet)).unwrap();
        self.names.define(name, scope, formula).unwrap()
    }

    pub fn add_table(&mut self, table: TableDef) {
        self.tables.push(table);
    }

    /// Register an external link without live values; returns its index
    pub fn add_link(&mut self, key: &str) -> usize {
        self.links.push((key.to_string(), None));
        self.links.len()
    }

    pub fn add_linked_book(&mut self, key: &str, book: TestBook) -> usize {
        self.links.push((key.to_string(), Some(book)));
        self.links.len()
    }

    pub fn set(&mut self, sheet: usize, address: &str, value: impl Into<CellValue>) {
        let addr = CellAddress::parse(address).unwrap();
        let content = CellContent::from(&value.into());
        self.cells.insert((sheet, addr.row, addr.col), content);
    }

    /// Store formula text the engine has not seen yet
    pub fn set_formula(&mut self, sheet: usize, address: &str, text: &str) {
        let addr = CellAddress::parse(address).unwrap();
        self.cells.insert(
            (sheet, addr.row, addr.col),
            CellContent::Formula {
                text: SharedString::from(text),
                cached: None,
            },
        );
    }

    pub fn clear(&mut self, sheet: usize, address: &str) {
        let addr = CellAddress::parse(address).unwrap();
        self.cells.remove(&(sheet, addr.row, addr.col));
    }
}

impl CellSource for TestBook {
    fn cell(&self, sheet: usize, row: u32, col: u16) -> CellContent {
        self.cells
            .get(&(sheet, row, col))
            .cloned()
            .unwrap_or(CellContent::Blank)
    }

    fn used_range(&self, sheet: usize) -> Option<CellRange> {
        let mut cells = self
            .cells
            .keys()
            .filter(|(s, _, _)| *s == sheet)
            .map(|&(_, r, c)| (r, c));
        let (r0, c0) = cells.next()?;
        let (mut top, mut left, mut bottom, mut right) = (r0, c0, r0, c0);
        for (r, c) in cells {
            top = top.min(r);
            bottom = bottom.max(r);
            left = left.min(c);
            right = right.max(c);
        }
        Some(CellRange::from_indices(top, left, bottom, right))
    }
}

impl WorkbookMetadata for TestBook {
    fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    fn sheet_name(&self, index: usize) -> Option<&str> {
        self.sheets.get(index).map(String::as_str)
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
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn external_link(&self, index: usize) -> Option<ExternalLink<'_>> {
        let (key, book) = self.links.get(index.checked_sub(1)?)?;
        Some(ExternalLink {
            key,
            book: book.as_ref().map(|b| b as &dyn ExternalBook),
        })
    }

    fn external_link_count(&self) -> usize {
        self.links.len()
    }
}

impl ExternalBook for TestBook {
    fn cell_value(&self, sheet: &str, row: u32, col: u16) -> Option<FormulaValue> {
        let sheet = self.sheet_index(sheet)?;
        Some(self.cell(sheet, row, col).to_value())
    }

    fn name_value(&self, sheet: Option<&str>, name: &str) -> Option<FormulaValue> {
        let scoped = sheet
            .and_then(|s| self.sheet_index(s))
            .and_then(|s| self.names.lookup_exact(name, NameScope::Sheet(s)));
        let id = scoped.or_else(|| self.names.lookup_exact(name, NameScope::Workbook))?;
        // constant bodies only
        match self.names.get(id)?.value.tokens() {
            [crate::token::Token::Number(n)] => Some(FormulaValue::Number(*n)),
            [crate::token::Token::Text(s)] => Some(FormulaValue::String(s.to_string())),
            [crate::token::Token::Bool(b)] => Some(FormulaValue::Boolean(*b)),
            _ => None,
        }
    }
}
