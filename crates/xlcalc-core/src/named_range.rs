//! Defined-name scoping and storage
//!
//! Names are case-insensitive. A sheet-scoped name shadows a workbook-scoped
//! name of the same spelling when looked up from that sheet.

use std::collections::HashMap;

use crate::cell::CellAddress;
use crate::error::{Error, Result};

/// Scope of a defined name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NameScope {
    /// Available throughout the workbook (global)
    Workbook,
    /// Scoped to a specific sheet (local)
    Sheet(usize),
}

/// Check that `name` is usable as a defined name
///
/// A name starts with a letter, `_` or `\`, continues with letters, digits,
/// `_`, `.`, `\` or `?`, and must not read as a cell reference or boolean.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = || Error::InvalidName(name.to_string());

    let mut chars = name.chars();
    let first = chars.next().ok_or_else(invalid)?;
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return Err(invalid());
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '\\' | '?')) {
        return Err(invalid());
    }
    if name.len() > 255
        || CellAddress::parse(name).is_ok()
        || name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
        || is_r1c1_like(name)
    {
        return Err(invalid());
    }
    Ok(())
}

fn is_r1c1_like(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    matches!(upper.as_str(), "R" | "C")
}

/// A table of scoped entries (defined names, in practice)
///
/// Entries get a stable index on insertion; redefining an existing name in the
/// same scope keeps its index so parsed formulas stay valid.
#[derive(Debug, Clone)]
pub struct NameTable<T> {
    entries: Vec<NameEntry<T>>,
    index: HashMap<(String, NameScope), usize>,
}

/// A stored name with its scope
#[derive(Debug, Clone)]
pub struct NameEntry<T> {
    pub name: String,
    pub scope: NameScope,
    pub value: T,
}

impl<T> Default for NameTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> NameTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, scope: NameScope) -> (String, NameScope) {
        (name.to_lowercase(), scope)
    }

    /// Define or replace a name, returning its index
    pub fn define(&mut self, name: &str, scope: NameScope, value: T) -> Result<usize> {
        validate_name(name)?;
        let key = Self::key(name, scope);
        if let Some(&idx) = self.index.get(&key) {
            let entry = &mut self.entries[idx];
            entry.name = name.to_string();
            entry.value = value;
            return Ok(idx);
        }
        let idx = self.entries.len();
        self.entries.push(NameEntry {
            name: name.to_string(),
            scope,
            value,
        });
        self.index.insert(key, idx);
        Ok(idx)
    }

    /// Find a name as seen from `sheet`: its own scope first, then the workbook
    pub fn lookup(&self, name: &str, sheet: usize) -> Option<usize> {
        self.lookup_exact(name, NameScope::Sheet(sheet))
            .or_else(|| self.lookup_exact(name, NameScope::Workbook))
    }

    pub fn lookup_exact(&self, name: &str, scope: NameScope) -> Option<usize> {
        self.index.get(&Self::key(name, scope)).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&NameEntry<T>> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut NameEntry<T>> {
        self.entries.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NameEntry<T>)> {
        self.entries.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NameEntry<T>> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
