//! Dependency tracking for formula calculation

use std::collections::{HashMap, HashSet};
use std::fmt;

use xlcalc_core::{CellAddress, CellRange};

/// Unique key for a cell (sheet index + address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    /// Create from sheet index and cell address
    pub fn from_address(sheet: usize, addr: &CellAddress) -> Self {
        Self::new(sheet, addr.row, addr.col)
    }

    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.address())
    }
}

/// A rectangle on one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetArea {
    pub sheet: usize,
    pub range: CellRange,
}

impl SheetArea {
    pub fn contains(&self, cell: CellKey) -> bool {
        self.sheet == cell.sheet && self.range.contains(cell.row, cell.col)
    }
}

/// Everything one formula read during its last evaluation
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Precedents {
    pub cells: HashSet<CellKey>,
    /// Multi-cell areas, kept whole so that whole-column reads stay cheap
    pub areas: Vec<SheetArea>,
}

impl Precedents {
    pub fn add_cell(&mut self, cell: CellKey) {
        self.cells.insert(cell);
    }

    pub fn add_area(&mut self, sheet: usize, range: CellRange) {
        if range.is_single_cell() {
            self.add_cell(CellKey::new(sheet, range.start.row, range.start.col));
        } else {
            let area = SheetArea { sheet, range };
            if !self.areas.contains(&area) {
                self.areas.push(area);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.areas.is_empty()
    }

    pub fn reads(&self, cell: CellKey) -> bool {
        self.cells.contains(&cell) || self.areas.iter().any(|a| a.contains(cell))
    }
}

/// Dependency graph for formula cells
///
/// Edges come from what each formula actually read the last time it was
/// evaluated, so a formula that has never been evaluated has no precedents.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Cell → formulas that read it directly
    dependents: HashMap<CellKey, HashSet<CellKey>>,
    /// Formula → what it read
    precedents: HashMap<CellKey, Precedents>,
    /// Formulas with at least one area precedent
    area_readers: HashSet<CellKey>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the recorded precedents of `formula`
    pub fn set_precedents(&mut self, formula: CellKey, precedents: Precedents) {
        self.clear_dependencies(formula);
        for &cell in &precedents.cells {
            self.dependents.entry(cell).or_default().insert(formula);
        }
        if !precedents.areas.is_empty() {
            self.area_readers.insert(formula);
        }
        if !precedents.is_empty() {
            self.precedents.insert(formula, precedents);
        }
    }

    /// Forget what `formula` read
    pub fn clear_dependencies(&mut self, formula: CellKey) {
        if let Some(old) = self.precedents.remove(&formula) {
            for cell in old.cells {
                if let Some(deps) = self.dependents.get_mut(&cell) {
                    deps.remove(&formula);
                    if deps.is_empty() {
                        self.dependents.remove(&cell);
                    }
                }
            }
        }
        self.area_readers.remove(&formula);
    }

    /// Formulas that read `cell`, directly or through an area
    pub fn dependents_of(&self, cell: CellKey) -> Vec<CellKey> {
        let mut out: Vec<CellKey> = self
            .dependents
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
            .collect();
        for reader in &self.area_readers {
            let reads = self
                .precedents
                .get(reader)
                .is_some_and(|p| p.areas.iter().any(|a| a.contains(cell)));
            if reads && !out.contains(reader) {
                out.push(*reader);
            }
        }
        out
    }

    /// Formulas that read any cell of `range` on `sheet`
    pub fn dependents_of_range(&self, sheet: usize, range: &CellRange) -> Vec<CellKey> {
        let mut out = HashSet::new();
        for (formula, precedents) in &self.precedents {
            let reads_cell = precedents
                .cells
                .iter()
                .any(|c| c.sheet == sheet && range.contains(c.row, c.col));
            let reads_area = precedents
                .areas
                .iter()
                .any(|a| a.sheet == sheet && a.range.overlaps(range));
            if reads_cell || reads_area {
                out.insert(*formula);
            }
        }
        let mut out: Vec<_> = out.into_iter().collect();
        out.sort();
        out
    }

    pub fn precedents_of(&self, formula: CellKey) -> Option<&Precedents> {
        self.precedents.get(&formula)
    }

    /// All cells that transitively depend on `cell`, excluding `cell` itself
    pub fn transitive_dependents(&self, cell: CellKey) -> Vec<CellKey> {
        let mut seen = HashSet::new();
        let mut stack = vec![cell];
        let mut out = Vec::new();
        while let Some(current) = stack.pop() {
            for dependent in self.dependents_of(current) {
                if dependent != cell && seen.insert(dependent) {
                    out.push(dependent);
                    stack.push(dependent);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.precedents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
        self.area_readers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precedents(cells: &[CellKey]) -> Precedents {
        let mut p = Precedents::default();
        for &c in cells {
            p.add_cell(c);
        }
        p
    }

    #[test]
    fn test_set_precedents() {
        let mut graph = DependencyGraph::new();

        let a1 = CellKey::new(0, 0, 0);
        let b1 = CellKey::new(0, 0, 1);

        graph.set_precedents(b1, precedents(&[a1]));

        assert_eq!(graph.dependents_of(a1), vec![b1]);
        assert!(graph.precedents_of(b1).unwrap().reads(a1));

        // re-recording replaces the old edges
        graph.set_precedents(b1, Precedents::default());
        assert!(graph.dependents_of(a1).is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_area_dependents() {
        let mut graph = DependencyGraph::new();
        let c1 = CellKey::new(0, 0, 2);
        let mut p = Precedents::default();
        p.add_area(0, CellRange::from_indices(0, 0, xlcalc_core::MAX_ROWS - 1, 0));
        graph.set_precedents(c1, p);

        assert_eq!(graph.dependents_of(CellKey::new(0, 5000, 0)), vec![c1]);
        assert!(graph.dependents_of(CellKey::new(1, 5000, 0)).is_empty());
        assert!(graph.dependents_of(CellKey::new(0, 0, 1)).is_empty());
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DependencyGraph::new();

        let a1 = CellKey::new(0, 0, 0);
        let b1 = CellKey::new(0, 0, 1);
        let c1 = CellKey::new(0, 0, 2);

        // A1 -> B1 -> C1 -> A1 (circular)
        graph.set_precedents(b1, precedents(&[a1]));
        graph.set_precedents(c1, precedents(&[b1]));
        graph.set_precedents(a1, precedents(&[c1]));

        let mut deps = graph.transitive_dependents(a1);
        deps.sort();
        assert_eq!(deps, vec![b1, c1]);
    }

    #[test]
    fn test_display() {
        assert_eq!(CellKey::new(2, 4, 1).to_string(), "2!B5");
    }
}
