//! Calculation engine
//!
//! [`CalcEngine`] owns everything the evaluator should not recompute: the
//! formula of each formula cell (standalone, shared-group member or array
//! member), the last outcome of each cell, what each formula read, and the
//! calculation chain. Cell contents stay with the host, passed in as a
//! [`SheetModel`] on every call.
//!
//! Evaluation pulls precedents recursively. The cells being evaluated form
//! an explicit stack keyed by physical position; reaching a cell already on
//! it is a circular reference reported for every cell on the cycle.

use std::ops::ControlFlow;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace, warn};
use xlcalc_core::{check_row_shift, CellRange};

use crate::cache::{EvalCache, Outcome};
use crate::chain::CalcChain;
use crate::dependency::{CellKey, DependencyGraph, Precedents};
use crate::error::{EditError, EvalError, FormulaResult};
use crate::evaluator::{CellReader, EvaluationContext, Machine};
use crate::functions::FunctionRegistry;
use crate::parser::{parse, ParseContext};
use crate::resolver::{CellContent, SheetModel};
use crate::token::{EditedSheet, Formula, RowEdit};
use crate::value::FormulaValue;

/// Identifies a shared-formula group
pub type GroupId = usize;

/// Identifies an array formula
pub type ArrayId = usize;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Deepest chain of nested cell evaluations before giving up
    pub max_depth: usize,
    /// Re-evaluate volatile formulas on every batch calculation
    pub recalc_volatile: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: 512,
            recalc_volatile: true,
        }
    }
}

/// Where a cell stands in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Not a formula cell the engine knows about
    NoFormula,
    /// Needs evaluation
    Stale,
    /// Cached outcome is current
    Fresh,
}

/// One entry reported by batch calculation
#[derive(Debug)]
pub struct ChainEntry<'a> {
    pub cell: CellKey,
    pub outcome: &'a Outcome,
    /// The cell was stale and got evaluated on this pass
    pub recalculated: bool,
    pub volatile: bool,
}

#[derive(Debug, Clone)]
enum FormulaCell {
    Single(Arc<Formula>),
    Shared(GroupId),
    Array(ArrayId),
}

#[derive(Debug, Clone)]
struct SharedGroup {
    anchor: CellKey,
    range: CellRange,
    formula: Arc<Formula>,
    members: usize,
}

#[derive(Debug, Clone)]
struct ArrayFormula {
    anchor: CellKey,
    range: CellRange,
    formula: Arc<Formula>,
}

impl ArrayFormula {
    fn cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        cells_of(self.anchor.sheet, self.range)
    }
}

fn cells_of(sheet: usize, range: CellRange) -> impl Iterator<Item = CellKey> {
    (range.start.row..=range.end.row).flat_map(move |row| {
        (range.start.col..=range.end.col).map(move |col| CellKey::new(sheet, row, col))
    })
}

fn rows_of(first: u32, last: u32) -> CellRange {
    CellRange::from_indices(first, 0, last, xlcalc_core::MAX_COLS - 1)
}

#[derive(Debug, Default)]
struct EngineState {
    formulas: AHashMap<CellKey, FormulaCell>,
    groups: AHashMap<GroupId, SharedGroup>,
    arrays: AHashMap<ArrayId, ArrayFormula>,
    next_id: usize,
    cache: EvalCache,
    chain: CalcChain,
    graph: DependencyGraph,
    volatile: AHashSet<CellKey>,
    /// Formulas parsed from host text rather than entered through the engine
    loaded: AHashSet<CellKey>,
    /// Bounds of formula cells per sheet, merged with the host's used range
    extents: AHashMap<usize, CellRange>,
}

impl EngineState {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn grow_extent(&mut self, sheet: usize, range: CellRange) {
        let grown = match self.extents.get(&sheet) {
            Some(extent) => extent.bounding(&range),
            None => range,
        };
        self.extents.insert(sheet, grown);
    }

    fn recompute_extent(&mut self, sheet: usize) {
        let mut extent: Option<CellRange> = None;
        for key in self.formulas.keys().filter(|k| k.sheet == sheet) {
            let cell = CellRange::from_indices(key.row, key.col, key.row, key.col);
            extent = Some(match extent {
                Some(e) => e.bounding(&cell),
                None => cell,
            });
        }
        match extent {
            Some(e) => self.extents.insert(sheet, e),
            None => self.extents.remove(&sheet),
        };
    }

    /// Effective formula of a cell and whether it evaluates in array mode
    fn formula_of(&self, key: CellKey) -> Option<(Arc<Formula>, bool)> {
        match self.formulas.get(&key)? {
            FormulaCell::Single(f) => Some((f.clone(), false)),
            FormulaCell::Shared(id) => {
                let group = self.groups.get(id)?;
                let dr = key.row as i64 - group.anchor.row as i64;
                let dc = key.col as i64 - group.anchor.col as i64;
                Some((Arc::new(group.formula.rebase(dr, dc)), false))
            }
            FormulaCell::Array(id) => {
                let array = self.arrays.get(id)?;
                Some((array.formula.clone(), true))
            }
        }
    }

    /// Anchor of the array holding `key`, if any
    fn array_anchor(&self, key: CellKey) -> Option<CellKey> {
        match self.formulas.get(&key) {
            Some(FormulaCell::Array(id)) => self.arrays.get(id).map(|a| a.anchor),
            _ => None,
        }
    }

    fn insert_single(&mut self, key: CellKey, formula: Formula) {
        if formula.is_volatile() {
            self.volatile.insert(key);
        } else {
            self.volatile.remove(&key);
        }
        self.formulas.insert(key, FormulaCell::Single(Arc::new(formula)));
        self.chain.push(key);
        self.grow_extent(key.sheet, CellRange::from_indices(key.row, key.col, key.row, key.col));
    }

    /// One member left the group; the group goes with its last member
    fn leave_group(&mut self, id: GroupId) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.members = group.members.saturating_sub(1);
            if group.members == 0 {
                debug!(group = id, anchor = %group.anchor, "shared formula group dissolved");
                self.groups.remove(&id);
            }
        }
    }

    /// Forget the formula at `key`; array cells are left alone
    fn remove_formula(&mut self, key: CellKey) {
        match self.formulas.get(&key) {
            Some(FormulaCell::Array(_)) | None => return,
            Some(FormulaCell::Shared(id)) => {
                let id = *id;
                self.leave_group(id);
            }
            Some(FormulaCell::Single(_)) => {}
        }
        self.formulas.remove(&key);
        self.forget(key);
    }

    fn remove_array(&mut self, id: ArrayId) {
        if let Some(array) = self.arrays.remove(&id) {
            for cell in array.cells() {
                self.formulas.remove(&cell);
            }
            self.forget(array.anchor);
        }
    }

    fn forget(&mut self, key: CellKey) {
        self.chain.remove(key);
        self.cache.remove(key);
        self.graph.clear_dependencies(key);
        self.volatile.remove(&key);
        self.loaded.remove(&key);
    }

    /// Mark `start` and everything downstream of it stale
    fn invalidate_from(&mut self, start: impl IntoIterator<Item = CellKey>) -> usize {
        let mut work: Vec<CellKey> = start.into_iter().collect();
        let mut seen = AHashSet::new();
        let mut dirtied = 0;
        while let Some(key) = work.pop() {
            if !seen.insert(key) {
                continue;
            }
            if self.cache.mark_dirty(key) {
                dirtied += 1;
            }
            if let Some(FormulaCell::Array(id)) = self.formulas.get(&key) {
                if let Some(array) = self.arrays.get(id) {
                    if array.anchor == key {
                        work.extend(array.cells().filter(|c| *c != key));
                    } else {
                        work.push(array.anchor);
                    }
                }
            }
            work.extend(self.graph.dependents_of(key));
        }
        dirtied
    }
}

/// One top-level request: the active-evaluation stack and the precedents
/// being collected for each cell on it
struct Session<'s, 'h> {
    state: &'s mut EngineState,
    host: &'h dyn SheetModel,
    registry: &'h FunctionRegistry,
    options: &'h EngineOptions,
    active: Vec<CellKey>,
    on_stack: AHashSet<CellKey>,
    frames: Vec<Precedents>,
}

impl<'s, 'h> Session<'s, 'h> {
    fn new(
        state: &'s mut EngineState,
        host: &'h dyn SheetModel,
        registry: &'h FunctionRegistry,
        options: &'h EngineOptions,
    ) -> Self {
        Self {
            state,
            host,
            registry,
            options,
            active: Vec::new(),
            on_stack: AHashSet::new(),
            frames: Vec::new(),
        }
    }

    fn run(&mut self, formula: &Formula, ctx: EvaluationContext<'_>) -> FormulaResult<FormulaValue> {
        let host = self.host;
        let registry = self.registry;
        Machine::new(self, host, registry, ctx).evaluate(formula)
    }

    /// Parse formula text found in the host and adopt it
    fn load(&mut self, key: CellKey, text: &str) -> FormulaResult<()> {
        let ctx = ParseContext::at(self.host.metadata(), key.sheet, key.row, key.col);
        match parse(text, &ctx) {
            Ok(formula) => {
                trace!(cell = %key, "loaded formula from cell source");
                self.state.insert_single(key, formula);
                self.state.loaded.insert(key);
                Ok(())
            }
            Err(source) => {
                debug!(cell = %key, error = %source, "formula text failed to parse");
                Err(EvalError::Parse { cell: key, source })
            }
        }
    }

    fn evaluate_key(&mut self, key: CellKey) -> Outcome {
        if let Some(outcome) = self.state.cache.fresh(key) {
            trace!(cell = %key, "cache hit");
            return outcome.clone();
        }
        if self.on_stack.contains(&key) {
            let pos = self.active.iter().position(|k| *k == key).unwrap_or(0);
            let cycle = self.active[pos..].to_vec();
            warn!(cell = %key, length = cycle.len(), "circular reference");
            return Err(EvalError::CircularReference(cycle));
        }
        if self.active.len() >= self.options.max_depth {
            return Err(EvalError::DepthExceeded(self.options.max_depth));
        }
        let (formula, array_mode) = match self.state.formula_of(key) {
            Some(found) => found,
            None => return Ok(self.host.cell(key.sheet, key.row, key.col).to_value()),
        };

        trace!(cell = %key, "evaluating");
        self.active.push(key);
        self.on_stack.insert(key);
        self.frames.push(Precedents::default());

        let ctx = EvaluationContext::new(key.sheet, key.row, key.col).in_array_mode(array_mode);
        let result = self.run(&formula, ctx);

        self.active.pop();
        self.on_stack.remove(&key);
        let precedents = self.frames.pop().unwrap_or_default();
        self.state.graph.set_precedents(key, precedents);

        let outcome = match result {
            Ok(FormulaValue::Array(rows)) if !array_mode => {
                Ok(FormulaValue::Array(rows).first().clone())
            }
            other => other,
        };
        match &outcome {
            Err(EvalError::UnregisteredFunction(_)) | Err(EvalError::DepthExceeded(_)) => {}
            _ => self.state.cache.store(key, outcome.clone()),
        }
        outcome
    }
}

impl CellReader for Session<'_, '_> {
    fn cell_value(&mut self, sheet: usize, row: u32, col: u16) -> FormulaResult<FormulaValue> {
        let key = CellKey::new(sheet, row, col);
        if let Some(anchor) = self.state.array_anchor(key) {
            let value = self.evaluate_key(anchor)?;
            let offset = ((row - anchor.row) as usize, (col - anchor.col) as usize);
            return Ok(value.element(offset.0, offset.1));
        }
        if !self.state.formulas.contains_key(&key) {
            match self.host.cell(sheet, row, col) {
                CellContent::Formula { text, .. } => self.load(key, text.as_str())?,
                other => return Ok(other.to_value()),
            }
        }
        self.evaluate_key(key)
    }

    fn extent(&self, sheet: usize) -> Option<CellRange> {
        match (self.host.used_range(sheet), self.state.extents.get(&sheet)) {
            (Some(a), Some(b)) => Some(a.bounding(b)),
            (a, b) => a.or(b.copied()),
        }
    }

    fn record(&mut self, sheet: usize, range: CellRange) {
        if let Some(frame) = self.frames.last_mut() {
            frame.add_area(sheet, range);
        }
    }
}

/// Formula cells, cached outcomes and the calculation chain of one workbook
#[derive(Debug, Default)]
pub struct CalcEngine {
    registry: FunctionRegistry,
    options: EngineOptions,
    state: EngineState,
}

impl CalcEngine {
    /// An engine with the built-in function library
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            registry: FunctionRegistry::new(),
            options,
            state: EngineState::default(),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Functions registered here are used from the next evaluation on
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EngineOptions {
        &mut self.options
    }

    fn session<'s>(&'s mut self, host: &'s dyn SheetModel) -> Session<'s, 's> {
        Session::new(&mut self.state, host, &self.registry, &self.options)
    }

    // === Evaluation ===

    /// Evaluate a formula as if it sat in (sheet, row, col), outside the chain
    pub fn evaluate(
        &mut self,
        host: &dyn SheetModel,
        formula: &Formula,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> FormulaResult<FormulaValue> {
        let mut session = self.session(host);
        session.run(formula, EvaluationContext::new(sheet, row, col))
    }

    /// Value of a cell, evaluating it and its precedents as needed
    pub fn evaluate_cell(
        &mut self,
        host: &dyn SheetModel,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> FormulaResult<FormulaValue> {
        self.session(host).cell_value(sheet, row, col)
    }

    /// Walk the calculation chain, handing each outcome to `visit`
    ///
    /// Stops early when `visit` breaks. Returns the number of chain entries
    /// visited.
    pub fn calculate_with<F>(&mut self, host: &dyn SheetModel, mut visit: F) -> usize
    where
        F: FnMut(ChainEntry<'_>) -> ControlFlow<()>,
    {
        if self.options.recalc_volatile {
            self.invalidate_volatile();
        }
        let keys: Vec<CellKey> = self.state.chain.iter().collect();
        let mut session = self.session(host);
        let mut visited = 0;
        for key in keys {
            if !session.state.formulas.contains_key(&key) {
                continue;
            }
            let recalculated = !session.state.cache.is_fresh(key);
            let volatile = session.state.volatile.contains(&key);
            let outcome = session.evaluate_key(key);
            visited += 1;
            let entry = ChainEntry {
                cell: key,
                outcome: &outcome,
                recalculated,
                volatile,
            };
            if visit(entry).is_break() {
                break;
            }
        }
        visited
    }

    /// Evaluate every chain entry, collecting the outcomes
    pub fn evaluate_all(&mut self, host: &dyn SheetModel) -> Vec<(CellKey, Outcome)> {
        let mut out = Vec::new();
        self.calculate_with(host, |entry| {
            out.push((entry.cell, entry.outcome.clone()));
            ControlFlow::Continue(())
        });
        out
    }

    // === Invalidation ===

    /// The host changed (sheet, row, col)
    ///
    /// With the host given, a formula the engine parsed from the cell's old
    /// text is dropped so that the new content is read next time.
    pub fn invalidate(&mut self, host: Option<&dyn SheetModel>, sheet: usize, row: u32, col: u16) {
        let key = CellKey::new(sheet, row, col);
        if host.is_some() && self.state.loaded.contains(&key) {
            trace!(cell = %key, "dropping formula loaded from the old cell text");
            self.state.remove_formula(key);
        }
        self.state.invalidate_from([key]);
    }

    /// Every formula inside `range` or reading any part of it becomes stale
    pub fn invalidate_range(&mut self, sheet: usize, range: &CellRange) {
        let mut start: Vec<CellKey> = self
            .state
            .formulas
            .keys()
            .filter(|k| k.sheet == sheet && range.contains(k.row, k.col))
            .copied()
            .collect();
        start.extend(self.state.graph.dependents_of_range(sheet, range));
        self.state.invalidate_from(start);
    }

    pub fn invalidate_all(&mut self) {
        self.state.cache.mark_all_dirty();
    }

    /// Mark volatile formulas and their dependents stale
    pub fn invalidate_volatile(&mut self) -> usize {
        let volatile: Vec<CellKey> = self.state.volatile.iter().copied().collect();
        self.state.invalidate_from(volatile)
    }

    // === Inspection ===

    pub fn state(&self, sheet: usize, row: u32, col: u16) -> CellState {
        let key = CellKey::new(sheet, row, col);
        let evaluated = self.state.array_anchor(key).unwrap_or(key);
        if !self.state.formulas.contains_key(&key) {
            CellState::NoFormula
        } else if self.state.cache.is_fresh(evaluated) {
            CellState::Fresh
        } else {
            CellState::Stale
        }
    }

    /// The formula a cell evaluates, rebased for shared-group members
    pub fn formula_at(&self, sheet: usize, row: u32, col: u16) -> Option<Formula> {
        self.state
            .formula_of(CellKey::new(sheet, row, col))
            .map(|(f, _)| (*f).clone())
    }

    /// Range of the array formula covering a cell
    pub fn array_range(&self, sheet: usize, row: u32, col: u16) -> Option<CellRange> {
        match self.state.formulas.get(&CellKey::new(sheet, row, col))? {
            FormulaCell::Array(id) => self.state.arrays.get(id).map(|a| a.range),
            _ => None,
        }
    }

    /// Shared group of a cell with its anchor and member range
    pub fn shared_group(&self, sheet: usize, row: u32, col: u16) -> Option<(GroupId, CellKey, CellRange)> {
        match self.state.formulas.get(&CellKey::new(sheet, row, col))? {
            FormulaCell::Shared(id) => self.state.groups.get(id).map(|g| (*id, g.anchor, g.range)),
            _ => None,
        }
    }

    /// Formula cells in chain order
    pub fn chain(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.state.chain.iter()
    }

    /// Bounds of the formula cells entered or loaded on a sheet
    pub fn formula_extent(&self, sheet: usize) -> Option<CellRange> {
        self.state.extents.get(&sheet).copied()
    }

    pub fn formula_count(&self) -> usize {
        self.state.formulas.len()
    }

    // === Formula entry ===

    /// Enter a standalone formula; a shared-group member leaves its group
    pub fn set_formula(
        &mut self,
        sheet: usize,
        row: u32,
        col: u16,
        formula: Formula,
    ) -> Result<(), EditError> {
        let key = CellKey::new(sheet, row, col);
        if let Some(anchor) = self.state.array_anchor(key) {
            return Err(EditError::SplitsArrayFormula(anchor));
        }
        if let Some(FormulaCell::Shared(id)) = self.state.formulas.get(&key) {
            let id = *id;
            debug!(cell = %key, group = id, "shared member replaced by its own formula");
            self.state.leave_group(id);
        }
        self.state.loaded.remove(&key);
        self.state.insert_single(key, formula);
        self.state.invalidate_from([key]);
        self.state.graph.clear_dependencies(key);
        Ok(())
    }

    /// Remove a formula; the cell falls back to its host value
    pub fn clear_formula(&mut self, sheet: usize, row: u32, col: u16) -> Result<(), EditError> {
        let key = CellKey::new(sheet, row, col);
        if let Some(anchor) = self.state.array_anchor(key) {
            return Err(EditError::SplitsArrayFormula(anchor));
        }
        self.state.remove_formula(key);
        self.state.invalidate_from([key]);
        Ok(())
    }

    /// Enter `formula` as the master of a shared group over `range`
    ///
    /// The anchor is the top-left cell; each member evaluates the master
    /// moved by its offset from the anchor.
    pub fn set_shared_formula(
        &mut self,
        sheet: usize,
        range: CellRange,
        formula: Formula,
    ) -> Result<GroupId, EditError> {
        if let Some(anchor) = cells_of(sheet, range).find_map(|c| self.state.array_anchor(c)) {
            return Err(EditError::SplitsArrayFormula(anchor));
        }
        let id = self.state.next_id();
        let anchor = CellKey::new(sheet, range.start.row, range.start.col);
        let volatile = formula.is_volatile();
        let mut members = 0;
        for key in cells_of(sheet, range) {
            if let Some(FormulaCell::Shared(old)) = self.state.formulas.get(&key) {
                let old = *old;
                self.state.leave_group(old);
            }
            self.state.loaded.remove(&key);
            self.state.formulas.insert(key, FormulaCell::Shared(id));
            self.state.chain.push(key);
            if volatile {
                self.state.volatile.insert(key);
            } else {
                self.state.volatile.remove(&key);
            }
            members += 1;
        }
        self.state.groups.insert(
            id,
            SharedGroup {
                anchor,
                range,
                formula: Arc::new(formula),
                members,
            },
        );
        self.state.grow_extent(sheet, range);
        self.state.invalidate_from(cells_of(sheet, range));
        debug!(group = id, anchor = %anchor, members, "shared formula entered");
        Ok(id)
    }

    /// Turn a shared-group member into a standalone formula
    pub fn unshare(&mut self, sheet: usize, row: u32, col: u16) {
        let key = CellKey::new(sheet, row, col);
        let id = match self.state.formulas.get(&key) {
            Some(FormulaCell::Shared(id)) => *id,
            _ => return,
        };
        if let Some((formula, _)) = self.state.formula_of(key) {
            debug!(cell = %key, group = id, "shared member promoted to standalone");
            self.state.leave_group(id);
            self.state.formulas.insert(key, FormulaCell::Single(formula));
        }
    }

    /// Enter an array formula over `range`
    ///
    /// Formulas inside the range are replaced. Fails when the range cuts
    /// through another array formula.
    pub fn set_array_formula(
        &mut self,
        sheet: usize,
        range: CellRange,
        formula: Formula,
    ) -> Result<ArrayId, EditError> {
        let mut replaced = Vec::new();
        for array_id in cells_of(sheet, range).filter_map(|c| match self.state.formulas.get(&c) {
            Some(FormulaCell::Array(id)) => Some(*id),
            _ => None,
        }) {
            if replaced.contains(&array_id) {
                continue;
            }
            if let Some(array) = self.state.arrays.get(&array_id) {
                if !encloses(&range, &array.range) {
                    return Err(EditError::SplitsArrayFormula(array.anchor));
                }
            }
            replaced.push(array_id);
        }
        for array_id in replaced {
            self.state.remove_array(array_id);
        }
        for key in cells_of(sheet, range) {
            self.state.remove_formula(key);
        }

        let id = self.state.next_id();
        let anchor = CellKey::new(sheet, range.start.row, range.start.col);
        if formula.is_volatile() {
            self.state.volatile.insert(anchor);
        }
        for key in cells_of(sheet, range) {
            self.state.formulas.insert(key, FormulaCell::Array(id));
        }
        self.state.arrays.insert(
            id,
            ArrayFormula {
                anchor,
                range,
                formula: Arc::new(formula),
            },
        );
        self.state.chain.push(anchor);
        self.state.grow_extent(sheet, range);
        self.state.invalidate_from(cells_of(sheet, range));
        debug!(anchor = %anchor, range = %range, "array formula entered");
        Ok(id)
    }

    /// Remove the whole array formula covering a cell
    pub fn clear_array(&mut self, sheet: usize, row: u32, col: u16) {
        let key = CellKey::new(sheet, row, col);
        if let Some(FormulaCell::Array(id)) = self.state.formulas.get(&key) {
            let id = *id;
            let cells: Vec<CellKey> = self
                .state
                .arrays
                .get(&id)
                .map(|a| a.cells().collect())
                .unwrap_or_default();
            self.state.remove_array(id);
            self.state.invalidate_from(cells);
        }
    }

    // === Structural edits ===

    /// Rows `first..=last` of `sheet` moved by `delta`
    ///
    /// Formulas in the block move with it and have their relative rows
    /// rebased by `delta`; formulas previously at the destination are
    /// dropped. Nothing changes on failure.
    pub fn notify_rows_shifted(
        &mut self,
        sheet: usize,
        first: u32,
        last: u32,
        delta: i64,
    ) -> Result<(), EditError> {
        check_row_shift(first, last, delta)
            .map_err(|_| EditError::RowShiftOutOfBounds { first, last, delta })?;
        if delta == 0 {
            return Ok(());
        }
        let dest_first = (first as i64 + delta) as u32;
        let dest_last = (last as i64 + delta) as u32;
        let in_block = |row: u32| (first..=last).contains(&row);
        let in_dest = |row: u32| (dest_first..=dest_last).contains(&row);

        // arrays must move or vanish whole
        for array in self.state.arrays.values().filter(|a| a.anchor.sheet == sheet) {
            let (top, bottom) = (array.range.start.row, array.range.end.row);
            let touches_block = top <= last && bottom >= first;
            let inside_block = in_block(top) && in_block(bottom);
            let touches_dest = top <= dest_last && bottom >= dest_first;
            let inside_dest = in_dest(top) && in_dest(bottom);
            if (touches_block && !inside_block) || (!touches_block && touches_dest && !inside_dest) {
                return Err(EditError::SplitsArrayFormula(array.anchor));
            }
        }

        self.invalidate_range(sheet, &rows_of(first, last));
        self.invalidate_range(sheet, &rows_of(dest_first, dest_last));

        // formulas overwritten at the destination
        let overwritten_arrays: Vec<ArrayId> = self
            .state
            .arrays
            .iter()
            .filter(|(_, a)| {
                a.anchor.sheet == sheet && in_dest(a.range.start.row) && !in_block(a.range.start.row)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in overwritten_arrays {
            self.state.remove_array(id);
        }
        let overwritten: Vec<CellKey> = self
            .state
            .formulas
            .keys()
            .filter(|k| k.sheet == sheet && in_dest(k.row) && !in_block(k.row))
            .copied()
            .collect();
        for key in overwritten {
            self.state.remove_formula(key);
        }

        // move the block
        let mut moved: Vec<(CellKey, FormulaCell)> = Vec::new();
        let from_keys: Vec<CellKey> = self
            .state
            .formulas
            .keys()
            .filter(|k| k.sheet == sheet && in_block(k.row))
            .copied()
            .collect();
        for key in &from_keys {
            let cell = match self.state.formulas.get(key) {
                Some(FormulaCell::Single(f)) => FormulaCell::Single(Arc::new(f.rebase(delta, 0))),
                Some(FormulaCell::Shared(id)) => {
                    let id = *id;
                    let group_moves = self
                        .state
                        .groups
                        .get(&id)
                        .is_some_and(|g| in_block(g.range.start.row) && in_block(g.range.end.row));
                    if group_moves {
                        FormulaCell::Shared(id)
                    } else {
                        let effective = self.state.formula_of(*key).map(|(f, _)| f);
                        self.state.leave_group(id);
                        match effective {
                            Some(f) => FormulaCell::Single(Arc::new(f.rebase(delta, 0))),
                            None => continue,
                        }
                    }
                }
                Some(FormulaCell::Array(id)) => FormulaCell::Array(*id),
                None => continue,
            };
            moved.push((*key, cell));
        }
        for key in &from_keys {
            self.state.formulas.remove(key);
            self.state.graph.clear_dependencies(*key);
        }
        let shift = |key: CellKey| CellKey::new(key.sheet, (key.row as i64 + delta) as u32, key.col);
        let moves: Vec<(CellKey, CellKey)> = moved.iter().map(|(k, _)| (*k, shift(*k))).collect();
        for (key, cell) in moved {
            self.state.formulas.insert(shift(key), cell);
        }

        for group in self.state.groups.values_mut().filter(|g| {
            g.anchor.sheet == sheet && in_block(g.range.start.row) && in_block(g.range.end.row)
        }) {
            group.anchor = shift(group.anchor);
            group.range = shift_range(group.range, delta);
            group.formula = Arc::new(group.formula.rebase(delta, 0));
        }
        for array in self.state.arrays.values_mut().filter(|a| {
            a.anchor.sheet == sheet && in_block(a.range.start.row) && in_block(a.range.end.row)
        }) {
            array.anchor = shift(array.anchor);
            array.range = shift_range(array.range, delta);
            array.formula = Arc::new(array.formula.rebase(delta, 0));
        }

        self.state.chain.rekey(&moves);
        self.state.cache.rekey(&moves);
        for set in [&mut self.state.volatile, &mut self.state.loaded] {
            let keys: Vec<CellKey> = moves.iter().filter(|(from, _)| set.remove(from)).map(|(_, to)| *to).collect();
            set.extend(keys);
        }
        self.state.recompute_extent(sheet);
        self.state.invalidate_from(moves.iter().map(|(_, to)| *to));

        debug!(sheet, first, last, delta, moved = moves.len(), "rows shifted");
        Ok(())
    }

    /// Rows were inserted into or deleted from `sheet`
    ///
    /// Every formula follows the cells it names: references at or below an
    /// insertion move down, references into deleted rows become `#REF!` and
    /// areas grow or shrink. Formula cells of the edited sheet move with
    /// their rows and those in deleted rows are dropped. A shared group the
    /// edit reaches is split into standalone formulas. Nothing changes on
    /// failure.
    pub fn notify_rows_edited(
        &mut self,
        sheet: EditedSheet<'_>,
        edit: RowEdit,
    ) -> Result<(), EditError> {
        let (at, count) = match edit {
            RowEdit::Insert { at, count } | RowEdit::Delete { at, count } => (at, count),
        };
        if count == 0 {
            return Ok(());
        }
        let on_sheet = |key: &CellKey| key.sheet == sheet.index;

        for array in self.state.arrays.values().filter(|a| on_sheet(&a.anchor)) {
            let (top, bottom) = (array.range.start.row, array.range.end.row);
            let splits = match edit {
                RowEdit::Insert { .. } => top < at && at <= bottom,
                RowEdit::Delete { .. } => {
                    let end = at.saturating_add(count);
                    top < end && bottom >= at && !(top >= at && bottom < end)
                }
            };
            if splits {
                return Err(EditError::SplitsArrayFormula(array.anchor));
            }
        }
        if let RowEdit::Insert { .. } = edit {
            let lowest = self
                .state
                .formulas
                .keys()
                .filter(|k| on_sheet(*k) && k.row >= at)
                .map(|k| k.row)
                .max();
            if let Some(last) = lowest.filter(|row| edit.map_row(*row).is_none()) {
                return Err(EditError::RowShiftOutOfBounds {
                    first: at,
                    last,
                    delta: count as i64,
                });
            }
        }

        let mut split: AHashSet<GroupId> = AHashSet::new();
        for (key, cell) in &self.state.formulas {
            if let FormulaCell::Shared(id) = cell {
                if split.contains(id) {
                    continue;
                }
                let moves = on_sheet(key) && key.row >= at;
                let rewritten = self
                    .state
                    .formula_of(*key)
                    .is_some_and(|(f, _)| f.adjust_rows(Some(key.sheet), sheet, edit).is_some());
                if moves || rewritten {
                    split.insert(*id);
                }
            }
        }

        let old = std::mem::take(&mut self.state.formulas);
        let mut formulas = AHashMap::with_capacity(old.len());
        let mut moves: Vec<(CellKey, CellKey)> = Vec::new();
        let mut dropped: Vec<CellKey> = Vec::new();
        let mut rewritten = 0;
        for (key, cell) in old {
            let cell = match cell {
                FormulaCell::Single(f) => match f.adjust_rows(Some(key.sheet), sheet, edit) {
                    Some(adjusted) => {
                        rewritten += 1;
                        FormulaCell::Single(Arc::new(adjusted))
                    }
                    None => FormulaCell::Single(f),
                },
                FormulaCell::Shared(id) if split.contains(&id) => {
                    let group = match self.state.groups.get(&id) {
                        Some(group) => group,
                        None => continue,
                    };
                    let member = group.formula.rebase(
                        key.row as i64 - group.anchor.row as i64,
                        key.col as i64 - group.anchor.col as i64,
                    );
                    let member = member
                        .adjust_rows(Some(key.sheet), sheet, edit)
                        .unwrap_or(member);
                    FormulaCell::Single(Arc::new(member))
                }
                other => other,
            };
            let row = if on_sheet(&key) {
                edit.map_row(key.row)
            } else {
                Some(key.row)
            };
            match row {
                Some(row) => {
                    let to = CellKey::new(key.sheet, row, key.col);
                    if to != key {
                        moves.push((key, to));
                    }
                    formulas.insert(to, cell);
                }
                None => dropped.push(key),
            }
        }
        self.state.formulas = formulas;

        for id in &split {
            if let Some(group) = self.state.groups.remove(id) {
                debug!(group = id, anchor = %group.anchor, "shared formula group split by row edit");
            }
        }
        let mut deleted_arrays = Vec::new();
        for (id, array) in self.state.arrays.iter_mut() {
            if on_sheet(&array.anchor) {
                match edit.map_span(array.range.start.row, array.range.end.row) {
                    Some((top, bottom)) => {
                        array.anchor.row = top;
                        array.range.start.row = top;
                        array.range.end.row = bottom;
                    }
                    None => {
                        deleted_arrays.push(*id);
                        continue;
                    }
                }
            }
            if let Some(adjusted) = array.formula.adjust_rows(Some(array.anchor.sheet), sheet, edit) {
                array.formula = Arc::new(adjusted);
                rewritten += 1;
            }
        }
        for id in deleted_arrays {
            self.state.arrays.remove(&id);
        }

        for key in &dropped {
            self.state.forget(*key);
        }
        self.state.chain.rekey(&moves);
        self.state.cache.rekey(&moves);
        for set in [&mut self.state.volatile, &mut self.state.loaded] {
            let keys: Vec<CellKey> = moves.iter().filter(|(from, _)| set.remove(from)).map(|(_, to)| *to).collect();
            set.extend(keys);
        }
        // recorded precedents name the old rows; every formula re-records
        self.state.graph.clear();
        self.state.cache.mark_all_dirty();
        self.state.recompute_extent(sheet.index);

        debug!(
            sheet = sheet.index,
            ?edit,
            moved = moves.len(),
            dropped = dropped.len(),
            rewritten,
            "rows edited"
        );
        Ok(())
    }

    /// Sheet `old` is now called `new`
    ///
    /// Tokens naming the sheet by text are rewritten; references by index
    /// need no change.
    pub fn notify_sheet_renamed(&mut self, old: &str, new: &str) {
        let mut rewritten = 0;
        for cell in self.state.formulas.values_mut() {
            if let FormulaCell::Single(f) = cell {
                if let Some(renamed) = f.rename_sheet(old, new) {
                    *f = Arc::new(renamed);
                    rewritten += 1;
                }
            }
        }
        for group in self.state.groups.values_mut() {
            if let Some(renamed) = group.formula.rename_sheet(old, new) {
                group.formula = Arc::new(renamed);
                rewritten += 1;
            }
        }
        for array in self.state.arrays.values_mut() {
            if let Some(renamed) = array.formula.rename_sheet(old, new) {
                array.formula = Arc::new(renamed);
                rewritten += 1;
            }
        }
        debug!(old, new, rewritten, "sheet renamed");
        self.invalidate_all();
    }
}

fn encloses(outer: &CellRange, inner: &CellRange) -> bool {
    outer.start.row <= inner.start.row
        && outer.start.col <= inner.start.col
        && outer.end.row >= inner.end.row
        && outer.end.col >= inner.end.col
}

fn shift_range(range: CellRange, delta: i64) -> CellRange {
    let mut out = range;
    out.start.row = (range.start.row as i64 + delta) as u32;
    out.end.row = (range.end.row as i64 + delta) as u32;
    out
}
