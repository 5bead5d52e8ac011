//! Stack machine evaluating postfix token arrays
//!
//! Operand tokens push values or reference handles. References stay lazy
//! until an operator or function needs their value, so that `SUM(A:A)` only
//! reads the populated part of column A and `A1:B2 B2:C3` never reads a cell
//! outside the intersection.

use tracing::trace;
use xlcalc_core::{CellError, CellRange, NameScope};

use crate::error::{EvalError, FormulaResult};
use crate::functions::math::power;
use crate::functions::FunctionRegistry;
use crate::resolver::{clip_to_extent, resolve_this_row, SheetModel};
use crate::token::{BinaryOp, ExternRef, ExternTarget, Formula, NameId, Token, UnaryOp};
use crate::value::{compare_values, FormulaValue};

/// Largest external area read cell by cell
const MAX_EXTERNAL_CELLS: u64 = 1 << 20;

/// Largest reference padded to full size in array mode
const MAX_PADDED_CELLS: u64 = 1 << 16;

/// Where a function argument came from when it was written as a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefOrigin {
    pub sheet: usize,
    /// The reference as written, before clipping to the populated extent
    pub range: CellRange,
}

/// Context handed to function implementations
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Current worksheet index
    pub current_sheet: usize,
    /// Current cell row (for implicit intersection and ROW())
    pub current_row: u32,
    /// Current cell column
    pub current_col: u16,
    /// Evaluating an array formula
    pub array_mode: bool,
    origins: &'a [Option<RefOrigin>],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self {
            current_sheet: sheet,
            current_row: row,
            current_col: col,
            array_mode: false,
            origins: &[],
        }
    }

    /// Create a simple context at Sheet1!A1 (for testing)
    pub fn simple() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn with_origins(self, origins: &'a [Option<RefOrigin>]) -> Self {
        Self { origins, ..self }
    }

    pub fn in_array_mode(self, array_mode: bool) -> Self {
        Self { array_mode, ..self }
    }

    /// The reference argument `i` was read from, if it was one
    pub fn reference_origin(&self, i: usize) -> Option<&RefOrigin> {
        self.origins.get(i).and_then(Option::as_ref)
    }

    /// Collapse an area value to the cell in line with the evaluating cell
    ///
    /// A one-column area yields the cell on the current row, a one-row area the
    /// cell in the current column; anything else is `#VALUE!`. Values that
    /// are not references contribute their top-left element.
    pub fn implicit_intersection(
        &self,
        value: &FormulaValue,
        origin: Option<&RefOrigin>,
    ) -> FormulaValue {
        match (value, origin) {
            (FormulaValue::Array(rows), Some(origin)) => {
                match implicit_position(&origin.range, self.current_row, self.current_col) {
                    Some((row, col)) => {
                        let r = (row - origin.range.start.row) as usize;
                        let c = (col - origin.range.start.col) as usize;
                        rows.get(r)
                            .and_then(|cells| cells.get(c))
                            .cloned()
                            .unwrap_or(FormulaValue::Empty)
                    }
                    None => FormulaValue::Error(CellError::Value),
                }
            }
            (v, _) => v.first().clone(),
        }
    }
}

/// Cell of `range` in line with (row, col), if there is exactly one
pub fn implicit_position(range: &CellRange, row: u32, col: u16) -> Option<(u32, u16)> {
    if range.is_single_cell() {
        return Some((range.start.row, range.start.col));
    }
    if range.col_count() == 1 && (range.start.row..=range.end.row).contains(&row) {
        return Some((row, range.start.col));
    }
    if range.row_count() == 1 && (range.start.col..=range.end.col).contains(&col) {
        return Some((range.start.row, col));
    }
    None
}

/// Cell access for the evaluator
///
/// The engine implements this with caching and cycle detection;
/// [`StoredValues`] reads the values the host last stored.
pub trait CellReader {
    /// Value of one cell, evaluating its formula if needed
    fn cell_value(&mut self, sheet: usize, row: u32, col: u16) -> FormulaResult<FormulaValue>;

    /// Bounds of the populated cells of a sheet, used to clip large areas
    fn extent(&self, sheet: usize) -> Option<CellRange>;

    /// Note that the formula being evaluated read `range`
    fn record(&mut self, _sheet: usize, _range: CellRange) {}
}

/// Reads plain host values; formula cells yield their stored result
pub struct StoredValues<'h> {
    host: &'h dyn SheetModel,
}

impl<'h> StoredValues<'h> {
    pub fn new(host: &'h dyn SheetModel) -> Self {
        Self { host }
    }
}

impl CellReader for StoredValues<'_> {
    fn cell_value(&mut self, sheet: usize, row: u32, col: u16) -> FormulaResult<FormulaValue> {
        Ok(self.host.cell(sheet, row, col).to_value())
    }

    fn extent(&self, sheet: usize) -> Option<CellRange> {
        self.host.used_range(sheet)
    }
}

/// Evaluate `formula` as if it sat in (sheet, row, col)
pub fn evaluate_formula(
    reader: &mut dyn CellReader,
    host: &dyn SheetModel,
    registry: &FunctionRegistry,
    formula: &Formula,
    ctx: EvaluationContext<'_>,
) -> FormulaResult<FormulaValue> {
    Machine::new(reader, host, registry, ctx).evaluate(formula)
}

/// A stack entry
#[derive(Debug, Clone)]
enum Operand {
    Value(FormulaValue),
    /// An area (or single cell) on one sheet
    Ref(RefOrigin),
    /// Several areas: a multi-sheet reference or a union
    Multi(Vec<RefOrigin>),
}

impl Operand {
    fn error(e: CellError) -> Self {
        Operand::Value(FormulaValue::Error(e))
    }
}

/// One pending `IF` whose jump markers were taken
struct IfFrame {
    /// Index of the IF function token
    target: usize,
    /// Stack height when the branch started
    base: usize,
}

pub(crate) struct Machine<'a, 'h> {
    reader: &'a mut dyn CellReader,
    host: &'h dyn SheetModel,
    registry: &'h FunctionRegistry,
    sheet: usize,
    row: u32,
    col: u16,
    array_mode: bool,
    /// Names being evaluated, to stop name cycles
    names: Vec<NameId>,
}

impl<'a, 'h> Machine<'a, 'h> {
    pub(crate) fn new(
        reader: &'a mut dyn CellReader,
        host: &'h dyn SheetModel,
        registry: &'h FunctionRegistry,
        ctx: EvaluationContext<'_>,
    ) -> Self {
        Self {
            reader,
            host,
            registry,
            sheet: ctx.current_sheet,
            row: ctx.current_row,
            col: ctx.current_col,
            array_mode: ctx.array_mode,
            names: Vec::new(),
        }
    }

    fn context<'o>(&self) -> EvaluationContext<'o> {
        EvaluationContext::new(self.sheet, self.row, self.col).in_array_mode(self.array_mode)
    }

    pub(crate) fn evaluate(&mut self, formula: &Formula) -> FormulaResult<FormulaValue> {
        trace!(sheet = self.sheet, row = self.row, col = self.col, "evaluating formula");
        let operand = self.run(formula.tokens())?;
        self.value(operand)
    }

    fn run(&mut self, tokens: &[Token]) -> FormulaResult<Operand> {
        let mut stack: Vec<Operand> = Vec::new();
        let mut frames: Vec<IfFrame> = Vec::new();
        let mut pc = 0;

        while pc < tokens.len() {
            let token = &tokens[pc];
            pc += 1;
            match token {
                Token::Number(n) => stack.push(Operand::Value(FormulaValue::Number(*n))),
                Token::Text(s) => stack.push(Operand::Value(FormulaValue::String(s.to_string()))),
                Token::Bool(b) => stack.push(Operand::Value(FormulaValue::Boolean(*b))),
                Token::Error(e) => stack.push(Operand::error(*e)),
                Token::MissingArg => stack.push(Operand::Value(FormulaValue::Empty)),
                Token::Array(rows) => stack.push(Operand::Value(FormulaValue::Array(rows.clone()))),

                Token::Ref(cell) => stack.push(Operand::Ref(RefOrigin {
                    sheet: self.sheet,
                    range: CellRange::single(*cell),
                })),
                Token::Area(area) => stack.push(Operand::Ref(RefOrigin {
                    sheet: self.sheet,
                    range: area.range,
                })),
                Token::Ref3d { sheets, cell } => {
                    stack.push(self.sheet_span(sheets.first, sheets.last, CellRange::single(*cell)))
                }
                Token::Area3d { sheets, area } => {
                    stack.push(self.sheet_span(sheets.first, sheets.last, area.range))
                }
                Token::ExternRef(ext) => {
                    let operand = self.external(ext)?;
                    stack.push(operand);
                }
                Token::Name(id) => {
                    let operand = self.name(*id)?;
                    stack.push(operand);
                }
                Token::ThisRow(this_row) => {
                    match resolve_this_row(self.host.metadata(), this_row, self.row) {
                        Some((sheet, range)) => stack.push(Operand::Ref(RefOrigin { sheet, range })),
                        None => stack.push(Operand::error(CellError::Ref)),
                    }
                }

                Token::Binary(op) => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let result = self.binary(*op, left, right)?;
                    stack.push(result);
                }
                Token::Unary(op) => {
                    let operand = pop(&mut stack)?;
                    let value = self.value(operand)?;
                    stack.push(Operand::Value(unary(*op, value)));
                }
                Token::Function { name, argc, .. } => {
                    if name.as_str() == "IF" && frames.last().is_some_and(|f| f.target == pc - 1) {
                        let frame = frames.pop().ok_or_else(|| malformed("IF frame"))?;
                        if stack.len() == frame.base {
                            // false condition and no else branch
                            stack.push(Operand::Value(FormulaValue::Boolean(false)));
                        } else if stack.len() != frame.base + 1 {
                            return Err(malformed("IF branch left extra operands"));
                        }
                        continue;
                    }
                    if stack.len() < *argc {
                        return Err(malformed("not enough operands for function"));
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let result = self.call(name.as_str(), args)?;
                    stack.push(result);
                }

                Token::AttrIf(skip) => {
                    let skip_at = pc - 1 + skip;
                    let target = match tokens.get(skip_at) {
                        Some(Token::AttrSkip(n)) => skip_at + 1 + n,
                        _ => return Err(malformed("AttrIf without matching AttrSkip")),
                    };
                    let condition = pop(&mut stack)?;
                    let condition = self.value(condition)?;
                    frames.push(IfFrame {
                        target,
                        base: stack.len(),
                    });
                    match condition_of(condition.first()) {
                        Ok(true) => {}
                        Ok(false) => pc = skip_at + 1,
                        Err(e) => {
                            stack.push(Operand::error(e));
                            pc = target;
                        }
                    }
                }
                Token::AttrSkip(n) => pc += n,
                Token::AttrSum => {
                    let arg = pop(&mut stack)?;
                    let result = self.call("SUM", vec![arg])?;
                    stack.push(result);
                }
                Token::Paren | Token::AttrVolatile => {}
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            (None, _) => Err(malformed("empty token array")),
            (Some(_), false) => Err(malformed("operands left on the stack")),
        }
    }

    /// Reference on `first..=last`; sheets missing from the workbook become `#REF!`
    fn sheet_span(&self, first: usize, last: usize, range: CellRange) -> Operand {
        if last >= self.host.sheet_count() {
            return Operand::error(CellError::Ref);
        }
        if first == last {
            return Operand::Ref(RefOrigin {
                sheet: first,
                range,
            });
        }
        Operand::Multi(
            (first..=last)
                .map(|sheet| RefOrigin { sheet, range })
                .collect(),
        )
    }

    fn name(&mut self, id: NameId) -> FormulaResult<Operand> {
        let host = self.host;
        let def = match host.name_def(id) {
            Some(def) => def,
            None => return Ok(Operand::error(CellError::Name)),
        };
        if self.names.contains(&id) {
            trace!(name = %def.name, "name refers to itself");
            return Ok(Operand::error(CellError::Name));
        }
        self.names.push(id);
        let result = self.run(def.body.tokens());
        self.names.pop();
        result
    }

    fn external(&mut self, ext: &ExternRef) -> FormulaResult<Operand> {
        if ext.book == 0 {
            return Ok(self.self_external(ext));
        }
        let link = match self.host.external_link(ext.book) {
            Some(link) => link,
            None => return Ok(Operand::error(CellError::Ref)),
        };
        let book = match link.book {
            Some(book) => book,
            None => return Ok(Operand::error(CellError::Ref)),
        };
        let value = match (&ext.target, ext.sheet.as_deref()) {
            (ExternTarget::Name(name), sheet) => book.name_value(sheet, name),
            (ExternTarget::Cell(cell), Some(sheet)) => book.cell_value(sheet, cell.row, cell.col),
            (ExternTarget::Area(area), Some(sheet)) => {
                if area.range.cell_count() > MAX_EXTERNAL_CELLS {
                    None
                } else {
                    let mut rows = Vec::with_capacity(area.range.row_count() as usize);
                    for row in area.range.start.row..=area.range.end.row {
                        let mut cells = Vec::with_capacity(area.range.col_count() as usize);
                        for col in area.range.start.col..=area.range.end.col {
                            cells.push(
                                book.cell_value(sheet, row, col)
                                    .unwrap_or(FormulaValue::Error(CellError::Ref)),
                            );
                        }
                        rows.push(cells);
                    }
                    Some(FormulaValue::Array(rows))
                }
            }
            (_, None) => None,
        };
        Ok(Operand::Value(
            value.unwrap_or(FormulaValue::Error(CellError::Ref)),
        ))
    }

    /// `[0]Sheet!A1`: this workbook, sheet looked up by name now
    fn self_external(&mut self, ext: &ExternRef) -> Operand {
        let sheet = match ext.sheet.as_deref() {
            Some(name) => match self.host.sheet_index(name) {
                Some(index) => Some(index),
                None => return Operand::error(CellError::Ref),
            },
            None => None,
        };
        match &ext.target {
            ExternTarget::Cell(cell) => Operand::Ref(RefOrigin {
                sheet: sheet.unwrap_or(self.sheet),
                range: CellRange::single(*cell),
            }),
            ExternTarget::Area(area) => Operand::Ref(RefOrigin {
                sheet: sheet.unwrap_or(self.sheet),
                range: area.range,
            }),
            ExternTarget::Name(name) => {
                let id = sheet
                    .and_then(|s| self.host.defined_name(name, NameScope::Sheet(s)))
                    .or_else(|| self.host.defined_name(name, NameScope::Workbook));
                match id.map(|id| self.name(id)) {
                    Some(Ok(operand)) => operand,
                    Some(Err(_)) | None => Operand::error(CellError::Name),
                }
            }
        }
    }

    // === Values ===

    /// Value of an operand where one value is needed
    fn value(&mut self, operand: Operand) -> FormulaResult<FormulaValue> {
        match operand {
            Operand::Value(v) => Ok(v),
            Operand::Ref(origin) if origin.range.is_single_cell() => {
                self.reader.record(origin.sheet, origin.range);
                let start = origin.range.start;
                Ok(self.reader.cell_value(origin.sheet, start.row, start.col)?.first().clone())
            }
            Operand::Ref(origin) if self.array_mode => {
                let values = self.area(&origin)?;
                Ok(pad(values, &origin.range))
            }
            Operand::Ref(origin) => {
                match implicit_position(&origin.range, self.row, self.col) {
                    Some((row, col)) => {
                        self.reader.record(origin.sheet, CellRange::from_indices(row, col, row, col));
                        Ok(self.reader.cell_value(origin.sheet, row, col)?.first().clone())
                    }
                    None => Ok(FormulaValue::Error(CellError::Value)),
                }
            }
            Operand::Multi(_) => Ok(FormulaValue::Error(CellError::Value)),
        }
    }

    /// Values of an area, clipped to the populated extent of its sheet
    fn area(&mut self, origin: &RefOrigin) -> FormulaResult<FormulaValue> {
        self.reader.record(origin.sheet, origin.range);
        let start = origin.range.start;
        if origin.range.is_single_cell() {
            return Ok(self.reader.cell_value(origin.sheet, start.row, start.col)?.first().clone());
        }
        let clipped = match clip_to_extent(&origin.range, self.reader.extent(origin.sheet).as_ref()) {
            Some(clipped) => clipped,
            None => return Ok(FormulaValue::Array(Vec::new())),
        };
        let mut rows = Vec::with_capacity(clipped.row_count() as usize);
        for row in clipped.start.row..=clipped.end.row {
            let mut cells = Vec::with_capacity(clipped.col_count() as usize);
            for col in clipped.start.col..=clipped.end.col {
                cells.push(self.reader.cell_value(origin.sheet, row, col)?.first().clone());
            }
            rows.push(cells);
        }
        Ok(FormulaValue::Array(rows))
    }

    // === Operators ===

    fn binary(&mut self, op: BinaryOp, left: Operand, right: Operand) -> FormulaResult<Operand> {
        if op.is_reference_op() {
            return Ok(reference_op(op, left, right));
        }
        let left = self.value(left)?;
        let right = self.value(right)?;
        Ok(Operand::Value(broadcast(&left, &right, |l, r| scalar_binary(op, l, r))))
    }

    // === Functions ===

    fn call(&mut self, name: &str, args: Vec<Operand>) -> FormulaResult<Operand> {
        let registry = self.registry;
        let def = registry
            .get(name)
            .ok_or_else(|| EvalError::UnregisteredFunction(name.to_string()))?;
        if !def.accepts(args.len()) {
            return Err(EvalError::ArgumentCount {
                function: def.name.to_string(),
                expected: match def.max_args {
                    Some(max) if max == def.min_args => max.to_string(),
                    Some(max) => format!("{}..={}", def.min_args, max),
                    None => format!("at least {}", def.min_args),
                },
                actual: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        let mut origins = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Operand::Value(v) => {
                    values.push(v);
                    origins.push(None);
                }
                Operand::Ref(origin) => {
                    values.push(self.area(&origin)?);
                    origins.push(Some(origin));
                }
                Operand::Multi(pieces) if def.aggregate => {
                    for origin in pieces {
                        values.push(self.area(&origin)?);
                        origins.push(Some(origin));
                    }
                }
                Operand::Multi(_) => return Ok(Operand::error(CellError::Value)),
            }
        }

        let ctx = self.context().with_origins(&origins);
        let result = (def.implementation)(&values, &ctx)?;
        Ok(Operand::Value(result))
    }
}

fn pop(stack: &mut Vec<Operand>) -> FormulaResult<Operand> {
    stack.pop().ok_or_else(|| malformed("operand stack underflow"))
}

fn malformed(what: &str) -> EvalError {
    EvalError::MalformedTokens(what.to_string())
}

/// Truth value of an IF condition
fn condition_of(value: &FormulaValue) -> Result<bool, CellError> {
    match value {
        FormulaValue::Error(e) => Err(*e),
        v => v.to_bool(),
    }
}

/// Grow a clipped area to the written size; cells past the extent are blank
fn pad(values: FormulaValue, range: &CellRange) -> FormulaValue {
    let (rows, cols) = (range.row_count() as usize, range.col_count() as usize);
    if range.cell_count() > MAX_PADDED_CELLS {
        return values;
    }
    match values {
        FormulaValue::Array(mut data) => {
            for row in data.iter_mut() {
                row.resize(cols, FormulaValue::Empty);
            }
            data.resize(rows, vec![FormulaValue::Empty; cols]);
            FormulaValue::Array(data)
        }
        scalar => scalar,
    }
}

/// `:`, space and `,` on reference operands
fn reference_op(op: BinaryOp, left: Operand, right: Operand) -> Operand {
    match (op, left, right) {
        (_, Operand::Value(FormulaValue::Error(e)), _) | (_, _, Operand::Value(FormulaValue::Error(e))) => {
            Operand::error(e)
        }
        (BinaryOp::Range, Operand::Ref(l), Operand::Ref(r)) if l.sheet == r.sheet => {
            Operand::Ref(RefOrigin {
                sheet: l.sheet,
                range: l.range.bounding(&r.range),
            })
        }
        (BinaryOp::Intersect, Operand::Ref(l), Operand::Ref(r)) if l.sheet == r.sheet => {
            match l.range.intersect(&r.range) {
                Some(range) => Operand::Ref(RefOrigin {
                    sheet: l.sheet,
                    range,
                }),
                None => Operand::error(CellError::Null),
            }
        }
        (BinaryOp::Intersect, Operand::Ref(_), Operand::Ref(_)) => Operand::error(CellError::Null),
        (BinaryOp::Union, l, r) => match (pieces(l), pieces(r)) {
            (Some(mut l), Some(r)) => {
                l.extend(r);
                Operand::Multi(l)
            }
            _ => Operand::error(CellError::Value),
        },
        _ => Operand::error(CellError::Value),
    }
}

fn pieces(operand: Operand) -> Option<Vec<RefOrigin>> {
    match operand {
        Operand::Ref(origin) => Some(vec![origin]),
        Operand::Multi(pieces) => Some(pieces),
        Operand::Value(_) => None,
    }
}

/// Apply `f` element-wise when either side is an array
fn broadcast(
    left: &FormulaValue,
    right: &FormulaValue,
    f: impl Fn(&FormulaValue, &FormulaValue) -> FormulaValue,
) -> FormulaValue {
    if !matches!(left, FormulaValue::Array(_)) && !matches!(right, FormulaValue::Array(_)) {
        return f(left, right);
    }
    let (lr, lc) = left.dimensions();
    let (rr, rc) = right.dimensions();
    let (rows, cols) = (lr.max(rr), lc.max(rc));
    FormulaValue::Array(
        (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| f(&left.element(r, c), &right.element(r, c)))
                    .collect()
            })
            .collect(),
    )
}

fn scalar_binary(op: BinaryOp, left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    if let FormulaValue::Error(e) = left {
        return FormulaValue::Error(*e);
    }
    if let FormulaValue::Error(e) = right {
        return FormulaValue::Error(*e);
    }

    match op {
        BinaryOp::Concat => FormulaValue::String(left.as_string() + &right.as_string()),
        BinaryOp::Equal => (compare_values(left, right).is_eq()).into(),
        BinaryOp::NotEqual => (compare_values(left, right).is_ne()).into(),
        BinaryOp::Less => (compare_values(left, right).is_lt()).into(),
        BinaryOp::LessEqual => (compare_values(left, right).is_le()).into(),
        BinaryOp::Greater => (compare_values(left, right).is_gt()).into(),
        BinaryOp::GreaterEqual => (compare_values(left, right).is_ge()).into(),
        _ => {
            let (l, r) = match (left.to_number(), right.to_number()) {
                (Ok(l), Ok(r)) => (l, r),
                (Err(e), _) | (_, Err(e)) => return FormulaValue::Error(e),
            };
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide if r == 0.0 => return FormulaValue::Error(CellError::Div0),
                BinaryOp::Divide => l / r,
                BinaryOp::Power => return power(l, r).unwrap_or_else(FormulaValue::Error),
                _ => return FormulaValue::Error(CellError::Value),
            };
            if result.is_finite() {
                FormulaValue::Number(result)
            } else {
                FormulaValue::Error(CellError::Num)
            }
        }
    }
}

fn unary(op: UnaryOp, value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Array(rows) => FormulaValue::Array(
            rows.into_iter()
                .map(|row| row.into_iter().map(|v| unary(op, v)).collect())
                .collect(),
        ),
        FormulaValue::Error(e) => FormulaValue::Error(e),
        v if op == UnaryOp::Plus => v,
        v => match v.to_number() {
            Ok(n) if op == UnaryOp::Minus => FormulaValue::Number(-n),
            Ok(n) => FormulaValue::Number(n / 100.0),
            Err(e) => FormulaValue::Error(e),
        },
    }
}
