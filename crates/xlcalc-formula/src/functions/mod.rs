//! Built-in Excel functions

pub mod catalog;
pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;

use std::collections::HashMap;

use xlcalc_core::CellError;

use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{parse_numeric_text, FormulaValue};

/// Function implementation signature
///
/// Single-cell references arrive as scalars, areas as arrays. The context
/// tells a function which arguments came from references and where they sit.
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
#[derive(Clone)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub implementation: FunctionImpl,
    /// Recalculated on every batch calculation
    pub volatile: bool,
    /// Accepts multi-sheet references and unions, one argument per piece
    pub aggregate: bool,
}

impl FunctionDef {
    pub fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation,
            volatile: false,
            aggregate: false,
        }
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map_or(true, |max| argc <= max)
    }
}

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("volatile", &self.volatile)
            .field("aggregate", &self.aggregate)
            .finish()
    }
}

/// Function registry
///
/// Owned by one engine; callers may add or replace functions at any time.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_info_functions();
        registry.register_text_functions();
        registry.register_date_functions();
        registry.register_lookup_functions();

        registry
    }

    /// A registry with no functions at all
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register a function, replacing any previous definition
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    pub fn unregister(&mut self, name: &str) -> Option<FunctionDef> {
        self.functions.remove(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn add(&mut self, name: &'static str, min: usize, max: Option<usize>, f: FunctionImpl) {
        self.register(FunctionDef::new(name, min, max, f));
    }

    fn register_math_functions(&mut self) {
        // 3-D capable aggregates
        for (name, f) in [
            ("SUM", math::fn_sum as FunctionImpl),
            ("AVERAGE", math::fn_average),
            ("AVERAGEA", math::fn_averagea),
            ("MIN", math::fn_min),
            ("MINA", math::fn_mina),
            ("MAX", math::fn_max),
            ("MAXA", math::fn_maxa),
            ("COUNT", math::fn_count),
            ("COUNTA", math::fn_counta),
            ("PRODUCT", math::fn_product),
            ("STDEV", math::fn_stdev),
            ("STDEVP", math::fn_stdevp),
            ("VAR", math::fn_var),
            ("VARP", math::fn_varp),
        ] {
            self.register(FunctionDef::new(name, 1, None, f).aggregate());
        }

        self.add("SUMSQ", 1, None, math::fn_sumsq);
        self.add("MEDIAN", 1, None, math::fn_median);
        self.add("COUNTBLANK", 1, Some(1), math::fn_countblank);
        self.add("LARGE", 2, Some(2), math::fn_large);
        self.add("SMALL", 2, Some(2), math::fn_small);
        self.add("SUMPRODUCT", 1, None, math::fn_sumproduct);

        self.add("ABS", 1, Some(1), math::fn_abs);
        self.add("SIGN", 1, Some(1), math::fn_sign);
        self.add("INT", 1, Some(1), math::fn_int);
        self.add("TRUNC", 1, Some(2), math::fn_trunc);
        self.add("ROUND", 2, Some(2), math::fn_round);
        self.add("ROUNDUP", 2, Some(2), math::fn_roundup);
        self.add("ROUNDDOWN", 2, Some(2), math::fn_rounddown);
        self.add("CEILING", 2, Some(2), math::fn_ceiling);
        self.add("FLOOR", 2, Some(2), math::fn_floor);
        self.add("EVEN", 1, Some(1), math::fn_even);
        self.add("ODD", 1, Some(1), math::fn_odd);
        self.add("MOD", 2, Some(2), math::fn_mod);
        self.add("SQRT", 1, Some(1), math::fn_sqrt);
        self.add("POWER", 2, Some(2), math::fn_power);
        self.add("EXP", 1, Some(1), math::fn_exp);
        self.add("LN", 1, Some(1), math::fn_ln);
        self.add("LOG", 1, Some(2), math::fn_log);
        self.add("LOG10", 1, Some(1), math::fn_log10);
        self.add("FACT", 1, Some(1), math::fn_fact);
        self.add("PI", 0, Some(0), math::fn_pi);
        self.add("SIN", 1, Some(1), math::fn_sin);
        self.add("COS", 1, Some(1), math::fn_cos);
        self.add("TAN", 1, Some(1), math::fn_tan);
        self.add("ASIN", 1, Some(1), math::fn_asin);
        self.add("ACOS", 1, Some(1), math::fn_acos);
        self.add("ATAN", 1, Some(1), math::fn_atan);
        self.add("ATAN2", 2, Some(2), math::fn_atan2);
        self.add("DEGREES", 1, Some(1), math::fn_degrees);
        self.add("RADIANS", 1, Some(1), math::fn_radians);

        // RAND (volatile)
        self.register(FunctionDef::new("RAND", 0, Some(0), math::fn_rand).volatile());

        // RANDBETWEEN (volatile)
        self.register(
            FunctionDef::new("RANDBETWEEN", 2, Some(2), math::fn_randbetween).volatile(),
        );
    }

    fn register_logical_functions(&mut self) {
        // IF arrives here only when its jump markers are missing
        self.add("IF", 2, Some(3), logical::fn_if);
        self.add("AND", 1, None, logical::fn_and);
        self.add("OR", 1, None, logical::fn_or);
        self.add("XOR", 1, None, logical::fn_xor);
        self.add("NOT", 1, Some(1), logical::fn_not);
        self.add("TRUE", 0, Some(0), logical::fn_true);
        self.add("FALSE", 0, Some(0), logical::fn_false);
        self.add("IFERROR", 2, Some(2), logical::fn_iferror);
        self.add("IFNA", 2, Some(2), logical::fn_ifna);
    }

    fn register_info_functions(&mut self) {
        self.add("ISBLANK", 1, Some(1), info::fn_isblank);
        self.add("ISERROR", 1, Some(1), info::fn_iserror);
        self.add("ISERR", 1, Some(1), info::fn_iserr);
        self.add("ISNA", 1, Some(1), info::fn_isna);
        self.add("ISNUMBER", 1, Some(1), info::fn_isnumber);
        self.add("ISTEXT", 1, Some(1), info::fn_istext);
        self.add("ISNONTEXT", 1, Some(1), info::fn_isnontext);
        self.add("ISLOGICAL", 1, Some(1), info::fn_islogical);
        self.add("ISEVEN", 1, Some(1), info::fn_iseven);
        self.add("ISODD", 1, Some(1), info::fn_isodd);
        self.add("ISREF", 1, Some(1), info::fn_isref);
        self.add("ERROR.TYPE", 1, Some(1), info::fn_error_type);
        self.add("NA", 0, Some(0), info::fn_na);
        self.add("N", 1, Some(1), info::fn_n);
        self.add("TYPE", 1, Some(1), info::fn_type);
    }

    fn register_text_functions(&mut self) {
        self.add("LEN", 1, Some(1), text::fn_len);
        self.add("LEFT", 1, Some(2), text::fn_left);
        self.add("RIGHT", 1, Some(2), text::fn_right);
        self.add("MID", 3, Some(3), text::fn_mid);
        self.add("UPPER", 1, Some(1), text::fn_upper);
        self.add("LOWER", 1, Some(1), text::fn_lower);
        self.add("PROPER", 1, Some(1), text::fn_proper);
        self.add("TRIM", 1, Some(1), text::fn_trim);
        self.add("CLEAN", 1, Some(1), text::fn_clean);
        self.add("CONCATENATE", 1, None, text::fn_concatenate);
        self.add("REPT", 2, Some(2), text::fn_rept);
        self.add("EXACT", 2, Some(2), text::fn_exact);
        self.add("FIND", 2, Some(3), text::fn_find);
        self.add("SEARCH", 2, Some(3), text::fn_search);
        self.add("SUBSTITUTE", 3, Some(4), text::fn_substitute);
        self.add("REPLACE", 4, Some(4), text::fn_replace);
        self.add("VALUE", 1, Some(1), text::fn_value);
        self.add("T", 1, Some(1), text::fn_t);
        self.add("CHAR", 1, Some(1), text::fn_char);
        self.add("CODE", 1, Some(1), text::fn_code);
    }

    fn register_date_functions(&mut self) {
        self.add("DATE", 3, Some(3), date::fn_date);
        self.add("TIME", 3, Some(3), date::fn_time);
        self.add("YEAR", 1, Some(1), date::fn_year);
        self.add("MONTH", 1, Some(1), date::fn_month);
        self.add("DAY", 1, Some(1), date::fn_day);
        self.add("HOUR", 1, Some(1), date::fn_hour);
        self.add("MINUTE", 1, Some(1), date::fn_minute);
        self.add("SECOND", 1, Some(1), date::fn_second);
        self.add("WEEKDAY", 1, Some(2), date::fn_weekday);
        self.register(FunctionDef::new("NOW", 0, Some(0), date::fn_now).volatile());
        self.register(FunctionDef::new("TODAY", 0, Some(0), date::fn_today).volatile());
    }

    fn register_lookup_functions(&mut self) {
        self.add("ROW", 0, Some(1), lookup::fn_row);
        self.add("COLUMN", 0, Some(1), lookup::fn_column);
        self.add("ROWS", 1, Some(1), lookup::fn_rows);
        self.add("COLUMNS", 1, Some(1), lookup::fn_columns);
        self.add("CHOOSE", 2, None, lookup::fn_choose);
        self.add("INDEX", 2, Some(3), lookup::fn_index);
        self.add("MATCH", 2, Some(3), lookup::fn_match);
        self.add("VLOOKUP", 3, Some(4), lookup::fn_vlookup);
        self.add("HLOOKUP", 3, Some(4), lookup::fn_hlookup);
    }
}

// === Argument helpers ===

/// Turn an Excel error into an ordinary error value
pub(crate) fn excel(result: Result<FormulaValue, CellError>) -> FormulaResult<FormulaValue> {
    Ok(result.unwrap_or_else(FormulaValue::Error))
}

/// Scalar view of argument `i`; omitted arguments read as blank
///
/// An area argument collapses by implicit intersection with the evaluating
/// cell; an array constant contributes its top-left element.
pub(crate) fn scalar_arg(args: &[FormulaValue], i: usize, ctx: &EvaluationContext) -> FormulaValue {
    match args.get(i) {
        Some(v @ FormulaValue::Array(_)) => ctx.implicit_intersection(v, ctx.reference_origin(i)),
        Some(v) => v.clone(),
        None => FormulaValue::Empty,
    }
}

pub(crate) fn number_arg(
    args: &[FormulaValue],
    i: usize,
    ctx: &EvaluationContext,
) -> Result<f64, CellError> {
    scalar_arg(args, i, ctx).to_number()
}

/// Numeric argument with a default for when it is omitted entirely
pub(crate) fn opt_number_arg(
    args: &[FormulaValue],
    i: usize,
    ctx: &EvaluationContext,
    default: f64,
) -> Result<f64, CellError> {
    if i >= args.len() {
        Ok(default)
    } else {
        number_arg(args, i, ctx)
    }
}

pub(crate) fn text_arg(
    args: &[FormulaValue],
    i: usize,
    ctx: &EvaluationContext,
) -> Result<String, CellError> {
    scalar_arg(args, i, ctx).to_text()
}

pub(crate) fn bool_arg(
    args: &[FormulaValue],
    i: usize,
    ctx: &EvaluationContext,
) -> Result<bool, CellError> {
    scalar_arg(args, i, ctx).to_bool()
}

/// How aggregate functions treat values that are not numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collect {
    /// Text and booleans inside references are skipped (SUM, AVERAGE)
    NumbersOnly,
    /// Text counts as 0 and booleans as 1/0 (AVERAGEA, MAXA)
    AllValues,
}

/// Numbers of all arguments in order, flattening arrays row by row
///
/// Values typed directly into the call are coerced (`SUM("3", TRUE)` is 4);
/// values read through references follow `mode`. The first error wins.
pub(crate) fn collect_numbers(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    mode: Collect,
) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let from_reference = ctx.reference_origin(i).is_some();
        match arg {
            FormulaValue::Array(_) => {
                for value in arg.flatten() {
                    match value {
                        FormulaValue::Number(n) => out.push(*n),
                        FormulaValue::Error(e) => return Err(*e),
                        FormulaValue::Boolean(b) if mode == Collect::AllValues => {
                            out.push(if *b { 1.0 } else { 0.0 })
                        }
                        FormulaValue::String(_) if mode == Collect::AllValues => out.push(0.0),
                        _ => {}
                    }
                }
            }
            FormulaValue::Number(n) => out.push(*n),
            FormulaValue::Error(e) => return Err(*e),
            FormulaValue::Boolean(b) => {
                if !from_reference || mode == Collect::AllValues {
                    out.push(if *b { 1.0 } else { 0.0 });
                }
            }
            FormulaValue::String(s) => {
                if !from_reference {
                    out.push(parse_numeric_text(s).ok_or(CellError::Value)?);
                } else if mode == Collect::AllValues {
                    out.push(0.0);
                }
            }
            FormulaValue::Empty => {}
        }
    }
    Ok(out)
}
