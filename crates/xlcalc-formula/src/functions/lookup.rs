//! Lookup and reference functions

use std::cmp::Ordering;

use xlcalc_core::CellError;

use super::text::{compile_pattern, match_whole};
use super::{excel, number_arg, opt_number_arg, scalar_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{compare_values, FormulaValue};

/// (rows, cols) of argument `i`, measured on the reference when it is one
///
/// Reference values are clipped to the populated extent, so the reference
/// itself is the authority on shape.
fn shape(args: &[FormulaValue], i: usize, ctx: &EvaluationContext) -> (usize, usize) {
    match ctx.reference_origin(i) {
        Some(origin) => (origin.range.row_count() as usize, origin.range.col_count() as usize),
        None => args.get(i).map_or((0, 0), FormulaValue::dimensions),
    }
}

/// Element (r, c) of a value; cells past a clipped array are blank
fn cell(value: &FormulaValue, r: usize, c: usize) -> FormulaValue {
    match value {
        FormulaValue::Array(rows) => rows
            .get(r)
            .and_then(|row| row.get(c))
            .cloned()
            .unwrap_or(FormulaValue::Empty),
        v if r == 0 && c == 0 => v.clone(),
        _ => FormulaValue::Empty,
    }
}

/// ROW([reference])
pub fn fn_row(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args.is_empty() {
        return Ok(FormulaValue::Number(ctx.current_row as f64 + 1.0));
    }
    Ok(match ctx.reference_origin(0) {
        Some(origin) => FormulaValue::Number(origin.range.start.row as f64 + 1.0),
        None => FormulaValue::Error(CellError::Value),
    })
}

/// COLUMN([reference])
pub fn fn_column(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args.is_empty() {
        return Ok(FormulaValue::Number(ctx.current_col as f64 + 1.0));
    }
    Ok(match ctx.reference_origin(0) {
        Some(origin) => FormulaValue::Number(origin.range.start.col as f64 + 1.0),
        None => FormulaValue::Error(CellError::Value),
    })
}

/// ROWS(array)
pub fn fn_rows(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if let Some(FormulaValue::Error(e)) = args.first() {
        return Ok(FormulaValue::Error(*e));
    }
    Ok(FormulaValue::Number(shape(args, 0, ctx).0 as f64))
}

/// COLUMNS(array)
pub fn fn_columns(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if let Some(FormulaValue::Error(e)) = args.first() {
        return Ok(FormulaValue::Error(*e));
    }
    Ok(FormulaValue::Number(shape(args, 0, ctx).1 as f64))
}

/// CHOOSE(index_num, value1, [value2], ...)
pub fn fn_choose(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(number_arg(args, 0, ctx).and_then(|n| {
        let index = n.trunc();
        if index < 1.0 || index as usize >= args.len() {
            return Err(CellError::Value);
        }
        Ok(args[index as usize].clone())
    }))
}

/// INDEX(array, row_num, [column_num])
///
/// A zero row or column selects the whole column or row. With a single index
/// into a one-row array the index counts columns.
pub fn fn_index(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let array = match args.first() {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => v,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    excel((|| {
        let (height, width) = shape(args, 0, ctx);
        let mut row = number_arg(args, 1, ctx)?.trunc();
        let mut col = opt_number_arg(args, 2, ctx, 0.0)?.trunc();
        if args.len() < 3 && height == 1 {
            col = row;
            row = 1.0;
        } else if args.len() < 3 && width == 1 {
            col = 1.0;
        }
        if row < 0.0 || col < 0.0 || row as usize > height || col as usize > width {
            return Err(CellError::Ref);
        }
        let (row, col) = (row as usize, col as usize);
        Ok(match (row, col) {
            (0, 0) => array.clone(),
            (0, c) => FormulaValue::Array((0..height).map(|r| vec![cell(array, r, c - 1)]).collect()),
            (r, 0) => FormulaValue::Array(vec![(0..width).map(|c| cell(array, r - 1, c)).collect()]),
            (r, c) => cell(array, r - 1, c - 1),
        })
    })())
}

/// Exact equality used by lookups: same type, text case-insensitive with wildcards
fn lookup_equals(needle: &FormulaValue, candidate: &FormulaValue) -> bool {
    match (needle, candidate) {
        (FormulaValue::String(pattern), FormulaValue::String(text)) => {
            let pattern = compile_pattern(&pattern.to_lowercase());
            let text: Vec<char> = text.to_lowercase().chars().collect();
            match_whole(&pattern, &text)
        }
        (FormulaValue::Number(a), FormulaValue::Number(b)) => a == b,
        (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => a == b,
        _ => false,
    }
}

fn same_type(a: &FormulaValue, b: &FormulaValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Position of `needle` in `candidates`
///
/// `mode` 0 is an exact match; 1 finds the last value <= needle and -1 the
/// last value >= needle, both assuming the values are sorted accordingly.
fn find_position(needle: &FormulaValue, candidates: &[FormulaValue], mode: i32) -> Option<usize> {
    if mode == 0 {
        return candidates.iter().position(|c| lookup_equals(needle, c));
    }
    let wanted = if mode > 0 { Ordering::Greater } else { Ordering::Less };
    let mut found = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if !same_type(needle, candidate) {
            continue;
        }
        if compare_values(candidate, needle) == wanted {
            break;
        }
        found = Some(i);
    }
    found
}

/// MATCH(lookup_value, lookup_array, [match_type])
pub fn fn_match(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let needle = scalar_arg(args, 0, ctx);
        if let FormulaValue::Error(e) = needle {
            return Err(e);
        }
        let mode = opt_number_arg(args, 2, ctx, 1.0)?;
        let mode = if mode > 0.0 { 1 } else if mode < 0.0 { -1 } else { 0 };
        let array = args.get(1).ok_or(CellError::Na)?;
        let (height, width) = array.dimensions();
        if height > 1 && width > 1 {
            return Err(CellError::Na);
        }
        let candidates: Vec<FormulaValue> = array.flatten().cloned().collect();
        find_position(&needle, &candidates, mode)
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Na)
    })())
}

/// Shared body of VLOOKUP and HLOOKUP; `vertical` searches the first column
fn table_lookup(args: &[FormulaValue], ctx: &EvaluationContext, vertical: bool) -> FormulaResult<FormulaValue> {
    excel((|| {
        let needle = scalar_arg(args, 0, ctx);
        if let FormulaValue::Error(e) = needle {
            return Err(e);
        }
        let table = args.get(1).ok_or(CellError::Value)?;
        if let FormulaValue::Error(e) = table {
            return Err(*e);
        }
        let index = number_arg(args, 2, ctx)?.trunc();
        let approximate = if args.len() > 3 {
            scalar_arg(args, 3, ctx).to_bool()?
        } else {
            true
        };
        let (height, width) = shape(args, 1, ctx);
        let (lines, across) = if vertical { (height, width) } else { (width, height) };
        if index < 1.0 {
            return Err(CellError::Value);
        }
        if index as usize > across {
            return Err(CellError::Ref);
        }
        let at = |line: usize, offset: usize| {
            if vertical {
                cell(table, line, offset)
            } else {
                cell(table, offset, line)
            }
        };
        let keys: Vec<FormulaValue> = (0..lines).map(|line| at(line, 0)).collect();
        let line = find_position(&needle, &keys, if approximate { 1 } else { 0 }).ok_or(CellError::Na)?;
        Ok(at(line, index as usize - 1))
    })())
}

/// VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])
pub fn fn_vlookup(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    table_lookup(args, ctx, true)
}

/// HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])
pub fn fn_hlookup(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    table_lookup(args, ctx, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(f: super::super::FunctionImpl, args: Vec<FormulaValue>) -> FormulaValue {
        f(&args, &EvaluationContext::simple()).unwrap()
    }

    fn table() -> FormulaValue {
        FormulaValue::Array(vec![
            vec![1.0.into(), "one".into()],
            vec![2.0.into(), "two".into()],
            vec![5.0.into(), "five".into()],
        ])
    }

    #[test]
    fn test_vlookup() {
        assert_eq!(call(fn_vlookup, vec![2.0.into(), table(), 2.0.into()]), "two".into());
        assert_eq!(call(fn_vlookup, vec![4.0.into(), table(), 2.0.into()]), "two".into());
        assert_eq!(
            call(fn_vlookup, vec![4.0.into(), table(), 2.0.into(), false.into()]),
            CellError::Na.into()
        );
        assert_eq!(
            call(fn_vlookup, vec![0.0.into(), table(), 2.0.into()]),
            CellError::Na.into()
        );
        assert_eq!(
            call(fn_vlookup, vec![1.0.into(), table(), 3.0.into()]),
            CellError::Ref.into()
        );
    }

    #[test]
    fn test_hlookup() {
        let row_table = FormulaValue::Array(vec![
            vec!["a".into(), "b".into()],
            vec![10.0.into(), 20.0.into()],
        ]);
        assert_eq!(
            call(fn_hlookup, vec!["B".into(), row_table, 2.0.into(), false.into()]),
            20.0.into()
        );
    }

    #[test]
    fn test_match() {
        let column = FormulaValue::Array(vec![
            vec!["apple".into()],
            vec!["banana".into()],
            vec!["cherry".into()],
        ]);
        assert_eq!(call(fn_match, vec!["BANANA".into(), column.clone(), 0.0.into()]), 2.0.into());
        assert_eq!(call(fn_match, vec!["c*".into(), column.clone(), 0.0.into()]), 3.0.into());
        assert_eq!(call(fn_match, vec!["blueberry".into(), column.clone()]), 2.0.into());
        assert_eq!(call(fn_match, vec!["zzz".into(), column, 0.0.into()]), CellError::Na.into());
        assert_eq!(call(fn_match, vec![1.0.into(), table()]), CellError::Na.into());
    }

    #[test]
    fn test_index_and_choose() {
        assert_eq!(call(fn_index, vec![table(), 3.0.into(), 2.0.into()]), "five".into());
        assert_eq!(
            call(fn_index, vec![table(), 0.0.into(), 1.0.into()]),
            FormulaValue::Array(vec![vec![1.0.into()], vec![2.0.into()], vec![5.0.into()]])
        );
        assert_eq!(call(fn_index, vec![table(), 4.0.into(), 1.0.into()]), CellError::Ref.into());
        let row = FormulaValue::Array(vec![vec![7.0.into(), 8.0.into()]]);
        assert_eq!(call(fn_index, vec![row, 2.0.into()]), 8.0.into());
        assert_eq!(call(fn_choose, vec![2.0.into(), "a".into(), "b".into()]), "b".into());
        assert_eq!(call(fn_choose, vec![3.0.into(), "a".into(), "b".into()]), CellError::Value.into());
    }

    #[test]
    fn test_shape_functions() {
        assert_eq!(call(fn_rows, vec![table()]), 3.0.into());
        assert_eq!(call(fn_columns, vec![table()]), 2.0.into());
        assert_eq!(call(fn_row, vec![]), 1.0.into());
        assert_eq!(call(fn_column, vec![5.0.into()]), CellError::Value.into());
    }
}
