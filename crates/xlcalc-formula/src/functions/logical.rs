//! Logical functions

use xlcalc_core::CellError;

use super::{excel, scalar_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;

/// IF function
pub fn fn_if(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let condition = match scalar_arg(args, 0, ctx) {
        FormulaValue::Boolean(b) => b,
        FormulaValue::Number(n) => n != 0.0,
        FormulaValue::Empty => false,
        FormulaValue::Error(e) => return Ok(FormulaValue::Error(e)),
        other => match other.as_bool() {
            Some(b) => b,
            None => return Ok(FormulaValue::Error(CellError::Value)),
        },
    };

    if condition {
        Ok(args.get(1).cloned().unwrap_or(FormulaValue::Boolean(true)))
    } else {
        Ok(args.get(2).cloned().unwrap_or(FormulaValue::Boolean(false)))
    }
}

/// Fold every logical value in `args`
///
/// Text and blanks inside arrays are skipped; a direct text argument that
/// does not read as TRUE/FALSE is #VALUE!. No logical values at all is also
/// #VALUE!.
fn logicals(args: &[FormulaValue], ctx: &EvaluationContext) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        match arg {
            FormulaValue::Array(_) => {
                for cell in arg.flatten() {
                    match cell {
                        FormulaValue::Boolean(b) => out.push(*b),
                        FormulaValue::Number(n) => out.push(*n != 0.0),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Empty => {}
            FormulaValue::String(_) if ctx.reference_origin(i).is_some() => {}
            v => out.push(v.to_bool()?),
        }
    }
    if out.is_empty() {
        Err(CellError::Value)
    } else {
        Ok(out)
    }
}

/// AND function
pub fn fn_and(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(logicals(args, ctx).map(|bs| FormulaValue::Boolean(bs.iter().all(|b| *b))))
}

/// OR function
pub fn fn_or(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(logicals(args, ctx).map(|bs| FormulaValue::Boolean(bs.iter().any(|b| *b))))
}

/// XOR function: TRUE when an odd number of arguments are TRUE
pub fn fn_xor(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(logicals(args, ctx).map(|bs| {
        FormulaValue::Boolean(bs.iter().filter(|b| **b).count() % 2 == 1)
    }))
}

/// NOT function
pub fn fn_not(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(scalar_arg(args, 0, ctx).to_bool().map(|b| FormulaValue::Boolean(!b)))
}

pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

/// IFERROR(value, value_if_error) - Returns value_if_error if value is an error, otherwise returns value
pub fn fn_iferror(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match scalar_arg(args, 0, ctx) {
        FormulaValue::Error(_) => Ok(scalar_arg(args, 1, ctx)),
        FormulaValue::Empty => Ok(FormulaValue::Number(0.0)),
        value => Ok(value),
    }
}

/// IFNA(value, value_if_na) - like IFERROR but only catches #N/A
pub fn fn_ifna(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match scalar_arg(args, 0, ctx) {
        FormulaValue::Error(CellError::Na) => Ok(scalar_arg(args, 1, ctx)),
        FormulaValue::Empty => Ok(FormulaValue::Number(0.0)),
        value => Ok(value),
    }
}
