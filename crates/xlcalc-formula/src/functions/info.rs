//! Information functions (IS*, TYPE, N, NA, ERROR.TYPE)

use xlcalc_core::CellError;

use super::{excel, scalar_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;

fn is(args: &[FormulaValue], ctx: &EvaluationContext, test: fn(&FormulaValue) -> bool) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(test(&scalar_arg(args, 0, ctx))))
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::Empty))
}

pub fn fn_iserror(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, FormulaValue::is_error)
}

/// ISERR(value) - any error except #N/A
pub fn fn_iserr(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::Error(e) if *e != CellError::Na))
}

pub fn fn_isna(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::Error(CellError::Na)))
}

pub fn fn_isnumber(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::Number(_)))
}

pub fn fn_istext(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::String(_)))
}

pub fn fn_isnontext(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| !matches!(v, FormulaValue::String(_)))
}

pub fn fn_islogical(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, ctx, |v| matches!(v, FormulaValue::Boolean(_)))
}

fn parity(args: &[FormulaValue], ctx: &EvaluationContext, even: bool) -> FormulaResult<FormulaValue> {
    let value = scalar_arg(args, 0, ctx);
    if let FormulaValue::Boolean(_) = value {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    excel(value.to_number().map(|n| {
        let is_even = n.trunc() % 2.0 == 0.0;
        FormulaValue::Boolean(is_even == even)
    }))
}

/// ISEVEN(number)
pub fn fn_iseven(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    parity(args, ctx, true)
}

/// ISODD(number)
pub fn fn_isodd(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    parity(args, ctx, false)
}

/// ISREF(value) - TRUE when the argument was written as a reference
pub fn fn_isref(_args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(ctx.reference_origin(0).is_some()))
}

/// ERROR.TYPE(error_val)
pub fn fn_error_type(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match scalar_arg(args, 0, ctx) {
        FormulaValue::Error(e) => Ok(FormulaValue::Number(e.type_number() as f64)),
        _ => Ok(FormulaValue::Error(CellError::Na)),
    }
}

/// NA() - Returns the #N/A error value
pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

/// N(value)
pub fn fn_n(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match scalar_arg(args, 0, ctx) {
        FormulaValue::Number(n) => FormulaValue::Number(n),
        FormulaValue::Boolean(b) => FormulaValue::Number(if b { 1.0 } else { 0.0 }),
        FormulaValue::Error(e) => FormulaValue::Error(e),
        _ => FormulaValue::Number(0.0),
    })
}

/// TYPE(value): 1 number, 2 text, 4 logical, 16 error, 64 array
pub fn fn_type(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let code = match args.first() {
        Some(FormulaValue::Array(_)) if ctx.reference_origin(0).is_none() => 64.0,
        _ => match scalar_arg(args, 0, ctx) {
            FormulaValue::Number(_) | FormulaValue::Empty => 1.0,
            FormulaValue::String(_) => 2.0,
            FormulaValue::Boolean(_) => 4.0,
            FormulaValue::Error(_) => 16.0,
            FormulaValue::Array(_) => 64.0,
        },
    };
    Ok(FormulaValue::Number(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: super::super::FunctionImpl, args: Vec<FormulaValue>) -> FormulaValue {
        f(&args, &EvaluationContext::simple()).unwrap()
    }

    #[test]
    fn test_is_functions() {
        assert_eq!(call(fn_isblank, vec![FormulaValue::Empty]), true.into());
        assert_eq!(call(fn_isblank, vec!["".into()]), false.into());
        assert_eq!(call(fn_iserr, vec![CellError::Na.into()]), false.into());
        assert_eq!(call(fn_iserror, vec![CellError::Na.into()]), true.into());
        assert_eq!(call(fn_isna, vec![CellError::Na.into()]), true.into());
        assert_eq!(call(fn_isnumber, vec!["1".into()]), false.into());
        assert_eq!(call(fn_istext, vec!["1".into()]), true.into());
        assert_eq!(call(fn_isnontext, vec![1.0.into()]), true.into());
        assert_eq!(call(fn_islogical, vec![false.into()]), true.into());
        assert_eq!(call(fn_iseven, vec![(-2.5).into()]), true.into());
        assert_eq!(call(fn_isodd, vec![3.0.into()]), true.into());
        assert_eq!(call(fn_isref, vec![1.0.into()]), false.into());
    }

    #[test]
    fn test_type_and_error_type() {
        assert_eq!(call(fn_type, vec![1.0.into()]), 1.0.into());
        assert_eq!(call(fn_type, vec!["a".into()]), 2.0.into());
        assert_eq!(call(fn_type, vec![true.into()]), 4.0.into());
        assert_eq!(call(fn_type, vec![CellError::Ref.into()]), 16.0.into());
        assert_eq!(
            call(fn_type, vec![FormulaValue::Array(vec![vec![1.0.into()]])]),
            64.0.into()
        );
        assert_eq!(call(fn_error_type, vec![CellError::Div0.into()]), 2.0.into());
        assert_eq!(call(fn_error_type, vec![1.0.into()]), CellError::Na.into());
        assert_eq!(call(fn_n, vec![true.into()]), 1.0.into());
        assert_eq!(call(fn_n, vec!["7".into()]), 0.0.into());
        assert_eq!(call(fn_na, vec![]), CellError::Na.into());
    }
}
