//! Math and statistical functions

use rand::Rng;
use xlcalc_core::CellError;

use super::{collect_numbers, excel, number_arg, opt_number_arg, Collect};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;

fn numbers(args: &[FormulaValue], ctx: &EvaluationContext) -> Result<Vec<f64>, CellError> {
    collect_numbers(args, ctx, Collect::NumbersOnly)
}

/// Apply `f` to one numeric argument, mapping NaN/infinite results to #NUM!
fn unary(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    f: impl FnOnce(f64) -> f64,
) -> FormulaResult<FormulaValue> {
    excel(number_arg(args, 0, ctx).and_then(|n| finite(f(n))))
}

fn finite(n: f64) -> Result<FormulaValue, CellError> {
    if n.is_finite() {
        Ok(FormulaValue::Number(n))
    } else {
        Err(CellError::Num)
    }
}

/// SUM function
pub fn fn_sum(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).map(|ns| FormulaValue::Number(ns.iter().sum())))
}

/// AVERAGE function
pub fn fn_average(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| mean(&ns).map(FormulaValue::Number)))
}

/// AVERAGEA function: text in references counts as 0
pub fn fn_averagea(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(
        collect_numbers(args, ctx, Collect::AllValues)
            .and_then(|ns| mean(&ns).map(FormulaValue::Number)),
    )
}

fn mean(ns: &[f64]) -> Result<f64, CellError> {
    if ns.is_empty() {
        Err(CellError::Div0)
    } else {
        Ok(ns.iter().sum::<f64>() / ns.len() as f64)
    }
}

fn min_of(ns: Vec<f64>) -> FormulaValue {
    FormulaValue::Number(ns.into_iter().reduce(f64::min).unwrap_or(0.0))
}

fn max_of(ns: Vec<f64>) -> FormulaValue {
    FormulaValue::Number(ns.into_iter().reduce(f64::max).unwrap_or(0.0))
}

/// MIN function
pub fn fn_min(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).map(min_of))
}

pub fn fn_mina(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(collect_numbers(args, ctx, Collect::AllValues).map(min_of))
}

/// MAX function
pub fn fn_max(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).map(max_of))
}

pub fn fn_maxa(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(collect_numbers(args, ctx, Collect::AllValues).map(max_of))
}

/// COUNT function: numbers only, errors are skipped rather than propagated
pub fn fn_count(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0;

    for (i, arg) in args.iter().enumerate() {
        let from_reference = ctx.reference_origin(i).is_some();
        match arg {
            FormulaValue::Array(_) => {
                count += arg
                    .flatten()
                    .filter(|v| matches!(v, FormulaValue::Number(_)))
                    .count();
            }
            FormulaValue::Number(_) => count += 1,
            FormulaValue::Boolean(_) if !from_reference => count += 1,
            FormulaValue::String(s)
                if !from_reference && crate::value::parse_numeric_text(s).is_some() =>
            {
                count += 1
            }
            _ => {} // Don't count non-numeric
        }
    }

    Ok(FormulaValue::Number(count as f64))
}

/// COUNTA function: every non-blank value
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args
        .iter()
        .flat_map(|arg| arg.flatten())
        .filter(|v| !matches!(v, FormulaValue::Empty))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTBLANK(range)
pub fn fn_countblank(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let arg = match args.first() {
        Some(arg) => arg,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let mut blanks = arg
        .flatten()
        .filter(|v| match v {
            FormulaValue::Empty => true,
            FormulaValue::String(s) => s.is_empty(),
            _ => false,
        })
        .count() as u64;
    // cells of the reference beyond the populated extent are blank too
    if let Some(origin) = ctx.reference_origin(0) {
        let (rows, cols) = arg.dimensions();
        let populated = rows as u64 * cols as u64;
        blanks += origin.range.cell_count().saturating_sub(populated);
    }
    Ok(FormulaValue::Number(blanks as f64))
}

/// PRODUCT function
pub fn fn_product(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| {
        if ns.is_empty() {
            return Ok(FormulaValue::Number(0.0));
        }
        finite(ns.iter().product())
    }))
}

pub fn fn_sumsq(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| finite(ns.iter().map(|n| n * n).sum())))
}

/// MEDIAN function
pub fn fn_median(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|mut ns| {
        if ns.is_empty() {
            return Err(CellError::Num);
        }
        ns.sort_by(|a, b| a.total_cmp(b));
        let mid = ns.len() / 2;
        let median = if ns.len() % 2 == 0 {
            (ns[mid - 1] + ns[mid]) / 2.0
        } else {
            ns[mid]
        };
        Ok(FormulaValue::Number(median))
    }))
}

fn kth(args: &[FormulaValue], ctx: &EvaluationContext, largest: bool) -> FormulaResult<FormulaValue> {
    let values = match args.first() {
        Some(v) => v.clone(),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    excel((|| {
        let mut ns = collect_numbers(&[values], &EvaluationContext::simple(), Collect::NumbersOnly)?;
        let k = number_arg(args, 1, ctx)?.ceil();
        if k < 1.0 || k as usize > ns.len() {
            return Err(CellError::Num);
        }
        ns.sort_by(|a, b| a.total_cmp(b));
        if largest {
            ns.reverse();
        }
        Ok(FormulaValue::Number(ns[k as usize - 1]))
    })())
}

/// LARGE(array, k)
pub fn fn_large(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    kth(args, ctx, true)
}

/// SMALL(array, k)
pub fn fn_small(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    kth(args, ctx, false)
}

fn variance(ns: &[f64], sample: bool) -> Result<f64, CellError> {
    let n = ns.len();
    if n == 0 || (sample && n < 2) {
        return Err(CellError::Div0);
    }
    let m = ns.iter().sum::<f64>() / n as f64;
    let ss: f64 = ns.iter().map(|x| (x - m) * (x - m)).sum();
    Ok(ss / if sample { (n - 1) as f64 } else { n as f64 })
}

pub fn fn_var(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| variance(&ns, true).map(FormulaValue::Number)))
}

pub fn fn_varp(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| variance(&ns, false).map(FormulaValue::Number)))
}

pub fn fn_stdev(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| variance(&ns, true).map(|v| v.sqrt().into())))
}

pub fn fn_stdevp(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(numbers(args, ctx).and_then(|ns| variance(&ns, false).map(|v| v.sqrt().into())))
}

/// SUMPRODUCT(array1, [array2], ...)
pub fn fn_sumproduct(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let dims = match args.first() {
        Some(first) => first.dimensions(),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    if args.iter().any(|a| a.dimensions() != dims) {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let mut total = 0.0;
    for r in 0..dims.0 {
        for c in 0..dims.1 {
            let mut product = 1.0;
            for arg in args {
                match arg.element(r, c) {
                    FormulaValue::Number(n) => product *= n,
                    FormulaValue::Error(e) => return Ok(FormulaValue::Error(e)),
                    _ => product = 0.0,
                }
            }
            total += product;
        }
    }
    Ok(FormulaValue::Number(total))
}

/// RAND() - Returns a random number between 0 and 1
pub fn fn_rand(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut rng = rand::thread_rng();
    Ok(FormulaValue::Number(rng.gen::<f64>()))
}

/// RANDBETWEEN(bottom, top) - Returns a random integer between bottom and top (inclusive)
pub fn fn_randbetween(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let bottom = number_arg(args, 0, ctx)?.ceil() as i64;
        let top = number_arg(args, 1, ctx)?.floor() as i64;
        if bottom > top {
            return Err(CellError::Num);
        }
        let mut rng = rand::thread_rng();
        Ok(FormulaValue::Number(rng.gen_range(bottom..=top) as f64))
    })())
}

/// ABS(number)
pub fn fn_abs(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::abs)
}

/// SIGN(number): 1, -1 or 0
pub fn fn_sign(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| {
        if n > 0.0 {
            1.0
        } else if n < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

/// INT(number) - rounds toward negative infinity
pub fn fn_int(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::floor)
}

/// TRUNC(number, [num_digits]) - rounds toward zero
pub fn fn_trunc(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let digits = opt_number_arg(args, 1, ctx, 0.0)?.trunc() as i32;
        let m = 10_f64.powi(digits);
        finite((number * m).trunc() / m)
    })())
}

/// Round half away from zero at `digits` decimal places
fn round_half_away(number: f64, digits: i32) -> f64 {
    let m = 10_f64.powi(digits);
    // the small bias absorbs binary representation error (2.675 -> 2.68)
    let scaled = number.abs() * m;
    let rounded = (scaled + 0.5 + scaled * f64::EPSILON * 4.0).floor();
    rounded.copysign(number) / m
}

/// ROUND(number, num_digits)
pub fn fn_round(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let digits = number_arg(args, 1, ctx)?.trunc() as i32;
        finite(round_half_away(number, digits))
    })())
}

/// ROUNDUP(number, num_digits) - away from zero
pub fn fn_roundup(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let m = 10_f64.powi(number_arg(args, 1, ctx)?.trunc() as i32);
        let scaled = (number.abs() * m * (1.0 - f64::EPSILON)).ceil();
        finite(scaled.copysign(number) / m)
    })())
}

/// ROUNDDOWN(number, num_digits) - toward zero
pub fn fn_rounddown(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let m = 10_f64.powi(number_arg(args, 1, ctx)?.trunc() as i32);
        finite((number * m).trunc() / m)
    })())
}

fn to_multiple(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    round: fn(f64) -> f64,
) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let significance = number_arg(args, 1, ctx)?;
        if significance == 0.0 {
            return Ok(FormulaValue::Number(0.0));
        }
        if number > 0.0 && significance < 0.0 {
            return Err(CellError::Num);
        }
        finite(round(number / significance) * significance)
    })())
}

/// CEILING(number, significance)
pub fn fn_ceiling(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    to_multiple(args, ctx, f64::ceil)
}

/// FLOOR(number, significance)
pub fn fn_floor(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    to_multiple(args, ctx, f64::floor)
}

/// EVEN(number) - away from zero to the next even integer
pub fn fn_even(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| ((n.abs() / 2.0).ceil() * 2.0).copysign(n))
}

/// ODD(number) - away from zero to the next odd integer
pub fn fn_odd(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| {
        let a = n.abs().ceil();
        let odd = if a % 2.0 == 0.0 { a + 1.0 } else { a };
        odd.copysign(if n == 0.0 { 1.0 } else { n })
    })
}

/// MOD(number, divisor) - result takes the sign of the divisor
pub fn fn_mod(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let divisor = number_arg(args, 1, ctx)?;
        if divisor == 0.0 {
            return Err(CellError::Div0);
        }
        finite(number - divisor * (number / divisor).floor())
    })())
}

/// SQRT(number)
pub fn fn_sqrt(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::sqrt)
}

/// POWER(number, power)
pub fn fn_power(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let base = number_arg(args, 0, ctx)?;
        let exponent = number_arg(args, 1, ctx)?;
        power(base, exponent)
    })())
}

/// `^` semantics shared with the operator
pub(crate) fn power(base: f64, exponent: f64) -> Result<FormulaValue, CellError> {
    if base == 0.0 && exponent == 0.0 {
        return Err(CellError::Num);
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(CellError::Div0);
    }
    finite(base.powf(exponent))
}

pub fn fn_exp(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::exp)
}

/// LN(number)
pub fn fn_ln(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| if n > 0.0 { n.ln() } else { f64::NAN })
}

/// LOG(number, [base]) - default base is 10
pub fn fn_log(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let number = number_arg(args, 0, ctx)?;
        let base = opt_number_arg(args, 1, ctx, 10.0)?;
        if number <= 0.0 || base <= 0.0 {
            return Err(CellError::Num);
        }
        if base == 1.0 {
            return Err(CellError::Div0);
        }
        finite(number.ln() / base.ln())
    })())
}

pub fn fn_log10(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| if n > 0.0 { n.log10() } else { f64::NAN })
}

/// FACT(number)
pub fn fn_fact(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, |n| {
        if n < 0.0 {
            return f64::NAN;
        }
        (1..=n.trunc() as u64).fold(1.0, |acc, k| acc * k as f64)
    })
}

pub fn fn_pi(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(std::f64::consts::PI))
}

pub fn fn_sin(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::sin)
}

pub fn fn_cos(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::cos)
}

pub fn fn_tan(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::tan)
}

pub fn fn_asin(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::asin)
}

pub fn fn_acos(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::acos)
}

pub fn fn_atan(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::atan)
}

/// ATAN2(x, y) - note Excel's argument order
pub fn fn_atan2(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let x = number_arg(args, 0, ctx)?;
        let y = number_arg(args, 1, ctx)?;
        if x == 0.0 && y == 0.0 {
            return Err(CellError::Div0);
        }
        finite(y.atan2(x))
    })())
}

pub fn fn_degrees(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::to_degrees)
}

pub fn fn_radians(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, ctx, f64::to_radians)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: super::super::FunctionImpl, args: Vec<FormulaValue>) -> FormulaValue {
        f(&args, &EvaluationContext::simple()).unwrap()
    }

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    fn column(values: &[f64]) -> FormulaValue {
        FormulaValue::Array(values.iter().map(|v| vec![n(*v)]).collect())
    }

    #[test]
    fn test_sum_and_average() {
        assert_eq!(call(fn_sum, vec![n(1.0), column(&[2.0, 3.0])]), n(6.0));
        assert_eq!(call(fn_average, vec![column(&[11.0, 22.0, 33.0])]), n(22.0));
        assert_eq!(
            call(fn_average, vec![FormulaValue::Array(vec![])]),
            FormulaValue::Error(CellError::Div0)
        );
        assert_eq!(
            call(fn_sum, vec![n(1.0), FormulaValue::Error(CellError::Na)]),
            FormulaValue::Error(CellError::Na)
        );
    }

    #[test]
    fn test_min_max_count() {
        let data = FormulaValue::Array(vec![vec![
            n(3.0),
            FormulaValue::String("x".into()),
            n(-1.0),
            FormulaValue::Empty,
        ]]);
        assert_eq!(call(fn_min, vec![data.clone()]), n(-1.0));
        assert_eq!(call(fn_max, vec![data.clone()]), n(3.0));
        assert_eq!(call(fn_count, vec![data.clone()]), n(2.0));
        assert_eq!(call(fn_counta, vec![data]), n(3.0));
        assert_eq!(call(fn_max, vec![FormulaValue::Array(vec![])]), n(0.0));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call(fn_round, vec![n(2.5), n(0.0)]), n(3.0));
        assert_eq!(call(fn_round, vec![n(-2.5), n(0.0)]), n(-3.0));
        assert_eq!(call(fn_round, vec![n(2.675), n(2.0)]), n(2.68));
        assert_eq!(call(fn_round, vec![n(1234.0), n(-2.0)]), n(1200.0));
        assert_eq!(call(fn_roundup, vec![n(3.2), n(0.0)]), n(4.0));
        assert_eq!(call(fn_rounddown, vec![n(-3.9), n(0.0)]), n(-3.0));
        assert_eq!(call(fn_trunc, vec![n(8.91)]), n(8.0));
        assert_eq!(call(fn_int, vec![n(-8.1)]), n(-9.0));
        assert_eq!(call(fn_even, vec![n(1.5)]), n(2.0));
        assert_eq!(call(fn_odd, vec![n(2.0)]), n(3.0));
        assert_eq!(call(fn_ceiling, vec![n(2.5), n(1.0)]), n(3.0));
        assert_eq!(call(fn_floor, vec![n(2.5), n(1.0)]), n(2.0));
    }

    #[test]
    fn test_mod_and_domain_errors() {
        assert_eq!(call(fn_mod, vec![n(-3.0), n(2.0)]), n(1.0));
        assert_eq!(call(fn_mod, vec![n(3.0), n(-2.0)]), n(-1.0));
        assert_eq!(
            call(fn_mod, vec![n(1.0), n(0.0)]),
            FormulaValue::Error(CellError::Div0)
        );
        assert_eq!(call(fn_sqrt, vec![n(-1.0)]), FormulaValue::Error(CellError::Num));
        assert_eq!(call(fn_ln, vec![n(0.0)]), FormulaValue::Error(CellError::Num));
        assert_eq!(call(fn_log, vec![n(100.0)]), n(2.0));
        assert_eq!(
            call(fn_abs, vec![FormulaValue::String("abc".into())]),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(call(fn_abs, vec![FormulaValue::String("-4".into())]), n(4.0));
    }

    #[test]
    fn test_statistics() {
        let data = column(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(call(fn_stdevp, vec![data.clone()]), n(2.0));
        assert_eq!(call(fn_median, vec![data.clone()]), n(4.5));
        assert_eq!(call(fn_large, vec![data.clone(), n(1.0)]), n(9.0));
        assert_eq!(call(fn_small, vec![data.clone(), n(2.0)]), n(4.0));
        assert_eq!(
            call(fn_small, vec![data, n(9.0)]),
            FormulaValue::Error(CellError::Num)
        );
        assert_eq!(
            call(fn_sumproduct, vec![column(&[1.0, 2.0]), column(&[3.0, 4.0])]),
            n(11.0)
        );
        assert_eq!(call(fn_product, vec![n(2.0), column(&[3.0, 4.0])]), n(24.0));
    }

    #[test]
    fn test_randbetween_bounds() {
        for _ in 0..20 {
            match call(fn_randbetween, vec![n(1.0), n(3.0)]) {
                FormulaValue::Number(v) => assert!((1.0..=3.0).contains(&v) && v.fract() == 0.0),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(
            call(fn_randbetween, vec![n(5.0), n(1.0)]),
            FormulaValue::Error(CellError::Num)
        );
    }
}
