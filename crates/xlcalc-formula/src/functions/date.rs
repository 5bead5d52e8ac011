//! Date/time functions
//!
//! Dates are Excel serial numbers in the 1900 system: serial 1 is
//! 1900-01-01 and the fractional part is the time of day. The system keeps
//! Excel's historical "1900 leap year" bug, so serial 60 is the non-existent
//! 1900-02-29 and every later serial is one day ahead of the true count.

use chrono::{Datelike, Duration, Local, NaiveDate, Timelike};
use xlcalc_core::CellError;

use super::{excel, number_arg, opt_number_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;

/// Serial of 9999-12-31
const MAX_SERIAL: f64 = 2_958_465.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

fn epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 31)
}

/// Serial of a real calendar date
fn serial_from_date(date: NaiveDate) -> Option<i64> {
    let days = (date - epoch()?).num_days();
    // dates from 1900-03-01 on sit after the fictional leap day
    Some(if days >= 60 { days + 1 } else { days })
}

/// Calendar parts of a serial; (1900, 2, 29) for serial 60
fn date_from_serial(serial: i64) -> Option<(i32, u32, u32)> {
    if serial == 60 {
        return Some((1900, 2, 29));
    }
    if serial < 0 {
        return None;
    }
    let adjusted = if serial > 60 { serial - 1 } else { serial };
    // serial 0 reads as the day before 1900-01-01, shown by Excel as 1900-01-00
    if adjusted == 0 {
        return Some((1900, 1, 0));
    }
    let date = epoch()?.checked_add_signed(Duration::days(adjusted))?;
    Some((date.year(), date.month(), date.day()))
}

fn serial_arg(args: &[FormulaValue], ctx: &EvaluationContext) -> Result<f64, CellError> {
    let serial = number_arg(args, 0, ctx)?;
    if !(0.0..=MAX_SERIAL + 1.0).contains(&serial) {
        return Err(CellError::Num);
    }
    Ok(serial)
}

fn date_part(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    part: fn((i32, u32, u32)) -> f64,
) -> FormulaResult<FormulaValue> {
    excel(serial_arg(args, ctx).and_then(|serial| {
        date_from_serial(serial.floor() as i64)
            .map(|parts| FormulaValue::Number(part(parts)))
            .ok_or(CellError::Num)
    }))
}

/// Whole seconds into the day of a serial
fn seconds_of_day(serial: f64) -> i64 {
    ((serial.fract() * SECONDS_PER_DAY).round() as i64) % 86_400
}

/// DATE(year, month, day)
pub fn fn_date(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let mut year = number_arg(args, 0, ctx)?.trunc() as i64;
        let month = number_arg(args, 1, ctx)?.trunc() as i64;
        let day = number_arg(args, 2, ctx)?.trunc() as i64;

        // Excel: years 0..1899 are treated as 1900..3799
        if (0..1900).contains(&year) {
            year += 1900;
        }
        if !(0..=9999).contains(&year) {
            return Err(CellError::Num);
        }

        // month overflow/underflow rolls into the year
        let total_months = year * 12 + (month - 1);
        let norm_year = total_months.div_euclid(12) as i32;
        let norm_month = total_months.rem_euclid(12) as u32 + 1;

        let first = NaiveDate::from_ymd_opt(norm_year, norm_month, 1).ok_or(CellError::Num)?;
        let mut start = serial_from_date(first).ok_or(CellError::Num)?;
        // the months before March 1900 count from before the fictional day
        if norm_year == 1900 && norm_month <= 2 {
            start = (first - epoch().ok_or(CellError::Num)?).num_days();
        }
        let serial = start + day - 1;
        if serial < 0 || serial as f64 > MAX_SERIAL {
            return Err(CellError::Num);
        }
        Ok(FormulaValue::Number(serial as f64))
    })())
}

/// TIME(hour, minute, second) - fraction of a day, wrapping past midnight
pub fn fn_time(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let hour = number_arg(args, 0, ctx)?.trunc();
        let minute = number_arg(args, 1, ctx)?.trunc();
        let second = number_arg(args, 2, ctx)?.trunc();
        let total = hour * 3600.0 + minute * 60.0 + second;
        if total < 0.0 {
            return Err(CellError::Num);
        }
        Ok(FormulaValue::Number(total.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_DAY))
    })())
}

/// YEAR(serial)
pub fn fn_year(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, ctx, |(y, _, _)| y as f64)
}

/// MONTH(serial)
pub fn fn_month(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, ctx, |(_, m, _)| m as f64)
}

/// DAY(serial)
pub fn fn_day(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, ctx, |(_, _, d)| d as f64)
}

pub fn fn_hour(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(serial_arg(args, ctx).map(|s| FormulaValue::Number((seconds_of_day(s) / 3600) as f64)))
}

pub fn fn_minute(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(serial_arg(args, ctx).map(|s| FormulaValue::Number((seconds_of_day(s) / 60 % 60) as f64)))
}

pub fn fn_second(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(serial_arg(args, ctx).map(|s| FormulaValue::Number((seconds_of_day(s) % 60) as f64)))
}

/// WEEKDAY(serial, [return_type])
///
/// Computed from the serial directly, so serials before March 1900 agree
/// with Excel (which calls 1900-01-01 a Sunday).
pub fn fn_weekday(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let serial = serial_arg(args, ctx)?.floor() as i64;
        let return_type = opt_number_arg(args, 1, ctx, 1.0)?.trunc() as i64;
        // 0 = Sunday
        let sunday_based = (serial + 6).rem_euclid(7);
        let weekday = match return_type {
            1 => sunday_based + 1,
            2 => (sunday_based + 6) % 7 + 1,
            3 => (sunday_based + 6) % 7,
            _ => return Err(CellError::Num),
        };
        Ok(FormulaValue::Number(weekday as f64))
    })())
}

/// NOW() - Returns current date and time as Excel serial number
/// This is a volatile function that recalculates on every calculation.
pub fn fn_now(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let now = Local::now().naive_local();
    let date_serial = match serial_from_date(now.date()) {
        Some(serial) => serial,
        None => return Ok(FormulaValue::Error(CellError::Num)),
    };
    let time_fraction = now.num_seconds_from_midnight() as f64 / SECONDS_PER_DAY;
    Ok(FormulaValue::Number(date_serial as f64 + time_fraction))
}

/// TODAY() - Returns current date as Excel serial number
/// This is a volatile function that recalculates on every calculation.
pub fn fn_today(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(serial_from_date(Local::now().date_naive())
        .map(|serial| FormulaValue::Number(serial as f64))
        .unwrap_or(FormulaValue::Error(CellError::Num)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: super::super::FunctionImpl, args: Vec<FormulaValue>) -> FormulaValue {
        f(&args, &EvaluationContext::simple()).unwrap()
    }

    fn date(y: f64, m: f64, d: f64) -> FormulaValue {
        call(fn_date, vec![y.into(), m.into(), d.into()])
    }

    #[test]
    fn test_date_serials() {
        assert_eq!(date(1900.0, 1.0, 1.0), 1.0.into());
        assert_eq!(date(1900.0, 2.0, 28.0), 59.0.into());
        assert_eq!(date(1900.0, 2.0, 29.0), 60.0.into());
        assert_eq!(date(1900.0, 3.0, 1.0), 61.0.into());
        assert_eq!(date(2024.0, 1.0, 1.0), 45292.0.into());
        // month and day overflow roll over
        assert_eq!(date(2023.0, 13.0, 1.0), 45292.0.into());
        assert_eq!(date(2024.0, 1.0, 0.0), 45291.0.into());
        // two-digit style years
        assert_eq!(date(24.0, 1.0, 1.0), date(1924.0, 1.0, 1.0));
        assert_eq!(date(10000.0, 1.0, 1.0), CellError::Num.into());
    }

    #[test]
    fn test_date_parts() {
        let serial = FormulaValue::Number(45292.75);
        assert_eq!(call(fn_year, vec![serial.clone()]), 2024.0.into());
        assert_eq!(call(fn_month, vec![serial.clone()]), 1.0.into());
        assert_eq!(call(fn_day, vec![serial.clone()]), 1.0.into());
        assert_eq!(call(fn_hour, vec![serial.clone()]), 18.0.into());
        assert_eq!(call(fn_day, vec![60.0.into()]), 29.0.into());
        assert_eq!(call(fn_month, vec![61.0.into()]), 3.0.into());
        assert_eq!(call(fn_year, vec![(-1.0).into()]), CellError::Num.into());
    }

    #[test]
    fn test_time() {
        let t = call(fn_time, vec![12.0.into(), 30.0.into(), 15.0.into()]);
        assert_eq!(call(fn_minute, vec![t.clone()]), 30.0.into());
        assert_eq!(call(fn_second, vec![t]), 15.0.into());
        assert_eq!(
            call(fn_time, vec![25.0.into(), 0.0.into(), 0.0.into()]),
            FormulaValue::Number(1.0 / 24.0)
        );
    }

    #[test]
    fn test_weekday() {
        // 2024-01-01 is a Monday
        assert_eq!(call(fn_weekday, vec![45292.0.into()]), 2.0.into());
        assert_eq!(call(fn_weekday, vec![45292.0.into(), 2.0.into()]), 1.0.into());
        assert_eq!(call(fn_weekday, vec![45292.0.into(), 3.0.into()]), 0.0.into());
        assert_eq!(call(fn_weekday, vec![1.0.into()]), 1.0.into());
    }

    #[test]
    fn test_today_is_a_plausible_serial() {
        match call(fn_today, vec![]) {
            FormulaValue::Number(n) => assert!(n > 45000.0 && n.fract() == 0.0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
