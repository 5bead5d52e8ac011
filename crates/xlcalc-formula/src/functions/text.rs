//! Text functions
//!
//! Positions and lengths count characters, not bytes.

use xlcalc_core::CellError;

use super::{excel, number_arg, opt_number_arg, scalar_arg, text_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{parse_numeric_text, FormulaValue};

/// Longest string a cell may hold
const MAX_TEXT_LEN: usize = 32_767;

fn text(s: String) -> Result<FormulaValue, CellError> {
    if s.chars().count() > MAX_TEXT_LEN {
        Err(CellError::Value)
    } else {
        Ok(FormulaValue::String(s))
    }
}

/// Non-negative character count argument
fn count_arg(args: &[FormulaValue], i: usize, ctx: &EvaluationContext, default: f64) -> Result<usize, CellError> {
    let n = opt_number_arg(args, i, ctx, default)?.trunc();
    if n < 0.0 {
        Err(CellError::Value)
    } else {
        Ok(n as usize)
    }
}

/// LEN(text)
pub fn fn_len(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| FormulaValue::Number(s.chars().count() as f64)))
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s = text_arg(args, 0, ctx)?;
        let n = count_arg(args, 1, ctx, 1.0)?;
        Ok(FormulaValue::String(s.chars().take(n).collect()))
    })())
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s = text_arg(args, 0, ctx)?;
        let n = count_arg(args, 1, ctx, 1.0)?;
        let len = s.chars().count();
        Ok(FormulaValue::String(s.chars().skip(len.saturating_sub(n)).collect()))
    })())
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s = text_arg(args, 0, ctx)?;
        let start = number_arg(args, 1, ctx)?.trunc();
        let n = count_arg(args, 2, ctx, 0.0)?;
        if start < 1.0 {
            return Err(CellError::Value);
        }
        Ok(FormulaValue::String(
            s.chars().skip(start as usize - 1).take(n).collect(),
        ))
    })())
}

pub fn fn_upper(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| FormulaValue::String(s.to_uppercase())))
}

pub fn fn_lower(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| FormulaValue::String(s.to_lowercase())))
}

/// PROPER(text) - capitalize the first letter of each word
pub fn fn_proper(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| {
        let mut out = String::with_capacity(s.len());
        let mut after_letter = false;
        for c in s.chars() {
            if after_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            after_letter = c.is_alphabetic();
        }
        FormulaValue::String(out)
    }))
}

/// TRIM(text) - strip leading/trailing spaces and collapse inner runs
pub fn fn_trim(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| {
        FormulaValue::String(s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
    }))
}

/// CLEAN(text) - drop non-printable ASCII control characters
pub fn fn_clean(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).map(|s| {
        FormulaValue::String(s.chars().filter(|c| *c as u32 >= 32).collect())
    }))
}

/// CONCATENATE(text1, [text2], ...)
pub fn fn_concatenate(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let mut out = String::new();
        for i in 0..args.len() {
            out.push_str(&text_arg(args, i, ctx)?);
        }
        text(out)
    })())
}

/// REPT(text, number_times)
pub fn fn_rept(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s = text_arg(args, 0, ctx)?;
        let times = count_arg(args, 1, ctx, 0.0)?;
        if s.chars().count().saturating_mul(times) > MAX_TEXT_LEN {
            return Err(CellError::Value);
        }
        Ok(FormulaValue::String(s.repeat(times)))
    })())
}

/// EXACT(text1, text2) - case-sensitive comparison
pub fn fn_exact(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let a = text_arg(args, 0, ctx)?;
        let b = text_arg(args, 1, ctx)?;
        Ok(FormulaValue::Boolean(a == b))
    })())
}

/// Validated 1-based start position, as a character offset
fn start_arg(args: &[FormulaValue], i: usize, ctx: &EvaluationContext, len: usize) -> Result<usize, CellError> {
    let start = opt_number_arg(args, i, ctx, 1.0)?.trunc();
    if start < 1.0 || start as usize > len + 1 {
        return Err(CellError::Value);
    }
    Ok(start as usize - 1)
}

/// FIND(find_text, within_text, [start_num]) - case-sensitive, no wildcards
pub fn fn_find(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let needle: Vec<char> = text_arg(args, 0, ctx)?.chars().collect();
        let haystack: Vec<char> = text_arg(args, 1, ctx)?.chars().collect();
        let start = start_arg(args, 2, ctx, haystack.len())?;
        (start..=haystack.len())
            .find(|&i| haystack[i..].starts_with(&needle))
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Value)
    })())
}

/// SEARCH(find_text, within_text, [start_num]) - case-insensitive with `?`, `*` and `~`
pub fn fn_search(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let pattern = compile_pattern(&text_arg(args, 0, ctx)?.to_lowercase());
        let haystack: Vec<char> = text_arg(args, 1, ctx)?.to_lowercase().chars().collect();
        let start = start_arg(args, 2, ctx, haystack.len())?;
        (start..=haystack.len())
            .find(|&i| match_prefix(&pattern, &haystack[i..]))
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Value)
    })())
}

/// One element of a wildcard pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Wildcard {
    Char(char),
    /// `?`
    One,
    /// `*`
    Any,
}

/// Compile Excel wildcard syntax; `~` escapes the next character
pub(crate) fn compile_pattern(pattern: &str) -> Vec<Wildcard> {
    let mut out = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '~' => match chars.next() {
                Some(escaped) => Wildcard::Char(escaped),
                None => Wildcard::Char('~'),
            },
            '?' => Wildcard::One,
            '*' => Wildcard::Any,
            c => Wildcard::Char(c),
        });
    }
    out
}

/// Does `pattern` match some prefix of `text`
fn match_prefix(pattern: &[Wildcard], text: &[char]) -> bool {
    wildcard_match(pattern, text, true)
}

/// Does `pattern` match all of `text`
pub(crate) fn match_whole(pattern: &[Wildcard], text: &[char]) -> bool {
    wildcard_match(pattern, text, false)
}

/// Iterative matcher; on a mismatch only the most recent `*` is retried,
/// one character further on, so the cost stays within pattern x text steps
fn wildcard_match(pattern: &[Wildcard], text: &[char], prefix: bool) -> bool {
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    loop {
        if prefix && pi == pattern.len() {
            return true;
        }
        if ti == text.len() {
            break;
        }
        match pattern.get(pi) {
            Some(Wildcard::Any) => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(Wildcard::One) => {
                pi += 1;
                ti += 1;
            }
            Some(Wildcard::Char(c)) if *c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, ti));
                }
                None => return false,
            },
        }
    }
    pattern[pi..].iter().all(|p| *p == Wildcard::Any)
}

/// SUBSTITUTE(text, old_text, new_text, [instance_num])
pub fn fn_substitute(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s = text_arg(args, 0, ctx)?;
        let old = text_arg(args, 1, ctx)?;
        let new = text_arg(args, 2, ctx)?;
        if old.is_empty() {
            return Ok(FormulaValue::String(s));
        }
        if args.len() < 4 {
            return text(s.replace(&old, &new));
        }
        let instance = number_arg(args, 3, ctx)?.trunc();
        if instance < 1.0 {
            return Err(CellError::Value);
        }
        match s.match_indices(&old).nth(instance as usize - 1) {
            Some((at, _)) => text(format!("{}{}{}", &s[..at], new, &s[at + old.len()..])),
            None => Ok(FormulaValue::String(s)),
        }
    })())
}

/// REPLACE(old_text, start_num, num_chars, new_text)
pub fn fn_replace(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel((|| {
        let s: Vec<char> = text_arg(args, 0, ctx)?.chars().collect();
        let start = number_arg(args, 1, ctx)?.trunc();
        let n = count_arg(args, 2, ctx, 0.0)?;
        let new = text_arg(args, 3, ctx)?;
        if start < 1.0 {
            return Err(CellError::Value);
        }
        let from = (start as usize - 1).min(s.len());
        let to = from.saturating_add(n).min(s.len());
        let mut out: String = s[..from].iter().collect();
        out.push_str(&new);
        out.extend(&s[to..]);
        text(out)
    })())
}

/// VALUE(text)
pub fn fn_value(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match scalar_arg(args, 0, ctx) {
        FormulaValue::Number(n) => FormulaValue::Number(n),
        FormulaValue::Empty => FormulaValue::Number(0.0),
        FormulaValue::String(s) => parse_numeric_text(&s)
            .map(FormulaValue::Number)
            .unwrap_or(FormulaValue::Error(CellError::Value)),
        FormulaValue::Error(e) => FormulaValue::Error(e),
        _ => FormulaValue::Error(CellError::Value),
    })
}

/// T(value) - text passes through, everything else is ""
pub fn fn_t(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match scalar_arg(args, 0, ctx) {
        FormulaValue::String(s) => FormulaValue::String(s),
        FormulaValue::Error(e) => FormulaValue::Error(e),
        _ => FormulaValue::String(String::new()),
    })
}

/// CHAR(number) - 1..=255 in the Latin-1 range
pub fn fn_char(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(number_arg(args, 0, ctx).and_then(|n| {
        let code = n.trunc();
        if !(1.0..=255.0).contains(&code) {
            return Err(CellError::Value);
        }
        Ok(FormulaValue::String(char::from(code as u8).to_string()))
    }))
}

/// CODE(text) - code of the first character
pub fn fn_code(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    excel(text_arg(args, 0, ctx).and_then(|s| {
        s.chars()
            .next()
            .map(|c| FormulaValue::Number(c as u32 as f64))
            .ok_or(CellError::Value)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(f: super::super::FunctionImpl, args: Vec<FormulaValue>) -> FormulaValue {
        f(&args, &EvaluationContext::simple()).unwrap()
    }

    fn s(v: &str) -> FormulaValue {
        FormulaValue::from(v)
    }

    #[test]
    fn test_slicing() {
        assert_eq!(call(fn_left, vec![s("héllo"), 2.0.into()]), s("hé"));
        assert_eq!(call(fn_left, vec![s("abc")]), s("a"));
        assert_eq!(call(fn_right, vec![s("abc"), 5.0.into()]), s("abc"));
        assert_eq!(call(fn_mid, vec![s("abcdef"), 2.0.into(), 3.0.into()]), s("bcd"));
        assert_eq!(
            call(fn_mid, vec![s("abc"), 0.0.into(), 1.0.into()]),
            CellError::Value.into()
        );
        assert_eq!(call(fn_len, vec![12.5.into()]), 4.0.into());
        assert_eq!(call(fn_left, vec![s("abc"), (-1.0).into()]), CellError::Value.into());
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(call(fn_proper, vec![s("hello wORLD-foo")]), s("Hello World-Foo"));
        assert_eq!(call(fn_trim, vec![s("  a   b  ")]), s("a b"));
        assert_eq!(call(fn_clean, vec![s("a\u{7}b")]), s("ab"));
        assert_eq!(call(fn_upper, vec![true.into()]), s("TRUE"));
    }

    #[test]
    fn test_find_and_search() {
        assert_eq!(call(fn_find, vec![s("b"), s("abcb"), 3.0.into()]), 4.0.into());
        assert_eq!(call(fn_find, vec![s("B"), s("abc")]), CellError::Value.into());
        assert_eq!(call(fn_find, vec![s(""), s("abc")]), 1.0.into());
        assert_eq!(call(fn_search, vec![s("B"), s("abc")]), 2.0.into());
        assert_eq!(call(fn_search, vec![s("b?d"), s("abcd")]), 2.0.into());
        assert_eq!(call(fn_search, vec![s("~?"), s("what?")]), 5.0.into());
        assert_eq!(call(fn_search, vec![s("c*"), s("abc")]), 3.0.into());
    }

    #[test]
    fn test_substitute_and_replace() {
        assert_eq!(call(fn_substitute, vec![s("a-b-c"), s("-"), s("+")]), s("a+b+c"));
        assert_eq!(
            call(fn_substitute, vec![s("a-b-c"), s("-"), s("+"), 2.0.into()]),
            s("a-b+c")
        );
        assert_eq!(
            call(fn_replace, vec![s("abcdef"), 2.0.into(), 3.0.into(), s("X")]),
            s("aXef")
        );
        assert_eq!(call(fn_rept, vec![s("ab"), 3.0.into()]), s("ababab"));
        assert_eq!(call(fn_concatenate, vec![s("a"), 1.0.into(), true.into()]), s("a1TRUE"));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call(fn_value, vec![s(" 1e3 ")]), 1000.0.into());
        assert_eq!(call(fn_value, vec![s("x")]), CellError::Value.into());
        assert_eq!(call(fn_t, vec![1.0.into()]), s(""));
        assert_eq!(call(fn_char, vec![65.0.into()]), s("A"));
        assert_eq!(call(fn_code, vec![s("A")]), 65.0.into());
        assert_eq!(call(fn_code, vec![s("")]), CellError::Value.into());
        assert_eq!(call(fn_exact, vec![s("a"), s("A")]), false.into());
    }

    #[test]
    fn test_wildcards() {
        let p = compile_pattern("a*c");
        assert!(match_whole(&p, &['a', 'b', 'b', 'c']));
        assert!(!match_whole(&p, &['a', 'b']));
        assert_eq!(compile_pattern("~*"), vec![Wildcard::Char('*')]);

        let text: Vec<char> = "abcabd".chars().collect();
        assert!(match_whole(&compile_pattern("*b?"), &text));
        assert!(match_whole(&compile_pattern("a*b*"), &text));
        assert!(!match_whole(&compile_pattern("*c"), &text));
        assert!(match_prefix(&compile_pattern("a?c"), &text));
        assert!(match_prefix(&compile_pattern(""), &text));
        assert!(!match_prefix(&compile_pattern("abd"), &text));
        assert!(match_whole(&compile_pattern("*~?"), &['x', '?']));
        assert!(!match_whole(&compile_pattern("*~?"), &['x', 'y']));
    }

    #[test]
    fn test_many_star_patterns() {
        let text: String = "a".repeat(40);
        assert_eq!(
            call(fn_search, vec![s("*a*a*a*a*a*a*a*b"), s(&text)]),
            CellError::Value.into()
        );
        assert_eq!(call(fn_search, vec![s("*a*a*a*a*a*a*a*a"), s(&text)]), 1.0.into());

        let long: Vec<char> = format!("{}b", "a".repeat(5000)).chars().collect();
        let pattern = compile_pattern(&"*a".repeat(30));
        assert!(!match_whole(&pattern, &long));
        assert!(match_whole(&compile_pattern(&format!("{}b", "*a".repeat(30))), &long));
    }
}
