//! Values produced during evaluation

use std::cmp::Ordering;
use std::fmt;

use xlcalc_core::{CellError, CellValue};

static EMPTY: FormulaValue = FormulaValue::Empty;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Row-major 2-D array (outer Vec is rows)
    Array(Vec<Vec<FormulaValue>>),
    #[default]
    Empty,
}

impl FormulaValue {
    /// Numeric view used by arithmetic: booleans are 1/0, blanks are 0 and
    /// text converts only when it reads as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => parse_numeric_text(s),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Convert for arithmetic, yielding the Excel error on failure
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            FormulaValue::Error(e) => Err(*e),
            v => v.as_number().ok_or(CellError::Value),
        }
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            FormulaValue::Error(e) => Err(*e),
            v => v.as_bool().ok_or(CellError::Value),
        }
    }

    /// Text view used by `&` and the text functions
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    pub fn to_text(&self) -> Result<String, CellError> {
        match self {
            FormulaValue::Error(e) => Err(*e),
            v => Ok(v.as_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Top-left element of an array, or the value itself
    pub fn first(&self) -> &FormulaValue {
        match self {
            FormulaValue::Array(rows) => rows
                .first()
                .and_then(|r| r.first())
                .map(|v| v.first())
                .unwrap_or(&EMPTY),
            v => v,
        }
    }

    /// Element at (row, col) of the array view of this value
    ///
    /// Scalars and single rows/columns broadcast; positions past the array
    /// read as `#N/A`.
    pub fn element(&self, row: usize, col: usize) -> FormulaValue {
        match self {
            FormulaValue::Array(rows) => {
                let height = rows.len();
                let width = rows.first().map_or(0, |r| r.len());
                let r = if height == 1 { 0 } else { row };
                let c = if width == 1 { 0 } else { col };
                rows.get(r)
                    .and_then(|cells| cells.get(c))
                    .cloned()
                    .unwrap_or(FormulaValue::Error(CellError::Na))
            }
            v => v.clone(),
        }
    }

    /// (rows, cols) of the array view; scalars are 1x1
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            FormulaValue::Array(rows) => (rows.len(), rows.first().map_or(0, |r| r.len())),
            _ => (1, 1),
        }
    }

    /// Iterate over scalars, flattening arrays row by row
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &FormulaValue> + '_> {
        match self {
            FormulaValue::Array(rows) => Box::new(rows.iter().flat_map(|r| r.iter())),
            v => Box::new(std::iter::once(v)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Number(_) => "number",
            FormulaValue::String(_) => "text",
            FormulaValue::Boolean(_) => "boolean",
            FormulaValue::Error(_) => "error",
            FormulaValue::Array(_) => "array",
            FormulaValue::Empty => "blank",
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Array(rows) => {
                f.write_str("{")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    for (j, v) in row.iter().enumerate() {
                        if j > 0 {
                            f.write_str(",")?;
                        }
                        match v {
                            FormulaValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\""))?,
                            v => write!(f, "{}", v)?,
                        }
                    }
                }
                f.write_str("}")
            }
            v => f.write_str(&v.as_string()),
        }
    }
}

/// Excel ordering for comparison operators: numbers < text < booleans,
/// text compared case-insensitively. Blanks take the other side's type.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    use FormulaValue::*;

    fn rank(v: &FormulaValue) -> u8 {
        match v {
            Number(_) | Empty => 0,
            String(_) => 1,
            Boolean(_) => 2,
            _ => 3,
        }
    }

    match (left, right) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, String(s)) => "".cmp(&s.to_lowercase()[..]),
        (String(s), Empty) => s.to_lowercase()[..].cmp(""),
        (Empty, Boolean(b)) => false.cmp(b),
        (Boolean(b), Empty) => b.cmp(&false),
        (Empty, Number(n)) => 0.0_f64.partial_cmp(n).unwrap_or(Ordering::Equal),
        (Number(n), Empty) => n.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Number(l), Number(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        (String(l), String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (Boolean(l), Boolean(r)) => l.cmp(r),
        (l, r) => rank(l).cmp(&rank(r)),
    }
}

/// Parse text the way arithmetic coercion does ("  12.5 ", "1e3", "50%")
pub fn parse_numeric_text(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(p) = t.strip_suffix('%') {
        return p.trim().parse::<f64>().ok().map(|n| n / 100.0);
    }
    match t.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => None,
    }
}

/// Format a number the way a general-format cell shows it
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&CellValue> for FormulaValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::String(s) => FormulaValue::String(s.as_str().to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        FormulaValue::from(&value)
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::String(s.into()),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            array @ FormulaValue::Array(_) => array.first().clone().into(),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<CellError> for FormulaValue {
    fn from(e: CellError) -> Self {
        FormulaValue::Error(e)
    }
}
