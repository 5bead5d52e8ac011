//! Stored cell values and Excel error literals

use std::fmt;
use std::sync::Arc;

/// A constant held by a worksheet cell.
///
/// Formulas are owned by the calculation engine, so the value store only sees
/// literals and written-back results.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum CellValue {
    #[default]
    Empty,
    Boolean(bool),
    /// Numbers and date serials
    Number(f64),
    Error(CellError),
    String(SharedString),
}

impl CellValue {
    pub fn string<S: Into<String>>(s: S) -> Self {
        CellValue::String(SharedString::from(s.into()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => f.write_str(s.as_str()),
            CellValue::Error(e) => f.write_str(e.as_str()),
        }
    }
}

macro_rules! cell_value_from {
    ($($ty:ty => $conv:expr),* $(,)?) => {
        $(impl From<$ty> for CellValue {
            fn from(v: $ty) -> Self {
                $conv(v)
            }
        })*
    };
}

cell_value_from! {
    bool => CellValue::Boolean,
    f64 => CellValue::Number,
    i32 => |n: i32| CellValue::Number(f64::from(n)),
    &str => CellValue::string,
    String => CellValue::string,
    CellError => CellValue::Error,
}

/// Excel error values, in the order of their binary codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellError {
    /// Empty intersection
    Null,
    Div0,
    /// Wrong operand type
    Value,
    /// Reference that no longer points anywhere
    Ref,
    /// Unknown name or function
    Name,
    Num,
    Na,
    /// External data still loading
    GettingData,
}

/// literal, BIFF code, ERROR.TYPE number
const ERROR_TABLE: [(CellError, &str, u8, u8); 8] = [
    (CellError::Null, "#NULL!", 0x00, 1),
    (CellError::Div0, "#DIV/0!", 0x07, 2),
    (CellError::Value, "#VALUE!", 0x0F, 3),
    (CellError::Ref, "#REF!", 0x17, 4),
    (CellError::Name, "#NAME?", 0x1D, 5),
    (CellError::Num, "#NUM!", 0x24, 6),
    (CellError::Na, "#N/A", 0x2A, 7),
    (CellError::GettingData, "#GETTING_DATA", 0x2B, 8),
];

impl CellError {
    pub const ALL: [CellError; 8] = [
        CellError::Null,
        CellError::Div0,
        CellError::Value,
        CellError::Ref,
        CellError::Name,
        CellError::Num,
        CellError::Na,
        CellError::GettingData,
    ];

    fn entry(self) -> (CellError, &'static str, u8, u8) {
        ERROR_TABLE[self as usize]
    }

    pub fn as_str(&self) -> &'static str {
        self.entry().1
    }

    /// Case-insensitive error literal lookup
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        ERROR_TABLE
            .iter()
            .find(|e| e.1.eq_ignore_ascii_case(s))
            .map(|e| e.0)
    }

    /// Code used in binary formula streams
    pub fn code(&self) -> u8 {
        self.entry().2
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ERROR_TABLE.iter().find(|e| e.2 == code).map(|e| e.0)
    }

    /// Value returned by ERROR.TYPE
    pub fn type_number(&self) -> u8 {
        self.entry().3
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CellError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CellError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellError::from_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error literal '{}'", s)))
    }
}

/// Reference-counted string shared between cells, tokens and results
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedString(Arc<str>);

impl SharedString {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        SharedString(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SharedString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SharedString {
    fn from(s: &str) -> Self {
        SharedString::new(s)
    }
}

impl From<String> for SharedString {
    fn from(s: String) -> Self {
        SharedString(Arc::from(s))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for SharedString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SharedString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SharedString::from)
    }
}
