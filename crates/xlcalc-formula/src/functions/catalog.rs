//! Static catalog of Excel built-in function signatures
//!
//! The parser uses this to classify calls (fixed, variable, add-in) and to
//! reject bad argument counts. Whether a function can actually be evaluated
//! is decided by the [`FunctionRegistry`](super::FunctionRegistry) at run time.

use ahash::AHashMap;
use once_cell::sync::Lazy;

/// Signature of a built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinSignature {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` = unlimited
    pub max_args: Option<usize>,
    pub volatile: bool,
}

impl BuiltinSignature {
    pub fn is_fixed(&self) -> bool {
        self.max_args == Some(self.min_args)
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map_or(true, |max| argc <= max)
    }

    pub fn describe_arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", max),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

const VAR: Option<usize> = None;

macro_rules! sig {
    ($name:literal, $min:expr, $max:expr) => {
        BuiltinSignature {
            name: $name,
            min_args: $min,
            max_args: $max,
            volatile: false,
        }
    };
    ($name:literal, $min:expr, $max:expr, volatile) => {
        BuiltinSignature {
            name: $name,
            min_args: $min,
            max_args: $max,
            volatile: true,
        }
    };
}

static SIGNATURES: &[BuiltinSignature] = &[
    // math & trig
    sig!("ABS", 1, Some(1)),
    sig!("ACOS", 1, Some(1)),
    sig!("ASIN", 1, Some(1)),
    sig!("ATAN", 1, Some(1)),
    sig!("ATAN2", 2, Some(2)),
    sig!("CEILING", 2, Some(2)),
    sig!("COS", 1, Some(1)),
    sig!("DEGREES", 1, Some(1)),
    sig!("EVEN", 1, Some(1)),
    sig!("EXP", 1, Some(1)),
    sig!("FACT", 1, Some(1)),
    sig!("FLOOR", 2, Some(2)),
    sig!("INT", 1, Some(1)),
    sig!("LN", 1, Some(1)),
    sig!("LOG", 1, Some(2)),
    sig!("LOG10", 1, Some(1)),
    sig!("MOD", 2, Some(2)),
    sig!("ODD", 1, Some(1)),
    sig!("PI", 0, Some(0)),
    sig!("POWER", 2, Some(2)),
    sig!("PRODUCT", 1, VAR),
    sig!("RADIANS", 1, Some(1)),
    sig!("RAND", 0, Some(0), volatile),
    sig!("RANDBETWEEN", 2, Some(2), volatile),
    sig!("ROUND", 2, Some(2)),
    sig!("ROUNDDOWN", 2, Some(2)),
    sig!("ROUNDUP", 2, Some(2)),
    sig!("SIGN", 1, Some(1)),
    sig!("SIN", 1, Some(1)),
    sig!("SQRT", 1, Some(1)),
    sig!("SUM", 1, VAR),
    sig!("SUMIF", 2, Some(3)),
    sig!("SUMPRODUCT", 1, VAR),
    sig!("SUMSQ", 1, VAR),
    sig!("TAN", 1, Some(1)),
    sig!("TRUNC", 1, Some(2)),
    // statistical
    sig!("AVERAGE", 1, VAR),
    sig!("AVERAGEA", 1, VAR),
    sig!("COUNT", 1, VAR),
    sig!("COUNTA", 1, VAR),
    sig!("COUNTBLANK", 1, Some(1)),
    sig!("COUNTIF", 2, Some(2)),
    sig!("LARGE", 2, Some(2)),
    sig!("MAX", 1, VAR),
    sig!("MAXA", 1, VAR),
    sig!("MEDIAN", 1, VAR),
    sig!("MIN", 1, VAR),
    sig!("MINA", 1, VAR),
    sig!("SMALL", 2, Some(2)),
    sig!("STDEV", 1, VAR),
    sig!("STDEVP", 1, VAR),
    sig!("VAR", 1, VAR),
    sig!("VARP", 1, VAR),
    // logical
    sig!("AND", 1, VAR),
    sig!("FALSE", 0, Some(0)),
    sig!("IF", 2, Some(3)),
    sig!("IFERROR", 2, Some(2)),
    sig!("IFNA", 2, Some(2)),
    sig!("NOT", 1, Some(1)),
    sig!("OR", 1, VAR),
    sig!("TRUE", 0, Some(0)),
    sig!("XOR", 1, VAR),
    // information
    sig!("ERROR.TYPE", 1, Some(1)),
    sig!("ISBLANK", 1, Some(1)),
    sig!("ISERR", 1, Some(1)),
    sig!("ISERROR", 1, Some(1)),
    sig!("ISEVEN", 1, Some(1)),
    sig!("ISLOGICAL", 1, Some(1)),
    sig!("ISNA", 1, Some(1)),
    sig!("ISNONTEXT", 1, Some(1)),
    sig!("ISNUMBER", 1, Some(1)),
    sig!("ISODD", 1, Some(1)),
    sig!("ISREF", 1, Some(1)),
    sig!("ISTEXT", 1, Some(1)),
    sig!("N", 1, Some(1)),
    sig!("NA", 0, Some(0)),
    sig!("TYPE", 1, Some(1)),
    sig!("CELL", 1, Some(2), volatile),
    sig!("INFO", 1, Some(1), volatile),
    // lookup & reference
    sig!("CHOOSE", 2, VAR),
    sig!("COLUMN", 0, Some(1)),
    sig!("COLUMNS", 1, Some(1)),
    sig!("HLOOKUP", 3, Some(4)),
    sig!("INDEX", 2, Some(4)),
    sig!("INDIRECT", 1, Some(2), volatile),
    sig!("LOOKUP", 2, Some(3)),
    sig!("MATCH", 2, Some(3)),
    sig!("OFFSET", 3, Some(5), volatile),
    sig!("ROW", 0, Some(1)),
    sig!("ROWS", 1, Some(1)),
    sig!("VLOOKUP", 3, Some(4)),
    // text
    sig!("CHAR", 1, Some(1)),
    sig!("CLEAN", 1, Some(1)),
    sig!("CODE", 1, Some(1)),
    sig!("CONCATENATE", 1, VAR),
    sig!("EXACT", 2, Some(2)),
    sig!("FIND", 2, Some(3)),
    sig!("LEFT", 1, Some(2)),
    sig!("LEN", 1, Some(1)),
    sig!("LOWER", 1, Some(1)),
    sig!("MID", 3, Some(3)),
    sig!("PROPER", 1, Some(1)),
    sig!("REPLACE", 4, Some(4)),
    sig!("REPT", 2, Some(2)),
    sig!("RIGHT", 1, Some(2)),
    sig!("SEARCH", 2, Some(3)),
    sig!("SUBSTITUTE", 3, Some(4)),
    sig!("T", 1, Some(1)),
    sig!("TEXT", 2, Some(2)),
    sig!("TRIM", 1, Some(1)),
    sig!("UPPER", 1, Some(1)),
    sig!("VALUE", 1, Some(1)),
    // date & time
    sig!("DATE", 3, Some(3)),
    sig!("DAY", 1, Some(1)),
    sig!("HOUR", 1, Some(1)),
    sig!("MINUTE", 1, Some(1)),
    sig!("MONTH", 1, Some(1)),
    sig!("NOW", 0, Some(0), volatile),
    sig!("SECOND", 1, Some(1)),
    sig!("TIME", 3, Some(3)),
    sig!("TODAY", 0, Some(0), volatile),
    sig!("WEEKDAY", 1, Some(2)),
    sig!("YEAR", 1, Some(1)),
];

static CATALOG: Lazy<AHashMap<&'static str, &'static BuiltinSignature>> =
    Lazy::new(|| SIGNATURES.iter().map(|s| (s.name, s)).collect());

/// Look up a built-in by name (case-insensitive)
pub fn builtin(name: &str) -> Option<&'static BuiltinSignature> {
    CATALOG.get(name.to_ascii_uppercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let sum = builtin("sum").unwrap();
        assert!(!sum.is_fixed());
        assert!(sum.accepts(30));
        assert!(!sum.accepts(0));

        let iferror = builtin("IFERROR").unwrap();
        assert!(iferror.is_fixed());
        assert_eq!(iferror.describe_arity(), "2");

        assert!(builtin("NOW").unwrap().volatile);
        assert!(builtin("MYADDIN").is_none());
    }

    #[test]
    fn test_catalog_names_unique() {
        assert_eq!(CATALOG.len(), SIGNATURES.len());
    }
}
