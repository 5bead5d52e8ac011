//! Token array back to formula text

use xlcalc_core::{CellAddress, CellError, NameScope};

use crate::resolver::{cell_ref, column_ref, row_ref, WorkbookMetadata};
use crate::token::{
    Area, AreaShape, ExternRef, ExternTarget, Formula, SheetSpan, ThisRow, Token, UnaryOp,
};
use crate::value::FormulaValue;

/// Rendering context: the workbook and the sheet the formula lives on
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub meta: &'a dyn WorkbookMetadata,
    pub sheet: usize,
}

impl<'a> RenderContext<'a> {
    pub fn new(meta: &'a dyn WorkbookMetadata, sheet: usize) -> Self {
        Self { meta, sheet }
    }
}

/// Render a formula without the leading `=`
///
/// Parenthesis markers are reproduced; no other parentheses are added, so
/// a parsed formula renders to text that parses back to the same tokens.
pub fn render(formula: &Formula, ctx: &RenderContext<'_>) -> String {
    let mut stack: Vec<String> = Vec::new();
    for token in formula.tokens() {
        match token {
            Token::Number(n) => stack.push(format_literal_number(*n)),
            Token::Text(s) => stack.push(quote_text(s.as_str())),
            Token::Bool(b) => stack.push(bool_text(*b).to_string()),
            Token::Error(e) => stack.push(e.as_str().to_string()),
            Token::MissingArg => stack.push(String::new()),
            Token::Array(rows) => stack.push(render_array(rows)),
            Token::Ref(cell) => stack.push(cell.to_a1_string()),
            Token::Area(area) => stack.push(render_area(area)),
            Token::Ref3d { sheets, cell } => {
                stack.push(with_sheets(ctx, *sheets, cell.to_a1_string()))
            }
            Token::Area3d { sheets, area } => {
                stack.push(with_sheets(ctx, *sheets, render_area(area)))
            }
            Token::ExternRef(ext) => stack.push(render_extern(ext)),
            Token::Name(id) => stack.push(render_name(ctx, *id)),
            Token::ThisRow(this_row) => stack.push(render_this_row(this_row)),
            Token::Function { name, argc, .. } => {
                let args = pop_n(&mut stack, *argc);
                stack.push(format!("{}({})", name, args.join(",")));
            }
            Token::AttrSum => {
                let arg = pop(&mut stack);
                stack.push(format!("SUM({})", arg));
            }
            Token::Binary(op) => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(format!("{}{}{}", lhs, op.symbol(), rhs));
            }
            Token::Unary(op) => {
                let operand = pop(&mut stack);
                stack.push(match op {
                    UnaryOp::Plus => format!("+{}", operand),
                    UnaryOp::Minus => format!("-{}", operand),
                    UnaryOp::Percent => format!("{}%", operand),
                });
            }
            Token::Paren => {
                let inner = pop(&mut stack);
                stack.push(format!("({})", inner));
            }
            Token::AttrVolatile | Token::AttrIf(_) | Token::AttrSkip(_) => {}
        }
    }
    stack.pop().unwrap_or_default()
}

fn render_this_row(this_row: &ThisRow) -> String {
    match &this_row.columns {
        None => format!("{}[@]", this_row.table),
        Some((a, b)) if a == b => {
            if a.as_str().chars().all(|c| c.is_alphanumeric() || c == '_') {
                format!("{}[@{}]", this_row.table, a)
            } else {
                format!("{}[@[{}]]", this_row.table, escape_column(a.as_str()))
            }
        }
        Some((a, b)) => format!(
            "{}[@[{}]:[{}]]",
            this_row.table,
            escape_column(a.as_str()),
            escape_column(b.as_str())
        ),
    }
}

/// `'`-escape the characters that are special inside a bracketed column
fn escape_column(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '#' | '[' | ']' | '\'') {
            out.push('\'');
        }
        out.push(c);
    }
    out
}

fn pop(stack: &mut Vec<String>) -> String {
    stack.pop().unwrap_or_default()
}

fn pop_n(stack: &mut Vec<String>, n: usize) -> Vec<String> {
    let at = stack.len().saturating_sub(n);
    stack.split_off(at)
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Shortest text that parses back to the same number
fn format_literal_number(n: f64) -> String {
    format!("{}", n)
}

fn quote_text(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn render_array(rows: &[Vec<FormulaValue>]) -> String {
    let body = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| match v {
                    FormulaValue::Number(n) => format_literal_number(*n),
                    FormulaValue::String(s) => quote_text(s),
                    FormulaValue::Boolean(b) => bool_text(*b).to_string(),
                    FormulaValue::Error(e) => e.as_str().to_string(),
                    FormulaValue::Empty | FormulaValue::Array(_) => String::new(),
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(";");
    format!("{{{}}}", body)
}

fn render_area(area: &Area) -> String {
    let (start, end) = (&area.range.start, &area.range.end);
    match area.shape {
        AreaShape::Cells => format!("{}:{}", start.to_a1_string(), end.to_a1_string()),
        AreaShape::Columns => format!("{}:{}", column_text(start), column_text(end)),
        AreaShape::Rows => format!("{}:{}", row_text(start), row_text(end)),
    }
}

fn column_text(addr: &CellAddress) -> String {
    let dollar = if addr.col_absolute { "$" } else { "" };
    format!("{}{}", dollar, CellAddress::column_to_letters(addr.col))
}

fn row_text(addr: &CellAddress) -> String {
    let dollar = if addr.row_absolute { "$" } else { "" };
    format!("{}{}", dollar, addr.row + 1)
}

/// Whether a sheet name must be written as `'name'`
pub fn needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\');
    if !starts_ok {
        return true;
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return true;
    }
    cell_ref(name).is_some()
        || column_ref(name).is_some()
        || row_ref(name).is_some()
        || name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
        || looks_like_r1c1(name)
}

fn looks_like_r1c1(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let rest = match upper.strip_prefix('R') {
        Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_digit()),
        None => upper.as_str(),
    };
    let rest = match rest.strip_prefix('C') {
        Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_digit()),
        None => rest,
    };
    rest.is_empty()
}

pub fn quote_sheet_name(name: &str) -> String {
    if needs_quotes(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

fn with_sheets(ctx: &RenderContext<'_>, sheets: SheetSpan, target: String) -> String {
    let first = ctx.meta.sheet_name(sheets.first);
    let last = ctx.meta.sheet_name(sheets.last);
    match (first, last) {
        (Some(first), _) if sheets.is_single() => {
            format!("{}!{}", quote_sheet_name(first), target)
        }
        (Some(first), Some(last)) => {
            if needs_quotes(first) || needs_quotes(last) {
                format!(
                    "'{}:{}'!{}",
                    first.replace('\'', "''"),
                    last.replace('\'', "''"),
                    target
                )
            } else {
                format!("{}:{}!{}", first, last, target)
            }
        }
        _ => CellError::Ref.as_str().to_string(),
    }
}

fn render_extern(ext: &ExternRef) -> String {
    let target = match &ext.target {
        ExternTarget::Cell(cell) => cell.to_a1_string(),
        ExternTarget::Area(area) => render_area(area),
        ExternTarget::Name(name) => name.clone(),
    };
    match &ext.sheet {
        Some(sheet) if needs_quotes(sheet) => format!(
            "'[{}]{}'!{}",
            ext.book,
            sheet.replace('\'', "''"),
            target
        ),
        Some(sheet) => format!("[{}]{}!{}", ext.book, sheet, target),
        None => format!("[{}]!{}", ext.book, target),
    }
}

fn render_name(ctx: &RenderContext<'_>, id: usize) -> String {
    let def = match ctx.meta.name_def(id) {
        Some(def) => def,
        None => return CellError::Name.as_str().to_string(),
    };
    match def.scope {
        NameScope::Sheet(sheet) if sheet == ctx.sheet => def.name.to_string(),
        NameScope::Sheet(sheet) => match ctx.meta.sheet_name(sheet) {
            Some(sheet_name) => format!("{}!{}", quote_sheet_name(sheet_name), def.name),
            None => CellError::Ref.as_str().to_string(),
        },
        NameScope::Workbook => {
            let shadowed = ctx
                .meta
                .defined_name(def.name, NameScope::Sheet(ctx.sheet))
                .is_some();
            if shadowed {
                format!("[0]!{}", def.name)
            } else {
                def.name.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, ParseContext};
    use crate::testing::TestBook;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use xlcalc_core::{CellRange, TableDef};

    fn book() -> TestBook {
        let mut book = TestBook::new(&["Sheet1", "Sheet2", "Sheet3", "My Sheet", "It's"]);
        book.define_name("Rate", NameScope::Workbook, "=0.5");
        book.define_name("Rate", NameScope::Sheet(1), "=0.25");
        book.define_name("Local", NameScope::Sheet(2), "=1");
        book.add_link("Book2.xlsx");
        book.add_table(
            TableDef::new(
                "Table1",
                0,
                CellRange::parse("A1:B4").unwrap(),
                true,
                false,
                vec!["Item".into(), "Qty".into()],
            )
            .unwrap(),
        );
        book
    }

    fn round_trip_on(book: &TestBook, sheet: usize, text: &str) -> String {
        let formula = parse(text, &ParseContext::new(book, sheet)).unwrap();
        render(&formula, &RenderContext::new(book, sheet))
    }

    fn round_trip(text: &str) -> String {
        round_trip_on(&book(), 0, text)
    }

    #[test]
    fn test_render_operators() {
        assert_eq!(round_trip("=1+2*3"), "1+2*3");
        assert_eq!(round_trip("=( 1 + 2 ) * 3"), "(1+2)*3");
        assert_eq!(round_trip("=-A1%"), "-A1%");
        assert_eq!(round_trip("=\"say \"\"hi\"\"\"&TRUE"), "\"say \"\"hi\"\"\"&TRUE");
        assert_eq!(round_trip("=A1:B5 B2:C3"), "A1:B5 B2:C3");
        assert_eq!(round_trip("=2.50"), "2.5");
        assert_eq!(round_trip("=1E3"), "1000");
    }

    #[test]
    fn test_render_references() {
        assert_eq!(round_trip("=$a$1:b2"), "$A$1:B2");
        assert_eq!(round_trip("=SUM(A:$C)"), "SUM(A:$C)");
        assert_eq!(round_trip("=SUM($1:3)"), "SUM($1:3)");
        assert_eq!(round_trip("=sheet2!B2"), "Sheet2!B2");
        assert_eq!(round_trip("='My Sheet'!A1"), "'My Sheet'!A1");
        assert_eq!(round_trip("='It''s'!A1"), "'It''s'!A1");
        assert_eq!(round_trip("=SUM(Sheet1:Sheet3!A1)"), "SUM(Sheet1:Sheet3!A1)");
        assert_eq!(round_trip("=[Book2.xlsx]Data!A1"), "[1]Data!A1");
        assert_eq!(round_trip("=[1]!Total"), "[1]!Total");
        assert_eq!(round_trip("=SUM(Table1[Qty])"), "SUM(Sheet1!$B$2:$B$4)");
    }

    #[test]
    fn test_render_functions() {
        assert_eq!(round_trip("=if(A1>0,\"y\")"), "IF(A1>0,\"y\")");
        assert_eq!(round_trip("=IF(A1,1,2)+NOW()"), "IF(A1,1,2)+NOW()");
        assert_eq!(round_trip("=ROUND(1.5,)"), "ROUND(1.5,)");
        assert_eq!(round_trip("={1,-2;\"a\",#N/A}"), "{1,-2;\"a\",#N/A}");
        assert_eq!(round_trip("=#REF!*#REF!"), "#REF!*#REF!");
    }

    #[test]
    fn test_render_names() {
        let book = book();
        assert_eq!(round_trip_on(&book, 0, "=Rate"), "Rate");
        // the sheet-scoped Rate on Sheet2 shadows the global one
        assert_eq!(round_trip_on(&book, 1, "=Rate"), "Rate");
        assert_eq!(round_trip_on(&book, 1, "=[0]!Rate"), "[0]!Rate");
        assert_eq!(round_trip_on(&book, 0, "=Sheet3!Local"), "Sheet3!Local");

        let dangling = Formula::new(vec![Token::Name(99)]);
        assert_eq!(render(&dangling, &RenderContext::new(&book, 0)), "#NAME?");
    }

    #[test]
    fn test_render_this_row() {
        let mut book = book();
        book.add_table(
            TableDef::new(
                "Orders",
                1,
                CellRange::parse("A1:C5").unwrap(),
                true,
                false,
                vec!["Unit Price".into(), "Qty".into(), "Note#".into()],
            )
            .unwrap(),
        );
        let render_at = |text: &str| {
            let formula = parse(text, &ParseContext::at(&book, 1, 2, 4)).unwrap();
            render(&formula, &RenderContext::new(&book, 1))
        };
        assert_eq!(render_at("=orders[@qty]*2"), "Orders[@Qty]*2");
        assert_eq!(render_at("=Orders[[#This Row],[Qty]]"), "Orders[@Qty]");
        assert_eq!(render_at("=Orders[@[Unit Price]]"), "Orders[@[Unit Price]]");
        assert_eq!(render_at("=Orders[@[Note'#]]"), "Orders[@[Note'#]]");
        assert_eq!(render_at("=SUM(Orders[@[Unit Price]:[Qty]])"), "SUM(Orders[@[Unit Price]:[Qty]])");
        assert_eq!(render_at("=COUNTA(Orders[@])"), "COUNTA(Orders[@])");
    }

    #[test]
    fn test_deleted_sheet_renders_ref_error() {
        let book = book();
        let formula = Formula::new(vec![Token::Ref3d {
            sheets: SheetSpan::single(42),
            cell: CellAddress::new(0, 0),
        }]);
        assert_eq!(render(&formula, &RenderContext::new(&book, 0)), "#REF!");
    }

    #[test]
    fn test_sheet_name_quoting() {
        assert!(!needs_quotes("Sheet1"));
        assert!(needs_quotes("A1"));
        assert!(needs_quotes("R1C1"));
        assert!(needs_quotes("2024"));
        assert!(needs_quotes("Q1 Sales"));
        assert!(needs_quotes("TRUE"));
        assert_eq!(quote_sheet_name("Bob's"), "'Bob''s'");
    }

    fn operand() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..1000).prop_map(|n| n.to_string()),
            (0u32..100, 1u32..100).prop_map(|(a, b)| format!("{}.{}", a, b)),
            "[a-z ]{0,6}".prop_map(|s| format!("\"{}\"", s)),
            Just("TRUE".to_string()),
            Just("#DIV/0!".to_string()),
            ("[A-Z]{1,2}", 1u32..500, any::<bool>())
                .prop_map(|(c, r, abs)| format!("{}{}{}", if abs { "$" } else { "" }, c, r)),
            ("[A-C]", 1u32..50, "[D-F]", 50u32..99).prop_map(|(c1, r1, c2, r2)| format!(
                "{}{}:{}{}",
                c1, r1, c2, r2
            )),
            Just("Sheet2!C3".to_string()),
            Just("'My Sheet'!A1:A4".to_string()),
            Just("Rate".to_string()),
            Just("{1,2;3,4}".to_string()),
        ]
    }

    fn binary_op() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["+", "-", "*", "/", "^", "&", "=", "<>", "<="])
    }

    fn expression() -> impl Strategy<Value = String> {
        operand().prop_recursive(4, 32, 3, |inner| {
            prop_oneof![
                (inner.clone(), binary_op(), inner.clone())
                    .prop_map(|(a, op, b)| format!("{}{}{}", a, op, b)),
                inner.clone().prop_map(|a| format!("({})", a)),
                inner.clone().prop_map(|a| format!("-{}", a)),
                inner.clone().prop_map(|a| format!("{}%", a)),
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|args| format!("SUM({})", args.join(","))),
                (inner.clone(), inner.clone(), inner.clone())
                    .prop_map(|(c, t, f)| format!("IF({},{},{})", c, t, f)),
                inner.prop_map(|a| format!("ABS( {} )", a)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_render_parse_round_trip(text in expression()) {
            let book = book();
            let ctx = ParseContext::new(&book, 0);
            if let Ok(first) = parse(&text, &ctx) {
                let rendered = render(&first, &RenderContext::new(&book, 0));
                let second = parse(&rendered, &ctx);
                prop_assert_eq!(second, Ok(first));
            }
        }
    }
}
