//! Formula parser
//!
//! A precedence-climbing parser that emits a postfix token array. From
//! loosest to tightest binding:
//!
//! | level | operators |
//! |---|---|
//! | comparison | `= <> < <= > >=` |
//! | concatenation | `&` |
//! | additive | `+ -` |
//! | multiplicative | `* /` |
//! | exponent | `^` (left-associative) |
//! | percent | postfix `%` |
//! | sign | prefix `+ -` |
//! | reference | `,` union (inside parentheses), space intersection, `:` range |

use tracing::trace;
use xlcalc_core::{CellAddress, CellError, NameScope, SharedString};

use crate::error::{ParseError, ParseResult};
use crate::functions::catalog::builtin;
use crate::resolver::{
    cell_ref, column_ref, resolve_external_book, resolve_name, resolve_sheet,
    resolve_structured, row_ref, WorkbookMetadata,
};
use crate::token::{
    Area, BinaryOp, ExternRef, ExternTarget, Formula, FunctionKind, SheetSpan, Token, UnaryOp,
};
use crate::tokenizer::{tokenize, Lex, Lexeme};
use crate::value::FormulaValue;

/// Parse-time context
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    /// Workbook structure used to resolve sheets, names and tables
    pub meta: &'a dyn WorkbookMetadata,
    /// Sheet the formula lives on
    pub sheet: usize,
    /// Row of the formula cell; needed by `Table[#This Row]`
    pub row: Option<u32>,
    pub col: Option<u16>,
}

impl<'a> ParseContext<'a> {
    pub fn new(meta: &'a dyn WorkbookMetadata, sheet: usize) -> Self {
        Self {
            meta,
            sheet,
            row: None,
            col: None,
        }
    }

    /// Context for a formula stored in a specific cell
    pub fn at(meta: &'a dyn WorkbookMetadata, sheet: usize, row: u32, col: u16) -> Self {
        Self {
            meta,
            sheet,
            row: Some(row),
            col: Some(col),
        }
    }
}

/// Parse formula text into a token array
///
/// # Example
/// ```rust,ignore
/// let ctx = ParseContext::new(&workbook_view, 0);
/// let formula = parse("=SUM(A1:A10)*2", &ctx)?;
/// ```
pub fn parse(text: &str, ctx: &ParseContext<'_>) -> ParseResult<Formula> {
    let lexes = tokenize(text)?;
    let mut parser = Parser {
        lexes,
        idx: 0,
        ctx,
        out: Vec::new(),
        volatile: false,
        union_ok: Vec::new(),
    };
    let formula = parser.parse_formula()?;
    trace!(text, tokens = formula.tokens().len(), "parsed formula");
    Ok(formula)
}

/// Whether an expression produced a reference (gates the intersection operator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Reference,
    Value,
}

enum RefAtom {
    Cell(CellAddress),
    Area(Area),
}

struct Parser<'a> {
    lexes: Vec<Lexeme>,
    idx: usize,
    ctx: &'a ParseContext<'a>,
    out: Vec<Token>,
    volatile: bool,
    /// Whether `,` is a union operator at the current nesting level
    union_ok: Vec<bool>,
}

impl<'a> Parser<'a> {
    // === Lexeme access ===

    fn peek(&self) -> &Lexeme {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Lexeme {
        let last = self.lexes.len() - 1;
        &self.lexes[(self.idx + n).min(last)]
    }

    fn kind_at(&self, n: usize) -> &Lex {
        &self.peek_at(n).kind
    }

    fn advance(&mut self) -> Lexeme {
        let lexeme = self.peek().clone();
        if self.idx < self.lexes.len() - 1 {
            self.idx += 1;
        }
        lexeme
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let l = self.peek();
        ParseError::Unexpected {
            expected,
            found: l.kind.describe(),
            pos: l.pos,
        }
    }

    fn expect(&mut self, kind: Lex, expected: &'static str) -> ParseResult<()> {
        if *self.kind_at(0) == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn emit(&mut self, token: Token) {
        self.out.push(token);
    }

    fn meta(&self) -> &'a dyn WorkbookMetadata {
        self.ctx.meta
    }

    // === Grammar ===

    fn parse_formula(&mut self) -> ParseResult<Formula> {
        if *self.kind_at(0) == Lex::Eof {
            return Err(ParseError::Empty);
        }
        self.parse_comparison()?;
        if *self.kind_at(0) != Lex::Eof {
            return Err(self.unexpected("an operator or end of formula"));
        }
        let mut tokens = std::mem::take(&mut self.out);
        if self.volatile {
            tokens.insert(0, Token::AttrVolatile);
        }
        Ok(Formula::new(tokens))
    }

    fn parse_comparison(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_concat()?;
        loop {
            let op = match self.kind_at(0) {
                Lex::Eq => BinaryOp::Equal,
                Lex::Ne => BinaryOp::NotEqual,
                Lex::Lt => BinaryOp::Less,
                Lex::Le => BinaryOp::LessEqual,
                Lex::Gt => BinaryOp::Greater,
                Lex::Ge => BinaryOp::GreaterEqual,
                _ => return Ok(kind),
            };
            self.advance();
            self.parse_concat()?;
            self.emit(Token::Binary(op));
            kind = Kind::Value;
        }
    }

    fn parse_concat(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_additive()?;
        while *self.kind_at(0) == Lex::Amp {
            self.advance();
            self.parse_additive()?;
            self.emit(Token::Binary(BinaryOp::Concat));
            kind = Kind::Value;
        }
        Ok(kind)
    }

    fn parse_additive(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_multiplicative()?;
        loop {
            let op = match self.kind_at(0) {
                Lex::Plus => BinaryOp::Add,
                Lex::Minus => BinaryOp::Subtract,
                _ => return Ok(kind),
            };
            self.advance();
            self.parse_multiplicative()?;
            self.emit(Token::Binary(op));
            kind = Kind::Value;
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_power()?;
        loop {
            let op = match self.kind_at(0) {
                Lex::Star => BinaryOp::Multiply,
                Lex::Slash => BinaryOp::Divide,
                _ => return Ok(kind),
            };
            self.advance();
            self.parse_power()?;
            self.emit(Token::Binary(op));
            kind = Kind::Value;
        }
    }

    fn parse_power(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_percent()?;
        while *self.kind_at(0) == Lex::Caret {
            self.advance();
            self.parse_percent()?;
            self.emit(Token::Binary(BinaryOp::Power));
            kind = Kind::Value;
        }
        Ok(kind)
    }

    fn parse_percent(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_unary()?;
        while *self.kind_at(0) == Lex::Percent {
            self.advance();
            self.emit(Token::Unary(UnaryOp::Percent));
            kind = Kind::Value;
        }
        Ok(kind)
    }

    fn parse_unary(&mut self) -> ParseResult<Kind> {
        let op = match self.kind_at(0) {
            Lex::Plus => UnaryOp::Plus,
            Lex::Minus => UnaryOp::Minus,
            _ => return self.parse_union(),
        };
        self.advance();
        self.parse_unary()?;
        self.emit(Token::Unary(op));
        Ok(Kind::Value)
    }

    fn parse_union(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_intersection()?;
        while self.union_ok.last() == Some(&true) && *self.kind_at(0) == Lex::Comma {
            self.advance();
            self.parse_intersection()?;
            self.emit(Token::Binary(BinaryOp::Union));
            kind = Kind::Reference;
        }
        Ok(kind)
    }

    fn parse_intersection(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_range()?;
        while kind == Kind::Reference && self.peek().space_before && self.starts_reference() {
            self.parse_range()?;
            self.emit(Token::Binary(BinaryOp::Intersect));
        }
        Ok(kind)
    }

    fn starts_reference(&self) -> bool {
        matches!(
            self.kind_at(0),
            Lex::Ident(_) | Lex::QuotedSheet(_) | Lex::Bracket(_) | Lex::LParen
        )
    }

    fn parse_range(&mut self) -> ParseResult<Kind> {
        let mut kind = self.parse_primary()?;
        while *self.kind_at(0) == Lex::Colon {
            self.advance();
            self.parse_primary()?;
            self.emit(Token::Binary(BinaryOp::Range));
            kind = Kind::Reference;
        }
        Ok(kind)
    }

    fn parse_primary(&mut self) -> ParseResult<Kind> {
        let lexeme = self.peek().clone();
        match lexeme.kind {
            Lex::Number(raw) => {
                if let Some(atom) = self.ref_atom() {
                    self.emit_local(atom);
                    return Ok(Kind::Reference);
                }
                self.advance();
                let n = parse_number(&raw, lexeme.pos)?;
                self.emit(Token::Number(n));
                Ok(Kind::Value)
            }
            Lex::Text(s) => {
                self.advance();
                self.emit(Token::Text(SharedString::from(s)));
                Ok(Kind::Value)
            }
            Lex::Error(e) => {
                self.advance();
                self.emit(Token::Error(e));
                Ok(Kind::Value)
            }
            Lex::LParen => {
                self.advance();
                self.union_ok.push(true);
                let kind = self.parse_comparison();
                self.union_ok.pop();
                let kind = kind?;
                self.expect(Lex::RParen, "')'")?;
                self.emit(Token::Paren);
                Ok(kind)
            }
            Lex::LBrace => {
                self.advance();
                self.parse_array()?;
                Ok(Kind::Value)
            }
            Lex::QuotedSheet(content) => {
                self.advance();
                self.parse_quoted(&content, lexeme.pos)
            }
            Lex::Bracket(book) => {
                self.advance();
                self.parse_external(&book, None, lexeme.pos)
            }
            Lex::Ident(name) => self.parse_ident(&name, lexeme.pos),
            _ => Err(self.unexpected("an operand")),
        }
    }

    fn parse_ident(&mut self, name: &str, pos: usize) -> ParseResult<Kind> {
        let next = self.peek_at(1).clone();

        if next.kind == Lex::LParen && !next.space_before {
            self.advance();
            self.advance();
            return self.parse_call(name);
        }

        if next.kind == Lex::Bang {
            let sheet = resolve_sheet(self.meta(), name, pos)?;
            self.advance();
            self.advance();
            return self.parse_sheet_target(SheetSpan::single(sheet));
        }

        if next.kind == Lex::Colon && *self.kind_at(3) == Lex::Bang {
            if let (Some(first), Lex::Ident(last_name)) =
                (self.meta().sheet_index(name), self.kind_at(2).clone())
            {
                let last = resolve_sheet(self.meta(), &last_name, self.peek_at(2).pos)?;
                for _ in 0..4 {
                    self.advance();
                }
                return self.parse_sheet_target(SheetSpan::new(first, last));
            }
        }

        if let Lex::Bracket(spec) = &next.kind {
            if !next.space_before {
                let token = resolve_structured(self.meta(), name, spec, self.ctx.row, pos)?;
                self.advance();
                self.advance();
                self.emit(token);
                return Ok(Kind::Reference);
            }
        }

        if name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE") {
            self.advance();
            self.emit(Token::Bool(name.eq_ignore_ascii_case("TRUE")));
            return Ok(Kind::Value);
        }

        if let Some(atom) = self.ref_atom() {
            self.emit_local(atom);
            return Ok(Kind::Reference);
        }

        match resolve_name(self.meta(), name, self.ctx.sheet) {
            Some(id) => {
                self.advance();
                self.emit(Token::Name(id));
                Ok(Kind::Reference)
            }
            None => Err(ParseError::UnknownName {
                name: name.to_string(),
                pos,
            }),
        }
    }

    /// Cell, area, whole-column or whole-row reference at the cursor
    fn ref_atom(&mut self) -> Option<RefAtom> {
        let text = match self.kind_at(0) {
            Lex::Ident(t) | Lex::Number(t) => t.clone(),
            _ => return None,
        };
        let is_ident = matches!(self.kind_at(0), Lex::Ident(_));
        let second = match (self.kind_at(1), self.kind_at(2)) {
            (Lex::Colon, Lex::Ident(t)) | (Lex::Colon, Lex::Number(t)) => Some(t.clone()),
            _ => None,
        };

        if is_ident {
            if let Some(first) = cell_ref(&text) {
                if let Some(last) = second.as_deref().and_then(cell_ref) {
                    self.idx += 3;
                    return Some(RefAtom::Area(Area::cells(first, last)));
                }
                self.idx += 1;
                return Some(RefAtom::Cell(first));
            }
        }

        let second = second?;
        if let (Some((c1, a1)), Some((c2, a2))) = (column_ref(&text), column_ref(&second)) {
            self.idx += 3;
            return Some(RefAtom::Area(Area::columns(c1, a1, c2, a2)));
        }
        if let (Some((r1, a1)), Some((r2, a2))) = (row_ref(&text), row_ref(&second)) {
            self.idx += 3;
            return Some(RefAtom::Area(Area::rows(r1, a1, r2, a2)));
        }
        None
    }

    fn emit_local(&mut self, atom: RefAtom) {
        self.emit(match atom {
            RefAtom::Cell(cell) => Token::Ref(cell),
            RefAtom::Area(area) => Token::Area(area),
        });
    }

    /// Reference following `Sheet!` or `First:Last!`
    fn parse_sheet_target(&mut self, sheets: SheetSpan) -> ParseResult<Kind> {
        if let Some(atom) = self.ref_atom() {
            self.emit(match atom {
                RefAtom::Cell(cell) => Token::Ref3d { sheets, cell },
                RefAtom::Area(area) => Token::Area3d { sheets, area },
            });
            return Ok(Kind::Reference);
        }
        let lexeme = self.peek().clone();
        match lexeme.kind {
            Lex::Ident(name) if sheets.is_single() => {
                let id = self
                    .meta()
                    .defined_name(&name, NameScope::Sheet(sheets.first))
                    .or_else(|| self.meta().defined_name(&name, NameScope::Workbook))
                    .ok_or(ParseError::UnknownName {
                        name,
                        pos: lexeme.pos,
                    })?;
                self.advance();
                self.emit(Token::Name(id));
                Ok(Kind::Reference)
            }
            Lex::Error(CellError::Ref) => {
                self.advance();
                self.emit(Token::Error(CellError::Ref));
                Ok(Kind::Value)
            }
            _ => Err(self.unexpected("a reference after '!'")),
        }
    }

    /// `'Sheet Name'!`, `'First:Last'!` or `'[Book]Sheet'!`
    fn parse_quoted(&mut self, content: &str, pos: usize) -> ParseResult<Kind> {
        if let Some(rest) = content.strip_prefix('[') {
            let (book, sheet) = rest.split_once(']').ok_or(ParseError::UnbalancedBracket { pos })?;
            let sheet = (!sheet.is_empty()).then(|| sheet.to_string());
            return self.parse_external(book, sheet, pos);
        }
        let span = match content.split_once(':') {
            Some((first, last)) => SheetSpan::new(
                resolve_sheet(self.meta(), first, pos)?,
                resolve_sheet(self.meta(), last, pos)?,
            ),
            None => SheetSpan::single(resolve_sheet(self.meta(), content, pos)?),
        };
        self.expect(Lex::Bang, "'!' after a sheet name")?;
        self.parse_sheet_target(span)
    }

    /// Reference after `[k]`; `sheet` is set when it came inside a quoted name
    fn parse_external(
        &mut self,
        book_text: &str,
        mut sheet: Option<String>,
        pos: usize,
    ) -> ParseResult<Kind> {
        let book = resolve_external_book(self.meta(), book_text, pos)?;

        if sheet.is_none() {
            if let Lex::Ident(name) = self.kind_at(0).clone() {
                if *self.kind_at(1) == Lex::Bang {
                    self.advance();
                    sheet = Some(name);
                }
            }
        }
        self.expect(Lex::Bang, "'!' after an external workbook")?;

        if book == 0 {
            return self.parse_self_external(sheet, pos);
        }

        let target = match self.ref_atom() {
            Some(RefAtom::Cell(cell)) => ExternTarget::Cell(cell),
            Some(RefAtom::Area(area)) => ExternTarget::Area(area),
            None => match self.kind_at(0).clone() {
                Lex::Ident(name) => {
                    self.advance();
                    ExternTarget::Name(name)
                }
                _ => return Err(self.unexpected("a reference or name in the external workbook")),
            },
        };
        self.emit(Token::ExternRef(ExternRef {
            book,
            sheet,
            target,
        }));
        Ok(Kind::Reference)
    }

    /// `[0]Sheet!A1` and `[0]!Name`: the current workbook addressed as external
    fn parse_self_external(&mut self, sheet: Option<String>, pos: usize) -> ParseResult<Kind> {
        let scope = match &sheet {
            Some(name) => NameScope::Sheet(resolve_sheet(self.meta(), name, pos)?),
            None => NameScope::Workbook,
        };
        if let Some(name) = sheet.clone() {
            let target = match self.ref_atom() {
                Some(RefAtom::Cell(cell)) => Some(ExternTarget::Cell(cell)),
                Some(RefAtom::Area(area)) => Some(ExternTarget::Area(area)),
                None => None,
            };
            if let Some(target) = target {
                self.emit(Token::ExternRef(ExternRef {
                    book: 0,
                    sheet: Some(name),
                    target,
                }));
                return Ok(Kind::Reference);
            }
        }
        let lexeme = self.peek().clone();
        match lexeme.kind {
            Lex::Ident(name) => {
                let id = self.meta().defined_name(&name, scope).ok_or(
                    ParseError::UnknownName {
                        name,
                        pos: lexeme.pos,
                    },
                )?;
                self.advance();
                self.emit(Token::Name(id));
                Ok(Kind::Reference)
            }
            _ => Err(self.unexpected("a reference or name")),
        }
    }

    /// Arguments and closing parenthesis of a call; the name and `(` are consumed
    fn parse_call(&mut self, name: &str) -> ParseResult<Kind> {
        let upper = name.to_ascii_uppercase();
        let signature = builtin(&upper);
        let is_if = upper == "IF";

        self.union_ok.push(false);
        let args = self.parse_arguments(is_if);
        self.union_ok.pop();
        let (argc, if_at, skip_at) = args?;

        if let Some(sig) = signature {
            if !sig.accepts(argc) {
                return Err(ParseError::ArgumentCount {
                    function: upper,
                    expected: sig.describe_arity(),
                    actual: argc,
                });
            }
            self.volatile |= sig.volatile;
        }

        if let (Some(i), Some(s)) = (if_at, skip_at) {
            self.out[i] = Token::AttrIf(s - i);
            self.out[s] = Token::AttrSkip(self.out.len() - s - 1);
        }

        if upper == "SUM" && argc == 1 {
            self.emit(Token::AttrSum);
        } else {
            let kind = match signature {
                None => FunctionKind::AddIn,
                Some(sig) if sig.is_fixed() => FunctionKind::Fixed,
                Some(_) => FunctionKind::Variable,
            };
            self.emit(Token::Function {
                name: SharedString::from(upper),
                argc,
                kind,
            });
        }
        Ok(Kind::Value)
    }

    /// Returns the argument count and, for IF, where the jump markers sit
    fn parse_arguments(
        &mut self,
        is_if: bool,
    ) -> ParseResult<(usize, Option<usize>, Option<usize>)> {
        let mut argc = 0;
        let mut if_at = None;
        let mut skip_at = None;

        if *self.kind_at(0) == Lex::RParen {
            self.advance();
            return Ok((0, None, None));
        }
        loop {
            if matches!(self.kind_at(0), Lex::Comma | Lex::RParen) {
                self.emit(Token::MissingArg);
            } else {
                self.parse_comparison()?;
            }
            argc += 1;
            if is_if && argc == 1 {
                if_at = Some(self.out.len());
                self.emit(Token::AttrIf(0));
            } else if is_if && argc == 2 {
                skip_at = Some(self.out.len());
                self.emit(Token::AttrSkip(0));
            }
            match self.kind_at(0) {
                Lex::Comma => {
                    self.advance();
                }
                Lex::RParen => {
                    self.advance();
                    return Ok((argc, if_at, skip_at));
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn parse_array(&mut self) -> ParseResult<()> {
        let start = self.peek().pos;
        let mut rows: Vec<Vec<FormulaValue>> = vec![Vec::new()];
        loop {
            let item = self.parse_array_item()?;
            if let Some(row) = rows.last_mut() {
                row.push(item);
            }
            match self.kind_at(0) {
                Lex::Comma => {
                    self.advance();
                }
                Lex::Semicolon => {
                    self.advance();
                    rows.push(Vec::new());
                }
                Lex::RBrace => {
                    self.advance();
                    break;
                }
                _ => return Err(self.unexpected("',', ';' or '}'")),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ParseError::Unexpected {
                expected: "array rows of equal length",
                found: format!("{} rows", rows.len()),
                pos: start,
            });
        }
        self.emit(Token::Array(rows));
        Ok(())
    }

    fn parse_array_item(&mut self) -> ParseResult<FormulaValue> {
        let lexeme = self.advance();
        let value = match lexeme.kind {
            Lex::Minus | Lex::Plus => {
                let negate = lexeme.kind == Lex::Minus;
                let num = self.advance();
                match num.kind {
                    Lex::Number(raw) => {
                        let n = parse_number(&raw, num.pos)?;
                        FormulaValue::Number(if negate { -n } else { n })
                    }
                    other => {
                        return Err(ParseError::Unexpected {
                            expected: "a number",
                            found: other.describe(),
                            pos: num.pos,
                        })
                    }
                }
            }
            Lex::Number(raw) => FormulaValue::Number(parse_number(&raw, lexeme.pos)?),
            Lex::Text(s) => FormulaValue::String(s),
            Lex::Error(e) => FormulaValue::Error(e),
            Lex::Ident(name) if name.eq_ignore_ascii_case("TRUE") => FormulaValue::Boolean(true),
            Lex::Ident(name) if name.eq_ignore_ascii_case("FALSE") => FormulaValue::Boolean(false),
            other => {
                return Err(ParseError::Unexpected {
                    expected: "an array constant",
                    found: other.describe(),
                    pos: lexeme.pos,
                })
            }
        };
        Ok(value)
    }
}

fn parse_number(raw: &str, pos: usize) -> ParseResult<f64> {
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ParseError::Unexpected {
            expected: "a number",
            found: raw.to_string(),
            pos,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBook;
    use pretty_assertions::assert_eq;
    use xlcalc_core::{CellRange, TableDef};

    fn book() -> TestBook {
        let mut book = TestBook::new(&["Sheet1", "Sheet2", "Sheet3", "My Sheet"]);
        book.define_name("Rate", NameScope::Workbook, "=0.5");
        book.define_name("Local", NameScope::Sheet(1), "=Sheet2!$A$1");
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

    fn tokens(text: &str) -> Vec<Token> {
        let book = book();
        parse(text, &ParseContext::new(&book, 0))
            .unwrap()
            .into_tokens()
    }

    fn parse_err(text: &str) -> ParseError {
        let book = book();
        parse(text, &ParseContext::new(&book, 0)).unwrap_err()
    }

    fn cell(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    fn func(name: &str, argc: usize, kind: FunctionKind) -> Token {
        Token::Function {
            name: SharedString::from(name),
            argc,
            kind,
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            tokens("=1+2*3^2"),
            vec![
                Token::Number(1.0),
                Token::Number(2.0),
                Token::Number(3.0),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Power),
                Token::Binary(BinaryOp::Multiply),
                Token::Binary(BinaryOp::Add),
            ]
        );
        // unary minus binds tighter than ^
        assert_eq!(
            tokens("=-2^2"),
            vec![
                Token::Number(2.0),
                Token::Unary(UnaryOp::Minus),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Power),
            ]
        );
        // ^ is left-associative
        assert_eq!(
            tokens("2^3^2"),
            vec![
                Token::Number(2.0),
                Token::Number(3.0),
                Token::Binary(BinaryOp::Power),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Power),
            ]
        );
        assert_eq!(
            tokens("=\"a\"&1<2"),
            vec![
                Token::Text("a".into()),
                Token::Number(1.0),
                Token::Binary(BinaryOp::Concat),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Less),
            ]
        );
    }

    #[test]
    fn test_references() {
        assert_eq!(tokens("=A1"), vec![Token::Ref(cell("A1"))]);
        assert_eq!(
            tokens("=$A$1 : B2"),
            vec![Token::Area(Area::cells(cell("$A$1"), cell("B2")))]
        );
        assert_eq!(
            tokens("=A:$C"),
            vec![Token::Area(Area::columns(0, false, 2, true))]
        );
        assert_eq!(tokens("=1:3"), vec![Token::Area(Area::rows(0, false, 2, false))]);
        assert_eq!(
            tokens("=Sheet2!B2"),
            vec![Token::Ref3d {
                sheets: SheetSpan::single(1),
                cell: cell("B2")
            }]
        );
        assert_eq!(
            tokens("=SUM(Sheet1:Sheet3!A1)"),
            vec![
                Token::Ref3d {
                    sheets: SheetSpan::new(0, 2),
                    cell: cell("A1")
                },
                Token::AttrSum,
            ]
        );
        assert_eq!(
            tokens("='My Sheet'!A1:A2"),
            vec![Token::Area3d {
                sheets: SheetSpan::single(3),
                area: Area::cells(cell("A1"), cell("A2"))
            }]
        );
    }

    #[test]
    fn test_column_beyond_xfd_is_a_name() {
        assert_eq!(tokens("=ABC10"), vec![Token::Ref(cell("ABC10"))]);
        assert_eq!(
            parse_err("=XFE10"),
            ParseError::UnknownName {
                name: "XFE10".into(),
                pos: 1
            }
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(tokens("=Rate*2")[0], Token::Name(0));
        assert_eq!(tokens("=Sheet2!Local"), vec![Token::Name(1)]);
        assert_eq!(tokens("=[0]!Rate"), vec![Token::Name(0)]);
        assert!(matches!(parse_err("=Local"), ParseError::UnknownName { .. }));
    }

    #[test]
    fn test_external_references() {
        assert_eq!(
            tokens("=[1]Sheet1!A1"),
            vec![Token::ExternRef(ExternRef {
                book: 1,
                sheet: Some("Sheet1".into()),
                target: ExternTarget::Cell(cell("A1")),
            })]
        );
        assert_eq!(
            tokens("=[Book2.xlsx]Defines!Name"),
            vec![Token::ExternRef(ExternRef {
                book: 1,
                sheet: Some("Defines".into()),
                target: ExternTarget::Name("Name".into()),
            })]
        );
        assert_eq!(
            tokens("=[1]!GlobalName"),
            vec![Token::ExternRef(ExternRef {
                book: 1,
                sheet: None,
                target: ExternTarget::Name("GlobalName".into()),
            })]
        );
        assert_eq!(
            tokens("='[0]My Sheet'!B1"),
            vec![Token::ExternRef(ExternRef {
                book: 0,
                sheet: Some("My Sheet".into()),
                target: ExternTarget::Cell(cell("B1")),
            })]
        );
        assert!(matches!(
            parse_err("=[7]Sheet1!A1"),
            ParseError::UnknownExternalBook { .. }
        ));
    }

    #[test]
    fn test_if_jump_markers() {
        assert_eq!(
            tokens("=IF(A1,1+2,3)"),
            vec![
                Token::Ref(cell("A1")),
                Token::AttrIf(4),
                Token::Number(1.0),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Add),
                Token::AttrSkip(1),
                Token::Number(3.0),
                func("IF", 3, FunctionKind::Variable),
            ]
        );
        assert_eq!(
            tokens("=IF(TRUE,1)"),
            vec![
                Token::Bool(true),
                Token::AttrIf(2),
                Token::Number(1.0),
                Token::AttrSkip(0),
                func("IF", 2, FunctionKind::Variable),
            ]
        );
    }

    #[test]
    fn test_functions_and_attributes() {
        assert_eq!(
            tokens("=sum(1,2)"),
            vec![
                Token::Number(1.0),
                Token::Number(2.0),
                func("SUM", 2, FunctionKind::Variable),
            ]
        );
        assert_eq!(
            tokens("=NOW()+ABS(-1)"),
            vec![
                Token::AttrVolatile,
                func("NOW", 0, FunctionKind::Fixed),
                Token::Number(1.0),
                Token::Unary(UnaryOp::Minus),
                func("ABS", 1, FunctionKind::Fixed),
                Token::Binary(BinaryOp::Add),
            ]
        );
        assert_eq!(
            tokens("=MyAddIn(1,,)"),
            vec![
                Token::Number(1.0),
                Token::MissingArg,
                Token::MissingArg,
                func("MYADDIN", 3, FunctionKind::AddIn),
            ]
        );
        assert_eq!(
            parse_err("=ABS(1,2)"),
            ParseError::ArgumentCount {
                function: "ABS".into(),
                expected: "1".into(),
                actual: 2
            }
        );
    }

    #[test]
    fn test_union_intersection_and_parens() {
        assert_eq!(
            tokens("=SUM((A1,B1))"),
            vec![
                Token::Ref(cell("A1")),
                Token::Ref(cell("B1")),
                Token::Binary(BinaryOp::Union),
                Token::Paren,
                Token::AttrSum,
            ]
        );
        assert_eq!(
            tokens("=A1:B5 B2:C3"),
            vec![
                Token::Area(Area::cells(cell("A1"), cell("B5"))),
                Token::Area(Area::cells(cell("B2"), cell("C3"))),
                Token::Binary(BinaryOp::Intersect),
            ]
        );
        assert_eq!(
            tokens("=( 1 + 2 ) * 3"),
            vec![
                Token::Number(1.0),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Add),
                Token::Paren,
                Token::Number(3.0),
                Token::Binary(BinaryOp::Multiply),
            ]
        );
    }

    #[test]
    fn test_array_constant() {
        assert_eq!(
            tokens("={1,-2;\"a\",TRUE}"),
            vec![Token::Array(vec![
                vec![FormulaValue::Number(1.0), FormulaValue::Number(-2.0)],
                vec![FormulaValue::String("a".into()), FormulaValue::Boolean(true)],
            ])]
        );
        assert!(parse_err("={1,2;3}").to_string().contains("equal length"));
    }

    #[test]
    fn test_structured_totals_without_totals_row() {
        assert_eq!(tokens("=Table1[#Totals]"), vec![Token::Error(CellError::Ref)]);
        assert_eq!(
            tokens("=Table1[[#Totals],[Qty]]"),
            vec![Token::Error(CellError::Ref)]
        );
        assert_eq!(
            tokens("=SUM(Table1[Qty])"),
            vec![
                Token::Area3d {
                    sheets: SheetSpan::single(0),
                    area: Area::cells(CellAddress::absolute(1, 1), CellAddress::absolute(3, 1)),
                },
                Token::AttrSum,
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_err("="), ParseError::Empty);
        assert!(matches!(parse_err("=1+"), ParseError::Unexpected { .. }));
        assert!(matches!(parse_err("=1 2"), ParseError::Unexpected { pos: 3, .. }));
        assert!(matches!(parse_err("=(1"), ParseError::Unexpected { .. }));
        assert!(matches!(parse_err("=Nope!A1"), ParseError::UnknownSheet { .. }));
    }
}
