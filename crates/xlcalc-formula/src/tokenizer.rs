//! Formula text scanner
//!
//! Splits formula text into lexemes. References are not interpreted here:
//! `A1`, `Sheet1`, `SUM` and `Table1` all come out as identifiers and the
//! parser decides what they mean.

use xlcalc_core::CellError;

use crate::error::{ParseError, ParseResult};

/// Lexeme kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Lex {
    /// Numeric literal, raw text kept for row references (`1:3`)
    Number(String),
    /// String literal with `""` escapes removed
    Text(String),
    /// Error literal (`#REF!`)
    Error(CellError),
    /// Name-like run: letters, digits, `. _ \ ?` after the first character;
    /// `$` only as an absolute marker in `$A$1`, `$A` or `$1`
    Ident(String),
    /// `'Sheet Name'` with `''` escapes removed
    QuotedSheet(String),
    /// Contents of a `[...]` block, nested brackets kept verbatim
    Bracket(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Colon,
    Comma,
    Semicolon,
    Bang,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
}

impl Lex {
    /// Short description used in "expected ..., found ..." errors
    pub fn describe(&self) -> String {
        match self {
            Lex::Number(n) => n.clone(),
            Lex::Text(s) => format!("\"{}\"", s),
            Lex::Error(e) => e.to_string(),
            Lex::Ident(s) => s.clone(),
            Lex::QuotedSheet(s) => format!("'{}'", s),
            Lex::Bracket(s) => format!("[{}]", s),
            Lex::Eof => "end of formula".to_string(),
            other => other.symbol().to_string(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Lex::Plus => "+",
            Lex::Minus => "-",
            Lex::Star => "*",
            Lex::Slash => "/",
            Lex::Caret => "^",
            Lex::Percent => "%",
            Lex::Amp => "&",
            Lex::Eq => "=",
            Lex::Ne => "<>",
            Lex::Lt => "<",
            Lex::Le => "<=",
            Lex::Gt => ">",
            Lex::Ge => ">=",
            Lex::Colon => ":",
            Lex::Comma => ",",
            Lex::Semicolon => ";",
            Lex::Bang => "!",
            Lex::LParen => "(",
            Lex::RParen => ")",
            Lex::LBrace => "{",
            Lex::RBrace => "}",
            _ => "",
        }
    }
}

/// A lexeme with its byte position
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: Lex,
    pub pos: usize,
    /// Whitespace separates this lexeme from the previous one
    pub space_before: bool,
}

/// Split formula text into lexemes, ending with [`Lex::Eof`]
///
/// A leading `=` is accepted and skipped.
pub fn tokenize(text: &str) -> ParseResult<Vec<Lexeme>> {
    let mut scanner = Scanner {
        src: text,
        pos: 0,
    };
    if text.trim_start().starts_with('=') {
        scanner.pos = text.len() - text.trim_start().len() + 1;
    }

    let mut out = Vec::new();
    loop {
        let space_before = scanner.skip_whitespace();
        let pos = scanner.pos;
        let kind = scanner.next_lex()?;
        let done = kind == Lex::Eof;
        out.push(Lexeme {
            kind,
            pos,
            space_before,
        });
        if done {
            return Ok(out);
        }
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '\\' | '?' | '$')
}

/// `$`-marked cell, column or row reference: `$A$1`, `A$1`, `$A`, `$1`
fn is_absolute_reference(s: &str) -> bool {
    let rest = s.strip_prefix('$').unwrap_or(s);
    let letters = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
    let rest = &rest[letters..];
    let rest = match rest.strip_prefix('$') {
        Some(digits) if letters > 0 && !digits.is_empty() => digits,
        Some(_) => return false,
        None => rest,
    };
    rest.bytes().all(|b| b.is_ascii_digit()) && (letters > 0 || !rest.is_empty())
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
        self.pos > start
    }

    fn next_lex(&mut self) -> ParseResult<Lex> {
        let start = self.pos;
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(Lex::Eof),
        };

        let lex = match c {
            '+' => Lex::Plus,
            '-' => Lex::Minus,
            '*' => Lex::Star,
            '/' => Lex::Slash,
            '^' => Lex::Caret,
            '%' => Lex::Percent,
            '&' => Lex::Amp,
            '=' => Lex::Eq,
            ':' => Lex::Colon,
            ',' => Lex::Comma,
            ';' => Lex::Semicolon,
            '!' => Lex::Bang,
            '(' => Lex::LParen,
            ')' => Lex::RParen,
            '{' => Lex::LBrace,
            '}' => Lex::RBrace,
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    Lex::Le
                }
                Some('>') => {
                    self.bump();
                    Lex::Ne
                }
                _ => Lex::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Lex::Ge
                } else {
                    Lex::Gt
                }
            }
            '"' => Lex::Text(self.quoted('"', start)?),
            '\'' => Lex::QuotedSheet(self.quoted('\'', start)?),
            '[' => Lex::Bracket(self.bracket(start)?),
            '#' => {
                self.pos = start;
                self.error_literal(start)?
            }
            c if c.is_ascii_digit()
                || (c == '.' && self.peek().is_some_and(|n| n.is_ascii_digit())) =>
            {
                self.pos = start;
                self.number()
            }
            c if is_ident_start(c) => {
                while matches!(self.peek(), Some(c) if is_ident_char(c)) {
                    self.bump();
                }
                let ident = &self.src[start..self.pos];
                if ident.contains('$') && !is_absolute_reference(ident) {
                    return Err(ParseError::Unexpected {
                        expected: "a name or reference",
                        found: ident.to_string(),
                        pos: start,
                    });
                }
                Lex::Ident(ident.to_string())
            }
            other => {
                return Err(ParseError::Unexpected {
                    expected: "an operand or operator",
                    found: other.to_string(),
                    pos: start,
                })
            }
        };
        Ok(lex)
    }

    /// Body of a `"..."` or `'...'` literal; a doubled quote is an escape
    fn quoted(&mut self, quote: char, start: usize) -> ParseResult<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
                None => return Err(ParseError::UnterminatedString { pos: start }),
            }
        }
    }

    /// Body of a `[...]` block. Nested brackets are kept; `'` escapes the
    /// next character.
    fn bracket(&mut self, start: usize) -> ParseResult<String> {
        let body_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.bump() {
                Some('\'') => {
                    if self.bump().is_none() {
                        return Err(ParseError::UnbalancedBracket { pos: start });
                    }
                }
                Some('[') => depth += 1,
                Some(']') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.src[body_start..self.pos - 1].to_string());
                    }
                }
                Some(_) => {}
                None => return Err(ParseError::UnbalancedBracket { pos: start }),
            }
        }
    }

    fn error_literal(&mut self, start: usize) -> ParseResult<Lex> {
        let rest = self.rest();
        for err in CellError::ALL {
            let lit = err.as_str();
            if rest.len() >= lit.len()
                && rest.is_char_boundary(lit.len())
                && rest[..lit.len()].eq_ignore_ascii_case(lit)
            {
                self.pos += lit.len();
                return Ok(Lex::Error(err));
            }
        }
        Err(ParseError::Unexpected {
            expected: "an error literal",
            found: rest.chars().take(8).collect(),
            pos: start,
        })
    }

    fn number(&mut self) -> Lex {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    self.bump();
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        Lex::Number(self.src[start..self.pos].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Lex> {
        tokenize(text).unwrap().into_iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("=1.5e3<>\"a\"\"b\"&#N/A"),
            vec![
                Lex::Number("1.5e3".into()),
                Lex::Ne,
                Lex::Text("a\"b".into()),
                Lex::Amp,
                Lex::Error(CellError::Na),
                Lex::Eof
            ]
        );
    }

    #[test]
    fn test_sheet_and_bracket_tokens() {
        assert_eq!(
            kinds("'It''s'!A1+[1]Data!$B$2+T[[#Totals],[a']b]]"),
            vec![
                Lex::QuotedSheet("It's".into()),
                Lex::Bang,
                Lex::Ident("A1".into()),
                Lex::Plus,
                Lex::Bracket("1".into()),
                Lex::Ident("Data".into()),
                Lex::Bang,
                Lex::Ident("$B$2".into()),
                Lex::Plus,
                Lex::Ident("T".into()),
                Lex::Bracket("[#Totals],[a']b]".into()),
                Lex::Eof
            ]
        );
    }

    #[test]
    fn test_dollar_only_marks_references() {
        assert_eq!(
            kinds("$A$1+A$2+$B3"),
            vec![
                Lex::Ident("$A$1".into()),
                Lex::Plus,
                Lex::Ident("A$2".into()),
                Lex::Plus,
                Lex::Ident("$B3".into()),
                Lex::Eof
            ]
        );
        assert_eq!(
            kinds("$A:$C,$1:$3"),
            vec![
                Lex::Ident("$A".into()),
                Lex::Colon,
                Lex::Ident("$C".into()),
                Lex::Comma,
                Lex::Ident("$1".into()),
                Lex::Colon,
                Lex::Ident("$3".into()),
                Lex::Eof
            ]
        );
        for bad in ["=$$x", "=Rate$", "=$A$1$", "=A1$x", "=$", "=$Total.2"] {
            assert!(
                matches!(tokenize(bad), Err(ParseError::Unexpected { pos: 1, .. })),
                "{bad} should not lex"
            );
        }
        assert_eq!(kinds("a.b?"), vec![Lex::Ident("a.b?".into()), Lex::Eof]);
        assert!(tokenize("=?a").is_err());
        assert!(tokenize("=.a").is_err());
    }

    #[test]
    fn test_whitespace_flag() {
        let lexes = tokenize("A1:B2 C1").unwrap();
        assert!(!lexes[1].space_before);
        assert!(lexes[3].space_before);
        assert_eq!(lexes[3].pos, 6);
    }

    #[test]
    fn test_commas_inside_strings() {
        assert_eq!(
            kinds("CONCAT(\"a,b\",1)"),
            vec![
                Lex::Ident("CONCAT".into()),
                Lex::LParen,
                Lex::Text("a,b".into()),
                Lex::Comma,
                Lex::Number("1".into()),
                Lex::RParen,
                Lex::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_literals() {
        assert_eq!(
            tokenize("=\"abc"),
            Err(ParseError::UnterminatedString { pos: 1 })
        );
        assert_eq!(
            tokenize("=T[[a]"),
            Err(ParseError::UnbalancedBracket { pos: 2 })
        );
        assert!(tokenize("=#BOGUS").is_err());
    }
}
