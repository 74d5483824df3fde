//! Lexical analysis for Dachs source code.
//!
//! The lexer turns UTF-8 source text into a positioned token stream. Dachs
//! separators are newline-sensitive, so end-of-line is a token of its own
//! rather than skipped whitespace; `#` comments are skipped. Every token
//! carries a byte-addressed [`Span`] which the parser uses both for node
//! locations and for the adjacency checks required by postfix invocations
//! without parentheses.

mod token;

pub use token::*;

use std::collections::HashMap;
use std::{error::Error, fmt::Display};

use once_cell::sync::Lazy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError(String);

impl LexError {
    fn at(line: usize, col: usize, msg: impl Display) -> Self {
        LexError(format!("{msg} at line:{line}, col:{col}"))
    }
}

pub type LexResult<T> = Result<T, LexError>;

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Error for LexError {}

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    use Keyword::*;
    [
        If,
        Unless,
        Case,
        When,
        Then,
        Else,
        Elseif,
        End,
        For,
        In,
        Do,
        Begin,
        Ensure,
        Ret,
        Var,
        Func,
        Proc,
        Init,
        Copy,
        Cast,
        Class,
        Import,
        Let,
        New,
        As,
        Typeof,
        StaticArray,
        Pointer,
    ]
    .into_iter()
    .map(|k| (k.as_str(), k))
    .collect()
});

/// Multi-character operators, longest first so that e.g. `<<=` wins over `<<`.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "&&=", "||=", "...", "..", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "*=",
    "/=", "%=", "+=", "-=", "&=", "^=", "|=", "->", "=>", "+", "-", "*", "/", "%", "<", ">", "&",
    "^", "|", "~", "!", "=", ".", ",", ";", "(", ")", "[", "]", "{", "}", "?",
];

fn is_symbol_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"=*/%+><&^|!~_-".contains(&c)
}

pub struct Lexer<'a> {
    tokens: Vec<Token>,
    position: usize,
    col: usize,
    line: usize,
    input: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: vec![],
            position: 0,
            col: 1,
            line: 1,
            input,
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.input.as_bytes().get(self.position + ahead).copied()
    }

    fn rest(&self) -> &str {
        &self.input[self.position..]
    }

    fn span_from(&self, start_offset: usize, start_line: usize, start_col: usize) -> Span {
        Span {
            line: start_line,
            col: start_col,
            offset: start_offset,
            len: self.position - start_offset,
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.position += bytes;
        self.col += bytes;
    }

    /// Skip spaces, tabs, carriage returns and `#` comments. Newlines are
    /// tokens, not whitespace.
    fn eat_whitespace(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                b' ' | b'\t' | b'\r' => self.advance(1),
                b'#' => {
                    while let Some(c) = self.peek(0) {
                        if c == b'\n' {
                            break;
                        }
                        self.advance(1);
                    }
                }
                _ => return,
            }
        }
    }

    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        loop {
            self.eat_whitespace();
            let Some(c) = self.peek(0) else {
                break;
            };

            let (start, line, col) = (self.position, self.line, self.col);

            match c {
                b'\n' => {
                    self.position += 1;
                    let span = Span {
                        line,
                        col,
                        offset: start,
                        len: 1,
                    };
                    self.tokens.push(Token::new(TokenKind::Eol, span));
                    self.line += 1;
                    self.col = 1;
                }
                b'@' | b'_' => self.lex_identifier()?,
                c if c.is_ascii_alphabetic() => self.lex_identifier()?,
                c if c.is_ascii_digit() => self.lex_number()?,
                b'\'' => self.lex_char()?,
                b'"' => self.lex_string()?,
                b':' => self.lex_colon()?,
                _ => {
                    let Some(op) = OPERATORS.iter().find(|op| self.rest().starts_with(**op))
                    else {
                        return Err(LexError::at(
                            line,
                            col,
                            format!("Failed to lex '{}'", c as char),
                        ));
                    };
                    self.advance(op.len());
                    let span = self.span_from(start, line, col);
                    self.tokens.push(Token::new(operator_kind(op), span));
                }
            }
        }

        Ok(self.tokens)
    }

    fn lex_identifier(&mut self) -> LexResult<()> {
        let (start, line, col) = (self.position, self.line, self.col);

        let at_prefixed = self.peek(0) == Some(b'@');
        if at_prefixed {
            self.advance(1);
        }

        let core_start = self.position;
        match self.peek(0) {
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.advance(1),
            _ => return Err(LexError::at(line, col, "'@' must be followed by a name")),
        }
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance(1);
            } else {
                break;
            }
        }
        let core = &self.input[core_start..self.position];

        let mut suffixed = false;
        if self.peek(0) == Some(b'?') {
            self.advance(1);
            suffixed = true;
        }
        while self.peek(0) == Some(b'\'') {
            // A quote only belongs to the name when it is not opening a
            // character literal (e.g. `f('x')`).
            let next = self.peek(1);
            let closes_char = matches!(self.peek(2), Some(b'\''));
            if next.is_some() && closes_char {
                break;
            }
            self.advance(1);
            suffixed = true;
        }
        if self.peek(0) == Some(b'!') && self.peek(1) != Some(b'=') {
            self.advance(1);
            suffixed = true;
        }

        let span = self.span_from(start, line, col);
        let text = &self.input[start..self.position];

        let kind = if !at_prefixed && !suffixed {
            match core {
                "true" => TokenKind::Bool(true),
                "false" => TokenKind::Bool(false),
                _ => match KEYWORDS.get(core) {
                    Some(kw) => TokenKind::Keyword(*kw),
                    None => TokenKind::Ident(text.to_string()),
                },
            }
        } else {
            TokenKind::Ident(text.to_string())
        };

        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let (start, line, col) = (self.position, self.line, self.col);

        let (radix, digits_start): (u32, usize) = match (self.peek(0), self.peek(1)) {
            (Some(b'0'), Some(b'x')) => (16, 2),
            (Some(b'0'), Some(b'b')) => (2, 2),
            (Some(b'0'), Some(b'o')) => (8, 2),
            _ => (10, 0),
        };
        self.advance(digits_start);

        let digits_at = self.position;
        while let Some(c) = self.peek(0) {
            if (c as char).is_digit(radix) {
                self.advance(1);
            } else {
                break;
            }
        }
        if self.position == digits_at {
            return Err(LexError::at(line, col, "Expected digits in numeric literal"));
        }

        // A dot makes a float only when digits follow it directly; `0..3`
        // keeps the integer and leaves the range operator alone.
        if radix == 10
            && self.peek(0) == Some(b'.')
            && self.peek(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance(1);
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    self.advance(1);
                } else {
                    break;
                }
            }
            let span = self.span_from(start, line, col);
            let value: f64 = self.input[start..self.position]
                .parse()
                .map_err(|e| LexError::at(line, col, format!("Invalid float literal: {e}")))?;
            self.tokens.push(Token::new(TokenKind::Float(value), span));
            return Ok(());
        }

        let value = u64::from_str_radix(&self.input[digits_at..self.position], radix)
            .map_err(|e| LexError::at(line, col, format!("Invalid integer literal: {e}")))?;

        let unsigned = self.peek(0) == Some(b'u');
        if unsigned {
            self.advance(1);
        }
        if let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' {
                return Err(LexError::at(
                    line,
                    col,
                    format!("Invalid character '{}' in numeric literal", c as char),
                ));
            }
        }

        let span = self.span_from(start, line, col);
        let kind = if unsigned {
            TokenKind::Uint(value)
        } else {
            TokenKind::Int(value)
        };
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn unescape(&mut self, line: usize, col: usize, in_string: bool) -> LexResult<char> {
        self.advance(1); // backslash
        let Some(c) = self.peek(0) else {
            return Err(LexError::at(line, col, "Unterminated escape sequence"));
        };
        self.advance(1);
        Ok(match c {
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'v' => '\u{b}',
            b'e' => '\u{1b}',
            b'0' => '\0',
            b'\\' => '\\',
            b'\'' => '\'',
            b'"' if in_string => '"',
            other => {
                return Err(LexError::at(
                    line,
                    col,
                    format!("Invalid escape sequence '\\{}'", other as char),
                ))
            }
        })
    }

    fn lex_char(&mut self) -> LexResult<()> {
        let (start, line, col) = (self.position, self.line, self.col);
        self.advance(1); // opening quote

        let value = match self.peek(0) {
            Some(b'\\') => self.unescape(line, col, false)?,
            Some(c) if !c.is_ascii_control() && c != b'\'' => {
                self.advance(1);
                c as char
            }
            _ => return Err(LexError::at(line, col, "Invalid character literal")),
        };

        if self.peek(0) != Some(b'\'') {
            return Err(LexError::at(line, col, "Unterminated character literal"));
        }
        self.advance(1);

        let span = self.span_from(start, line, col);
        self.tokens.push(Token::new(TokenKind::Char(value), span));
        Ok(())
    }

    fn lex_string(&mut self) -> LexResult<()> {
        let (start, line, col) = (self.position, self.line, self.col);
        self.advance(1); // opening quote

        let mut value = String::new();
        loop {
            match self.peek(0) {
                Some(b'"') => {
                    self.advance(1);
                    break;
                }
                Some(b'\\') => value.push(self.unescape(line, col, true)?),
                Some(b'\n') | None => {
                    return Err(LexError::at(line, col, "Unterminated string literal"))
                }
                Some(c) if c.is_ascii_control() => {
                    return Err(LexError::at(line, col, "Control character in string literal"))
                }
                Some(_) => {
                    // Consume one UTF-8 scalar, not one byte.
                    let ch = self.rest().chars().next().unwrap();
                    value.push(ch);
                    self.advance(ch.len_utf8());
                }
            }
        }

        let span = self.span_from(start, line, col);
        self.tokens.push(Token::new(TokenKind::Str(value), span));
        Ok(())
    }

    fn lex_colon(&mut self) -> LexResult<()> {
        let (start, line, col) = (self.position, self.line, self.col);

        // `:=` is the initialize operator, unless it opens the symbol
        // literal of an operator name (`:==`).
        if self.peek(1) == Some(b'=') && self.peek(2) != Some(b'=') {
            self.advance(2);
            let span = self.span_from(start, line, col);
            self.tokens.push(Token::new(TokenKind::ColonEq, span));
            return Ok(());
        }

        if self.peek(1).is_some_and(is_symbol_char) {
            self.advance(1);
            let name_start = self.position;
            while self.peek(0).is_some_and(is_symbol_char) {
                self.advance(1);
            }
            let name = self.input[name_start..self.position].to_string();
            let span = self.span_from(start, line, col);
            self.tokens.push(Token::new(TokenKind::Symbol(name), span));
            return Ok(());
        }

        self.advance(1);
        let span = self.span_from(start, line, col);
        self.tokens.push(Token::new(TokenKind::Colon, span));
        Ok(())
    }
}

fn operator_kind(op: &str) -> TokenKind {
    match op {
        "+" => TokenKind::Plus,
        "-" => TokenKind::Minus,
        "*" => TokenKind::Star,
        "/" => TokenKind::Slash,
        "%" => TokenKind::Percent,
        "<<" => TokenKind::Shl,
        ">>" => TokenKind::Shr,
        "<=" => TokenKind::Le,
        ">=" => TokenKind::Ge,
        "<" => TokenKind::Lt,
        ">" => TokenKind::Gt,
        "==" => TokenKind::EqEq,
        "!=" => TokenKind::Ne,
        "&&" => TokenKind::AndAnd,
        "||" => TokenKind::OrOr,
        "&" => TokenKind::Amp,
        "^" => TokenKind::Caret,
        "|" => TokenKind::Pipe,
        "~" => TokenKind::Tilde,
        "!" => TokenKind::Bang,
        "->" => TokenKind::Arrow,
        "=>" => TokenKind::FatArrow,
        "." => TokenKind::Dot,
        ".." => TokenKind::DotDot,
        "..." => TokenKind::DotDotDot,
        "," => TokenKind::Comma,
        ";" => TokenKind::Semicolon,
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "[" => TokenKind::LBracket,
        "]" => TokenKind::RBracket,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        "?" => TokenKind::Question,
        "=" | "*=" | "/=" | "%=" | "+=" | "-=" | "<<=" | ">>=" | "&=" | "^=" | "|=" | "&&="
        | "||=" => TokenKind::Assign(op.to_string()),
        _ => unreachable!("unknown operator {op}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .lex()
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_identifier_with_suffixes() {
        assert_eq!(kinds("empty?"), vec![TokenKind::Ident("empty?".into())]);
        assert_eq!(kinds("f'"), vec![TokenKind::Ident("f'".into())]);
        assert_eq!(kinds("push!"), vec![TokenKind::Ident("push!".into())]);
        assert_eq!(kinds("@value"), vec![TokenKind::Ident("@value".into())]);
    }

    #[test]
    fn test_lex_keywords_need_boundary() {
        assert_eq!(kinds("end"), vec![TokenKind::Keyword(Keyword::End)]);
        assert_eq!(kinds("endif"), vec![TokenKind::Ident("endif".into())]);
    }

    #[test]
    fn test_lex_integer_bases() {
        assert_eq!(kinds("0x10"), vec![TokenKind::Int(16)]);
        assert_eq!(kinds("0b101"), vec![TokenKind::Int(5)]);
        assert_eq!(kinds("0o17"), vec![TokenKind::Int(15)]);
        assert_eq!(kinds("42u"), vec![TokenKind::Uint(42)]);
    }

    #[test]
    fn test_lex_float_vs_range() {
        assert_eq!(kinds("3.14"), vec![TokenKind::Float(3.14)]);
        assert_eq!(
            kinds("0..3"),
            vec![TokenKind::Int(0), TokenKind::DotDot, TokenKind::Int(3)]
        );
        assert_eq!(
            kinds("0...3"),
            vec![TokenKind::Int(0), TokenKind::DotDotDot, TokenKind::Int(3)]
        );
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\"c""#),
            vec![TokenKind::Str("a\tb\"c".into())]
        );
    }

    #[test]
    fn test_lex_newline_in_string_fails() {
        assert!(Lexer::new("\"ab\ncd\"").lex().is_err());
    }

    #[test]
    fn test_unknown_escape_fails_in_both_literal_kinds() {
        assert!(Lexer::new(r#""a\qb""#).lex().is_err());
        assert!(Lexer::new(r"'\q'").lex().is_err());
    }

    #[test]
    fn test_lex_symbol_literal() {
        assert_eq!(kinds(":foo"), vec![TokenKind::Symbol("foo".into())]);
        assert_eq!(kinds(":=="), vec![TokenKind::Symbol("==".into())]);
        assert_eq!(kinds(":<=>"), vec![TokenKind::Symbol("<=>".into())]);
    }

    #[test]
    fn test_lex_initialize_operator() {
        assert_eq!(
            kinds("x := 1"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::ColonEq,
                TokenKind::Int(1)
            ]
        );
    }

    #[test]
    fn test_lex_char_literal() {
        assert_eq!(kinds("'a'"), vec![TokenKind::Char('a')]);
        assert_eq!(kinds(r"'\n'"), vec![TokenKind::Char('\n')]);
        assert_eq!(kinds(r"'\0'"), vec![TokenKind::Char('\0')]);
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = Lexer::new("a\nbb").lex().unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, col: 1, offset: 0, len: 1 });
        assert_eq!(tokens[1].kind, TokenKind::Eol);
        assert_eq!(tokens[2].span, Span { line: 2, col: 1, offset: 2, len: 2 });
    }

    #[test]
    fn test_space_before() {
        let tokens = Lexer::new("p 42").lex().unwrap();
        assert!(tokens[0].span.space_before(&tokens[1].span));
        let tokens = Lexer::new("p(42)").lex().unwrap();
        assert!(!tokens[0].span.space_before(&tokens[1].span));
    }
}
