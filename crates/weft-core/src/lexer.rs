//! Lexer (C1): source text → token stream with locations.
//!
//! Single pass, no lookahead beyond one character. Whitespace and `//` line
//! comments are discarded without producing tokens.

use std::{iter::Peekable, str::CharIndices};

use crate::{
    error::{LexError, LexErrorKind},
    span::{Location, Span},
};

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Ident(String),

    // keywords
    KwSpindle,
    KwReturn,

    // punctuation / operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
    Arrow,
    DotDot,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eq,

    Eof,
}

/// Tokenizes `source`, returning the full token stream (terminated by a
/// trailing [`TokenKind::Eof`]) or the first lexical error encountered.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    /// Byte offset, line, column of the position last returned by `bump`.
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, start: Location) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.here()),
        });
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            self.skip_trivia();
            let start = self.here();
            let Some(c) = self.peek_char() else {
                self.push(TokenKind::Eof, start);
                return Ok(self.tokens);
            };

            if c.is_ascii_digit() {
                self.lex_number(start)?;
                continue;
            }
            if c == '_' || c.is_alphabetic() {
                self.lex_ident_or_keyword(start);
                continue;
            }
            if c == '"' {
                self.lex_string(start)?;
                continue;
            }

            self.bump();
            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => {
                    if self.bump_if('>') {
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                }
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '^' => TokenKind::Caret,
                '=' => {
                    if self.bump_if('=') {
                        TokenKind::EqEq
                    } else {
                        TokenKind::Eq
                    }
                }
                '!' => {
                    if self.bump_if('=') {
                        TokenKind::NotEq
                    } else {
                        TokenKind::Bang
                    }
                }
                '<' => {
                    if self.bump_if('=') {
                        TokenKind::LtEq
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    if self.bump_if('=') {
                        TokenKind::GtEq
                    } else {
                        TokenKind::Gt
                    }
                }
                '&' => {
                    if self.bump_if('&') {
                        TokenKind::AndAnd
                    } else {
                        return Err(LexError {
                            kind: LexErrorKind::UnexpectedChar('&'),
                            location: start,
                        });
                    }
                }
                '|' => {
                    if self.bump_if('|') {
                        TokenKind::OrOr
                    } else {
                        return Err(LexError {
                            kind: LexErrorKind::UnexpectedChar('|'),
                            location: start,
                        });
                    }
                }
                '~' => TokenKind::Tilde,
                '.' => {
                    // `..` is always the range operator, never the start of a
                    // decimal: a bare `.` followed immediately by another `.`
                    // can't be a fractional number since digits lex `lex_number`.
                    if self.bump_if('.') {
                        TokenKind::DotDot
                    } else {
                        TokenKind::Dot
                    }
                }
                ',' => TokenKind::Comma,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                other => {
                    return Err(LexError {
                        kind: LexErrorKind::UnexpectedChar(other),
                        location: start,
                    });
                }
            };
            self.push(kind, start);
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    // Only a comment if followed by a second `/`; otherwise
                    // this is the division operator and trivia-skipping stops.
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some((_, '/'))) {
                        while !matches!(self.peek_char(), Some('\n') | None) {
                            self.bump();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_number(&mut self, start: Location) -> Result<(), LexError> {
        let start_byte = self.chars.peek().map_or(self.source.len(), |&(i, _)| i);
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        // A `.` starts a fractional part only when NOT immediately followed
        // by another `.` (that's the range operator, see §4.1).
        if self.peek_char() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if !matches!(lookahead.peek(), Some((_, '.'))) {
                self.bump();
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let has_sign = matches!(lookahead.peek(), Some((_, '+' | '-')));
            if has_sign {
                lookahead.next();
            }
            if matches!(lookahead.peek(), Some((_, c)) if c.is_ascii_digit()) {
                self.bump();
                if has_sign {
                    self.bump();
                }
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let end_byte = self.chars.peek().map_or(self.source.len(), |&(i, _)| i);
        let text = &self.source[start_byte..end_byte];
        let value: f64 = text.parse().map_err(|_| LexError {
            kind: LexErrorKind::InvalidNumber,
            location: start,
        })?;
        self.push(TokenKind::Number(value), start);
        Ok(())
    }

    fn lex_ident_or_keyword(&mut self, start: Location) {
        let start_byte = self.chars.peek().map_or(self.source.len(), |&(i, _)| i);
        while matches!(self.peek_char(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.bump();
        }
        let end_byte = self.chars.peek().map_or(self.source.len(), |&(i, _)| i);
        let text = &self.source[start_byte..end_byte];
        let kind = match text {
            "spindle" => TokenKind::KwSpindle,
            "return" => TokenKind::KwReturn,
            _ => TokenKind::Ident(text.to_owned()),
        };
        self.push(kind, start);
    }

    fn lex_string(&mut self, start: Location) -> Result<(), LexError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedString,
                        location: start,
                    });
                }
                Some('"') => break,
                Some('\\') => {
                    let escape_loc = self.here();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(other) => {
                            return Err(LexError {
                                kind: LexErrorKind::InvalidEscape(other),
                                location: escape_loc,
                            });
                        }
                        None => {
                            return Err(LexError {
                                kind: LexErrorKind::UnterminatedString,
                                location: start,
                            });
                        }
                    }
                }
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::String(value), start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn dotdot_is_never_a_decimal() {
        assert_eq!(kinds("1..2"), vec![
            TokenKind::Number(1.0),
            TokenKind::DotDot,
            TokenKind::Number(2.0),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn fractional_number() {
        assert_eq!(kinds("3.5"), vec![TokenKind::Number(3.5), TokenKind::Eof]);
    }

    #[test]
    fn line_comment_discarded() {
        assert_eq!(kinds("1 // comment\n2"), vec![
            TokenKind::Number(1.0),
            TokenKind::Number(2.0),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn keywords_recognized() {
        assert_eq!(kinds("spindle return"), vec![
            TokenKind::KwSpindle,
            TokenKind::KwReturn,
            TokenKind::Eof
        ]);
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(kinds(r#""a\nb""#), vec![TokenKind::String("a\nb".to_owned()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_errors() {
        let err = lex("\"abc").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn division_not_confused_with_comment() {
        assert_eq!(kinds("a / b"), vec![
            TokenKind::Ident("a".to_owned()),
            TokenKind::Slash,
            TokenKind::Ident("b".to_owned()),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn arrow_and_remap_glyphs() {
        assert_eq!(kinds("-> ~ .."), vec![TokenKind::Arrow, TokenKind::Tilde, TokenKind::DotDot, TokenKind::Eof]);
    }
}
