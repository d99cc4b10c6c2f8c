use std::fmt;

use crate::token::{Literal, SourcePos, Span, Token, TokenKind, keyword};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Character that cannot start any token.
    UnexpectedCharacter(char),
    /// A single `&` not followed by a second one.
    UnpairedAmpersand,
    /// A single `|` not followed by a second one.
    UnpairedPipe,
    /// Decimal literal that does not fit in an `i64`.
    IntegerOutOfRange,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedCharacter(_) => write!(f, "Unexpected character."),
            Self::UnpairedAmpersand => write!(f, "Unexpected '&' without pair."),
            Self::UnpairedPipe => write!(f, "Unexpected '|' without pair."),
            Self::IntegerOutOfRange => write!(f, "Integer literal out of range."),
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Line {}, col {}: {kind}", span.pos.line, span.pos.col)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

/// Tokenize a source string in one step.
///
/// # Errors
///
/// Returns every lexical error found. Scanning never stops early, so the
/// list covers the whole input.
pub fn tokenize(input: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let mut lexer = Lexer::new(input);
    let tokens = lexer.scan_tokens();
    if lexer.diagnostics().is_empty() {
        Ok(tokens)
    } else {
        Err(lexer.diagnostics().to_vec())
    }
}

/// Single-pass scanner turning source text into tokens.
///
/// Errors are collected rather than returned: scanning always runs to the
/// end of input and the token list always ends with an `Eof` token.
pub struct Lexer {
    source: String,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
    scanned: bool,
    start: usize,
    start_pos: SourcePos,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let pos = if source.as_bytes().starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
            scanned: false,
            start: pos,
            start_pos: SourcePos::default(),
            pos,
            line: 1,
            col: 1,
        }
    }

    /// Scan the full input. Repeated calls return the same tokens.
    pub fn scan_tokens(&mut self) -> Vec<Token> {
        if !self.scanned {
            while !self.is_at_end() {
                self.start = self.pos;
                self.start_pos = SourcePos {
                    line: self.line,
                    col: self.col,
                };
                self.scan_token();
            }

            let eof = Span::new(
                self.pos,
                self.pos,
                SourcePos {
                    line: self.line,
                    col: self.col,
                },
            );
            self.tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                literal: Literal::None,
                span: eof,
            });
            self.scanned = true;

            tracing::debug!(
                tokens = self.tokens.len(),
                errors = self.errors.len(),
                "scanned source"
            );
        }
        self.tokens.clone()
    }

    /// Rendered error messages, one per problem, in source order.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[LexError] {
        &self.errors
    }

    fn scan_token(&mut self) {
        let Some(ch) = self.advance() else {
            return;
        };

        match ch {
            b'(' => self.add_token(TokenKind::LeftParen),
            b')' => self.add_token(TokenKind::RightParen),
            b'{' => self.add_token(TokenKind::LeftBrace),
            b'}' => self.add_token(TokenKind::RightBrace),
            b';' => self.add_token(TokenKind::Semicolon),
            b',' => self.add_token(TokenKind::Comma),
            b'+' => self.add_token(TokenKind::Plus),
            b'-' => self.add_token(TokenKind::Minus),
            b'*' => self.add_token(TokenKind::Star),
            b'!' => self.add_either(b'=', TokenKind::BangEqual, TokenKind::Bang),
            b'=' => self.add_either(b'=', TokenKind::EqualEqual, TokenKind::Equal),
            b'<' => self.add_either(b'=', TokenKind::LessEqual, TokenKind::Less),
            b'>' => self.add_either(b'=', TokenKind::GreaterEqual, TokenKind::Greater),
            b'&' => {
                if self.match_byte(b'&') {
                    self.add_token(TokenKind::AndAnd);
                } else {
                    self.add_error(LexErrorKind::UnpairedAmpersand);
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    self.add_token(TokenKind::OrOr);
                } else {
                    self.add_error(LexErrorKind::UnpairedPipe);
                }
            }
            b'/' => {
                if self.match_byte(b'/') {
                    // line comment, the newline itself is left for the next pass
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            b' ' | b'\r' | b'\t' | b'\n' => {}
            c if c.is_ascii_digit() => self.scan_number(),
            c if is_ident_start(c) => self.scan_identifier(),
            c if c.is_ascii() => {
                self.add_error(LexErrorKind::UnexpectedCharacter(char::from(c)));
            }
            _ => self.skip_non_ascii(),
        }
    }

    fn scan_number(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        match self.current_lexeme().parse::<i64>() {
            Ok(value) => self.add_literal(TokenKind::Number, Literal::Integer(value)),
            Err(_) => {
                self.add_error(LexErrorKind::IntegerOutOfRange);
                self.add_token(TokenKind::Number);
            }
        }
    }

    fn scan_identifier(&mut self) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }

        match keyword(self.current_lexeme()) {
            Some(TokenKind::True) => self.add_literal(TokenKind::True, Literal::Boolean(true)),
            Some(TokenKind::False) => self.add_literal(TokenKind::False, Literal::Boolean(false)),
            Some(kind) => self.add_token(kind),
            None => self.add_token(TokenKind::Identifier),
        }
    }

    /// Consume the remaining bytes of a multi-byte character so it is
    /// reported once rather than once per byte.
    fn skip_non_ascii(&mut self) {
        while self.peek().is_some_and(|c| c & 0xC0 == 0x80) {
            self.pos += 1;
        }
        let ch = self.current_lexeme().chars().next().unwrap_or('\u{FFFD}');
        self.add_error(LexErrorKind::UnexpectedCharacter(ch));
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn current_lexeme(&self) -> &str {
        // token boundaries always sit on ASCII bytes or char boundaries
        self.source.get(self.start..self.pos).unwrap_or_default()
    }

    const fn current_span(&self) -> Span {
        Span::new(self.start, self.pos, self.start_pos)
    }

    fn add_either(&mut self, next: u8, matched: TokenKind, single: TokenKind) {
        let kind = if self.match_byte(next) { matched } else { single };
        self.add_token(kind);
    }

    fn add_token(&mut self, kind: TokenKind) {
        self.add_literal(kind, Literal::None);
    }

    fn add_literal(&mut self, kind: TokenKind, literal: Literal) {
        let lexeme = self.current_lexeme().to_string();
        self.tokens.push(Token {
            kind,
            lexeme,
            literal,
            span: self.current_span(),
        });
    }

    fn add_error(&mut self, kind: LexErrorKind) {
        self.errors.push(LexError {
            kind,
            span: self.current_span(),
        });
    }
}

const fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

const fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}
