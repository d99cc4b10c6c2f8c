use std::fmt;

/// 1-based line/column of a point in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: usize,
    pub col: usize,
}

impl Default for SourcePos {
    fn default() -> Self {
        Self { line: 1, col: 1 }
    }
}

/// Half-open byte range `[start, end)` plus the position of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub pos: SourcePos,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize, pos: SourcePos) -> Self {
        Self { start, end, pos }
    }

    /// Span covering `self` through `end`, positioned at `self`.
    #[must_use]
    pub const fn join(self, end: Self) -> Self {
        Self {
            start: self.start,
            end: end.end,
            pos: self.pos,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Grouping
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,

    // Statement structure
    Semicolon,
    Comma,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    Equal,

    // Comparison
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Bang,

    // Logical
    AndAnd,
    OrOr,

    Identifier,
    Number,

    // Keywords
    Let,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    Fn,
    True,
    False,

    Eof,
}

impl TokenKind {
    /// Upper-case name used by the token dump and the AST printer.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LeftParen => "LEFT_PAREN",
            Self::RightParen => "RIGHT_PAREN",
            Self::LeftBrace => "LEFT_BRACE",
            Self::RightBrace => "RIGHT_BRACE",
            Self::Semicolon => "SEMICOLON",
            Self::Comma => "COMMA",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Star => "STAR",
            Self::Slash => "SLASH",
            Self::Equal => "EQUAL",
            Self::EqualEqual => "EQUAL_EQUAL",
            Self::BangEqual => "BANG_EQUAL",
            Self::Less => "LESS",
            Self::LessEqual => "LESS_EQUAL",
            Self::Greater => "GREATER",
            Self::GreaterEqual => "GREATER_EQUAL",
            Self::Bang => "BANG",
            Self::AndAnd => "AND_AND",
            Self::OrOr => "OR_OR",
            Self::Identifier => "IDENTIFIER",
            Self::Number => "NUMBER",
            Self::Let => "LET",
            Self::If => "IF",
            Self::Else => "ELSE",
            Self::While => "WHILE",
            Self::Break => "BREAK",
            Self::Continue => "CONTINUE",
            Self::Return => "RETURN",
            Self::Fn => "FN",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Eof => "EOF",
        }
    }

    /// Source spelling for punctuation and keywords, `None` for
    /// identifiers, numbers and EOF.
    #[must_use]
    pub const fn spelling(self) -> Option<&'static str> {
        let text = match self {
            Self::LeftParen => "(",
            Self::RightParen => ")",
            Self::LeftBrace => "{",
            Self::RightBrace => "}",
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Equal => "=",
            Self::EqualEqual => "==",
            Self::BangEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Bang => "!",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Let => "let",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Fn => "fn",
            Self::True => "true",
            Self::False => "false",
            Self::Identifier | Self::Number | Self::Eof => return None,
        };
        Some(text)
    }

    /// Keywords that begin a declaration or statement. The parser
    /// resynchronizes in front of these.
    #[must_use]
    pub const fn starts_statement(self) -> bool {
        matches!(
            self,
            Self::Let
                | Self::If
                | Self::While
                | Self::Break
                | Self::Continue
                | Self::Return
                | Self::Fn
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reserved word lookup.
#[must_use]
pub fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "fn" => TokenKind::Fn,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    };
    Some(kind)
}

/// Value payload carried by literal tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Literal {
    #[default]
    None,
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("nil"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A single scanned token with its kind, text, literal, and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Literal,
    pub span: Span,
}
