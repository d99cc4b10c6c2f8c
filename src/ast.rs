use std::rc::Rc;

use crate::token::{Literal, Span, TokenKind};

/// A name as written in the source, with its own location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl UnaryOp {
    #[must_use]
    pub const fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Minus => Some(Self::Negate),
            TokenKind::Bang => Some(Self::Not),
            _ => None,
        }
    }

    #[must_use]
    pub const fn token(self) -> TokenKind {
        match self {
            Self::Negate => TokenKind::Minus,
            Self::Not => TokenKind::Bang,
        }
    }
}

/// Infix operators, including the short-circuiting logical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub const fn from_token(kind: TokenKind) -> Option<Self> {
        let op = match kind {
            TokenKind::Plus => Self::Add,
            TokenKind::Minus => Self::Subtract,
            TokenKind::Star => Self::Multiply,
            TokenKind::Slash => Self::Divide,
            TokenKind::EqualEqual => Self::Equal,
            TokenKind::BangEqual => Self::NotEqual,
            TokenKind::Less => Self::Less,
            TokenKind::LessEqual => Self::LessEqual,
            TokenKind::Greater => Self::Greater,
            TokenKind::GreaterEqual => Self::GreaterEqual,
            TokenKind::AndAnd => Self::And,
            TokenKind::OrOr => Self::Or,
            _ => return None,
        };
        Some(op)
    }

    #[must_use]
    pub const fn token(self) -> TokenKind {
        match self {
            Self::Add => TokenKind::Plus,
            Self::Subtract => TokenKind::Minus,
            Self::Multiply => TokenKind::Star,
            Self::Divide => TokenKind::Slash,
            Self::Equal => TokenKind::EqualEqual,
            Self::NotEqual => TokenKind::BangEqual,
            Self::Less => TokenKind::Less,
            Self::LessEqual => TokenKind::LessEqual,
            Self::Greater => TokenKind::Greater,
            Self::GreaterEqual => TokenKind::GreaterEqual,
            Self::And => TokenKind::AndAnd,
            Self::Or => TokenKind::OrOr,
        }
    }
}

/// An expression node and the source range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Ident),
    Grouping(Box<Expr>),
    Unary {
        op: UnaryOp,
        op_span: Span,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        op_span: Span,
        right: Box<Expr>,
    },
    Assign {
        name: Ident,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        /// Closing parenthesis, where arity errors point.
        paren: Span,
    },
}

/// A statement node and the source range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Expr(Expr),
    Let {
        name: Ident,
        initializer: Expr,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    /// Shared with the function values created when it executes.
    Fn(Rc<FnDecl>),
}

/// `fn name(params) { body }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Vec<Stmt>,
}

impl Stmt {
    /// Short label naming the statement, e.g. `Let x` or `While`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.kind {
            StmtKind::Expr(_) => "ExprStmt".to_string(),
            StmtKind::Let { name, .. } => format!("Let {}", name.name),
            StmtKind::Block(_) => "Block".to_string(),
            StmtKind::If { .. } => "If".to_string(),
            StmtKind::While { .. } => "While".to_string(),
            StmtKind::Break => "Break".to_string(),
            StmtKind::Continue => "Continue".to_string(),
            StmtKind::Return(_) => "Return".to_string(),
            StmtKind::Fn(decl) => format!("Fn {}", decl.name.name),
        }
    }
}
