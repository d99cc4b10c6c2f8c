//! Lexer, parser, and tree-walking interpreter for a small C-flavoured
//! scripting language.
//!
//! Programs are made of `let` bindings, `fn` declarations, `if`/`while`
//! control flow and expressions over 64-bit integers and booleans.
//! Functions are first-class and capture the scope they are declared in.
//!
//! # Quick start
//!
//! ## Run a program and capture its output
//!
//! ```
//! let mut out = Vec::new();
//! basic_interpreter::run_str("fn add(a, b) { return a + b; } print(add(2, 3));", &mut out)
//!     .unwrap();
//! assert_eq!(out, b"5\n");
//! ```
//!
//! ## Drive the stages yourself
//!
//! ```
//! use basic_interpreter::{Interpreter, Lexer, Parser};
//!
//! let mut lexer = Lexer::new("let x = 1 / 0;");
//! let mut parser = Parser::new(lexer.scan_tokens());
//! let program = parser.parse();
//! assert!(lexer.errors().is_empty() && parser.errors().is_empty());
//!
//! let mut interpreter = Interpreter::with_output(std::io::sink());
//! interpreter.interpret(&program);
//! assert_eq!(interpreter.errors(), vec!["Line 1, col 11: Division by zero."]);
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use std::io::Write;

pub mod ast;
pub mod builtins;
pub mod environment;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;
pub mod value;

pub use ast::{BinaryOp, Expr, ExprKind, FnDecl, Ident, Stmt, StmtKind, UnaryOp};
pub use environment::{Environment, Scope};
pub use interpreter::{
    DEFAULT_CALL_DEPTH_LIMIT, Flow, Interpreter, RuntimeError, RuntimeErrorKind, TraceHook,
};
pub use lexer::{LexError, LexErrorKind, Lexer, tokenize};
pub use parser::{MAX_NESTING_DEPTH, ParseError, ParseErrorKind, Parser, parse};
pub use printer::{format_program, format_tokens};
pub use token::{Literal, SourcePos, Span, Token, TokenKind};
pub use value::{Arity, Builtin, Function, Value};

/// Unified error type covering every stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Lexer errors, in source order.
    #[error("{}", render(.0))]
    Lex(Vec<LexError>),
    /// Parser errors, in source order.
    #[error("{}", render(.0))]
    Parse(Vec<ParseError>),
    /// The error that stopped execution.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// One rendered message per underlying error.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Lex(errors) => errors.iter().map(ToString::to_string).collect(),
            Self::Parse(errors) => errors.iter().map(ToString::to_string).collect(),
            Self::Runtime(err) => vec![err.to_string()],
        }
    }
}

impl From<Vec<LexError>> for Error {
    fn from(errors: Vec<LexError>) -> Self {
        Self::Lex(errors)
    }
}

impl From<Vec<ParseError>> for Error {
    fn from(errors: Vec<ParseError>) -> Self {
        Self::Parse(errors)
    }
}

/// Free stack below which recursion moves to a new segment.
const STACK_RED_ZONE: usize = 64 * 1024;
/// Size of each heap-allocated stack segment.
const STACK_SEGMENT: usize = 1024 * 1024;

/// Run `f`, first switching to a fresh stack segment on the heap when
/// the current one is nearly used up. Wraps every recursive entry point
/// of the parser and the interpreter.
fn grow_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

/// One message per line.
fn render(errors: impl IntoIterator<Item = impl ToString>) -> String {
    errors
        .into_iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tokenize and parse a source string in one step.
pub fn check_str(input: &str) -> Result<Vec<Stmt>, Error> {
    let tokens = tokenize(input)?;
    Ok(parse(tokens)?)
}

/// Check and run a source string, sending builtin output to `out`.
pub fn run_str(input: &str, out: impl Write) -> Result<(), Error> {
    let program = check_str(input)?;
    let mut interpreter = Interpreter::with_output(out);
    interpreter.interpret(&program);
    match interpreter.diagnostics().first() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}
