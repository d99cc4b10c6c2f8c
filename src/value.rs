use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::FnDecl;
use crate::environment::Scope;
use crate::token::Literal;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Integer(i64),
    Boolean(bool),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
}

impl Value {
    /// Name of the value's kind as used in type errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Integer(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Function(_) => "function",
            Self::Builtin(_) => "builtin",
        }
    }

    /// True for a function declared directly in `scope` that nothing but
    /// its binding refers to.
    pub(crate) fn is_private_closure_of(&self, scope: &Scope) -> bool {
        match self {
            Self::Function(function) => {
                Rc::strong_count(function) == 1 && Rc::ptr_eq(&function.closure, scope)
            }
            _ => false,
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::None => Self::Nil,
            Literal::Integer(n) => Self::Integer(n),
            Literal::Boolean(b) => Self::Boolean(b),
        }
    }
}

/// Scalars compare by value, callables by identity, and values of
/// different kinds are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Function(_) => f.write_str("function"),
            Self::Builtin(_) => f.write_str("builtin"),
        }
    }
}

/// A user function: its declaration plus the scope it was declared in.
pub struct Function {
    pub declaration: Rc<FnDecl>,
    pub closure: Scope,
}

impl Function {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.declaration.name.name
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }
}

// The closure scope can contain this very function, so it is left out.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish_non_exhaustive()
    }
}

/// How many arguments a builtin accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

/// Signature of a native builtin: evaluated arguments in, value out.
/// Output goes to the interpreter's configured writer.
pub type BuiltinFn = fn(&[Value], &mut dyn Write) -> io::Result<Value>;

/// A native function installed into the global scope.
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub function: BuiltinFn,
}

impl Builtin {
    /// # Errors
    ///
    /// Propagates I/O errors from writing to `out`.
    pub fn call(&self, arguments: &[Value], out: &mut dyn Write) -> io::Result<Value> {
        (self.function)(arguments, out)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
