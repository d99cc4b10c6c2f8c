#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use basic_interpreter::{Expr, ExprKind, Interpreter, Span, Stmt, StmtKind, check_str};

/// Writer whose bytes stay readable after it is handed to an interpreter.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Parse `source`, panicking with the diagnostics if it does not check.
pub fn program(source: &str) -> Vec<Stmt> {
    check_str(source).unwrap_or_else(|e| panic!("failed to check source: {e}\n--- source ---\n{source}"))
}

/// Run `source` and return what it printed plus its runtime errors.
pub fn run(source: &str) -> (String, Vec<String>) {
    let out = SharedBuffer::default();
    let mut interpreter = Interpreter::with_output(out.clone());
    interpreter.interpret(&program(source));
    (out.text(), interpreter.errors())
}

/// Run `source` and assert it printed `expected` without errors.
pub fn assert_output(source: &str, expected: &str) {
    let (out, errors) = run(source);
    assert!(errors.is_empty(), "unexpected errors {errors:?}\n--- source ---\n{source}");
    assert_eq!(out, expected, "output mismatch\n--- source ---\n{source}");
}

/// Run `source` and assert it failed with exactly `message`.
pub fn assert_runtime_error(source: &str, message: &str) {
    let (_, errors) = run(source);
    assert_eq!(errors, vec![message.to_string()], "--- source ---\n{source}");
}

/// Assert that every node's span, and every name or operator span it
/// carries, lies inside the span of the node that holds it.
pub fn assert_spans_nest(program: &[Stmt]) {
    for stmt in program {
        check_stmt(stmt);
    }
}

fn inside(parent: Span, child: Span, what: &str) {
    assert!(
        parent.contains(&child),
        "{what} at {child:?} escapes its parent {parent:?}"
    );
}

fn check_stmt_in(parent: Span, stmt: &Stmt) {
    inside(parent, stmt.span, "statement");
    check_stmt(stmt);
}

fn check_stmt(stmt: &Stmt) {
    let outer = stmt.span;
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Return(Some(expr)) => check_expr_in(outer, expr),
        StmtKind::Let { name, initializer } => {
            inside(outer, name.span, "variable name");
            check_expr_in(outer, initializer);
        }
        StmtKind::Block(body) => {
            for inner in body {
                check_stmt_in(outer, inner);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            check_expr_in(outer, condition);
            check_stmt_in(outer, then_branch);
            if let Some(else_branch) = else_branch {
                check_stmt_in(outer, else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            check_expr_in(outer, condition);
            check_stmt_in(outer, body);
        }
        StmtKind::Fn(decl) => {
            inside(outer, decl.name.span, "function name");
            for param in &decl.params {
                inside(outer, param.span, "parameter");
            }
            for inner in &decl.body {
                check_stmt_in(outer, inner);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Return(None) => {}
    }
}

fn check_expr_in(parent: Span, expr: &Expr) {
    inside(parent, expr.span, "expression");
    check_expr(expr);
}

fn check_expr(expr: &Expr) {
    let outer = expr.span;
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Identifier(ident) => inside(outer, ident.span, "identifier"),
        ExprKind::Grouping(inner) => check_expr_in(outer, inner),
        ExprKind::Unary { op_span, right, .. } => {
            inside(outer, *op_span, "operator");
            check_expr_in(outer, right);
        }
        ExprKind::Binary {
            left,
            op_span,
            right,
            ..
        } => {
            check_expr_in(outer, left);
            inside(outer, *op_span, "operator");
            check_expr_in(outer, right);
        }
        ExprKind::Assign { name, value } => {
            inside(outer, name.span, "assignment target");
            check_expr_in(outer, value);
        }
        ExprKind::Call {
            callee,
            arguments,
            paren,
        } => {
            check_expr_in(outer, callee);
            for argument in arguments {
                check_expr_in(outer, argument);
            }
            inside(outer, *paren, "closing paren");
        }
    }
}
