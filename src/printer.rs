//! Text dumps of the token stream and the syntax tree.
//!
//! Both are debugging aids behind the CLI's `--tokens` and `--ast` flags.

use std::fmt::Write as _;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::token::Token;

/// One line per token: kind name, then the lexeme in quotes.
#[must_use]
pub fn format_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let _ = writeln!(out, "{} '{}'", token.kind.name(), token.lexeme);
    }
    out
}

/// Indented tree of a parsed program, two spaces per level.
#[must_use]
pub fn format_program(statements: &[Stmt]) -> String {
    let mut out = String::from("AST Textual Form:\n\n");
    if statements.is_empty() {
        line(&mut out, 0, "<empty>");
    }
    for stmt in statements {
        format_stmt(&mut out, stmt, 0);
    }
    out
}

fn line(out: &mut String, indent: usize, text: &str) {
    out.push_str(&"  ".repeat(indent));
    out.push_str(text);
    out.push('\n');
}

fn format_block(out: &mut String, statements: &[Stmt], indent: usize) {
    line(out, indent, "Block");
    if statements.is_empty() {
        line(out, indent + 1, "<empty>");
    }
    for stmt in statements {
        format_stmt(out, stmt, indent + 1);
    }
}

fn format_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    match &stmt.kind {
        StmtKind::Expr(expr) => {
            line(out, indent, "ExprStmt");
            format_expr(out, expr, indent + 1);
        }
        StmtKind::Let { name, initializer } => {
            line(out, indent, &format!("Let: {}", name.name));
            line(out, indent + 1, "Initializer");
            format_expr(out, initializer, indent + 2);
        }
        StmtKind::Block(statements) => format_block(out, statements, indent),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            line(out, indent, "If");
            line(out, indent + 1, "Condition");
            format_expr(out, condition, indent + 2);
            line(out, indent + 1, "Then");
            format_stmt(out, then_branch, indent + 2);
            if let Some(else_branch) = else_branch {
                line(out, indent + 1, "Else");
                format_stmt(out, else_branch, indent + 2);
            }
        }
        StmtKind::While { condition, body } => {
            line(out, indent, "While");
            line(out, indent + 1, "Condition");
            format_expr(out, condition, indent + 2);
            line(out, indent + 1, "Body");
            format_stmt(out, body, indent + 2);
        }
        StmtKind::Break => line(out, indent, "Break"),
        StmtKind::Continue => line(out, indent, "Continue"),
        StmtKind::Return(value) => {
            line(out, indent, "Return");
            match value {
                Some(expr) => format_expr(out, expr, indent + 1),
                None => line(out, indent + 1, "<void>"),
            }
        }
        StmtKind::Fn(decl) => {
            line(out, indent, &format!("Fn: {}", decl.name.name));
            if decl.params.is_empty() {
                line(out, indent + 1, "Params: <none>");
            } else {
                line(out, indent + 1, "Params");
                for param in &decl.params {
                    line(out, indent + 2, &param.name);
                }
            }
            line(out, indent + 1, "Body");
            format_block(out, &decl.body, indent + 2);
        }
    }
}

fn format_expr(out: &mut String, expr: &Expr, indent: usize) {
    match &expr.kind {
        ExprKind::Literal(literal) => line(out, indent, &format!("Literal: {literal}")),
        ExprKind::Identifier(ident) => line(out, indent, &format!("Identifier: {}", ident.name)),
        ExprKind::Grouping(inner) => {
            line(out, indent, "Grouping");
            format_expr(out, inner, indent + 1);
        }
        ExprKind::Unary { op, right, .. } => {
            line(out, indent, &format!("Unary: {}", op.token().name()));
            format_expr(out, right, indent + 1);
        }
        ExprKind::Binary {
            left, op, right, ..
        } => {
            line(out, indent, &format!("Binary: {}", op.token().name()));
            line(out, indent + 1, "Left");
            format_expr(out, left, indent + 2);
            line(out, indent + 1, "Right");
            format_expr(out, right, indent + 2);
        }
        ExprKind::Assign { name, value } => {
            line(out, indent, &format!("Assign: {}", name.name));
            format_expr(out, value, indent + 1);
        }
        ExprKind::Call {
            callee, arguments, ..
        } => {
            line(out, indent, "Call");
            line(out, indent + 1, "Callee");
            format_expr(out, callee, indent + 2);
            if arguments.is_empty() {
                line(out, indent + 1, "Arguments: <none>");
            } else {
                line(out, indent + 1, "Arguments");
                for argument in arguments {
                    format_expr(out, argument, indent + 2);
                }
            }
        }
    }
}
