use std::fmt;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, FnDecl, Ident, Stmt, StmtKind, UnaryOp};
use crate::token::{Literal, Span, Token, TokenKind};

/// Deepest allowed nesting of declarations, statement bodies and
/// expressions, counted together.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was required, e.g. `';'` after an expression.
    ExpectedToken {
        expected: TokenKind,
        context: &'static str,
    },
    /// A name was required, e.g. after `let` or in a parameter list.
    ExpectedName {
        what: &'static str,
        context: Option<&'static str>,
    },
    /// Nothing that can start an expression was found.
    ExpectedExpression,
    /// Left side of `=` is not a bare identifier.
    InvalidAssignmentTarget,
    /// Statements or expressions nested deeper than [`MAX_NESTING_DEPTH`].
    NestingTooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedToken { expected, context } => {
                let spelling = expected.spelling().unwrap_or_else(|| expected.name());
                write!(f, "Expect '{spelling}' {context}.")
            }
            Self::ExpectedName {
                what,
                context: Some(context),
            } => write!(f, "Expect {what} name {context}."),
            Self::ExpectedName {
                what,
                context: None,
            } => write!(f, "Expect {what} name."),
            Self::ExpectedExpression => write!(f, "Expect expression."),
            Self::InvalidAssignmentTarget => write!(f, "Invalid assignment target."),
            Self::NestingTooDeep => write!(
                f,
                "Nesting is too deep (maximum {MAX_NESTING_DEPTH} levels)."
            ),
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Line {}, col {}: {kind}", span.pos.line, span.pos.col)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

/// Parse a token stream in one step.
///
/// # Errors
///
/// Returns every syntax error found. The parser recovers at statement
/// boundaries, so independent problems are all reported.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, Vec<ParseError>> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    if parser.diagnostics().is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser with one token of lookahead.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    depth: usize,
}

impl Parser {
    /// Build a parser over `tokens`. A missing trailing `Eof` is added.
    #[must_use]
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let span = tokens.last().map_or_else(Span::default, |last| {
                let mut pos = last.span.pos;
                pos.col += last.span.len();
                Span::new(last.span.end, last.span.end, pos)
            });
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                literal: Literal::None,
                span,
            });
        }
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            depth: 0,
        }
    }

    /// Parse every top-level declaration. Statements that fail to parse
    /// are left out and their errors recorded.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        tracing::debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        statements
    }

    /// Rendered error messages in the order they were found.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[ParseError] {
        &self.errors
    }

    // -- declarations and statements --

    fn declaration(&mut self) -> Option<Stmt> {
        let result = self.nested(|parser| {
            if parser.match_kind(TokenKind::Fn) {
                parser.fn_declaration()
            } else if parser.match_kind(TokenKind::Let) {
                parser.let_declaration()
            } else {
                parser.statement()
            }
        });

        match result {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                tracing::trace!(error = %err, "recovering from parse error");
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::Break) {
            return self.keyword_statement(StmtKind::Break, "after 'break'");
        }
        if self.match_kind(TokenKind::Continue) {
            return self.keyword_statement(StmtKind::Continue, "after 'continue'");
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            let open = self.previous().span;
            let (statements, close) = self.block_body("after block")?;
            return Ok(Stmt {
                kind: StmtKind::Block(statements),
                span: open.join(close),
            });
        }
        self.expression_statement()
    }

    fn let_declaration(&mut self) -> ParseResult<Stmt> {
        let start = self.previous().span;
        let name = self.consume_name("variable", Some("after 'let'"))?;
        self.consume(TokenKind::Equal, "after variable name")?;
        let initializer = self.expression()?;
        let semi = self.consume(TokenKind::Semicolon, "after variable declaration")?;
        Ok(Stmt {
            kind: StmtKind::Let { name, initializer },
            span: start.join(semi),
        })
    }

    fn fn_declaration(&mut self) -> ParseResult<Stmt> {
        let start = self.previous().span;
        let name = self.consume_name("function", Some("after 'fn'"))?;
        self.consume(TokenKind::LeftParen, "after function name")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.consume_name("parameter", None)?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "after parameters")?;
        self.consume(TokenKind::LeftBrace, "before function body")?;
        let (body, close) = self.block_body("after function body")?;

        Ok(Stmt {
            kind: StmtKind::Fn(Rc::new(FnDecl { name, params, body })),
            span: start.join(close),
        })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.previous().span;
        self.consume(TokenKind::LeftParen, "after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "after if condition")?;

        let then_branch = Box::new(self.nested(Self::statement)?);
        let mut end = then_branch.span;
        let else_branch = if self.match_kind(TokenKind::Else) {
            let stmt = self.nested(Self::statement)?;
            end = stmt.span;
            Some(Box::new(stmt))
        } else {
            None
        };

        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span: start.join(end),
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.previous().span;
        self.consume(TokenKind::LeftParen, "after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "after while condition")?;
        let body = Box::new(self.nested(Self::statement)?);
        let span = start.join(body.span);
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            span,
        })
    }

    /// `break;` and `continue;`
    fn keyword_statement(&mut self, kind: StmtKind, context: &'static str) -> ParseResult<Stmt> {
        let start = self.previous().span;
        let semi = self.consume(TokenKind::Semicolon, context)?;
        Ok(Stmt {
            kind,
            span: start.join(semi),
        })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.previous().span;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        let semi = self.consume(TokenKind::Semicolon, "after return value")?;
        Ok(Stmt {
            kind: StmtKind::Return(value),
            span: start.join(semi),
        })
    }

    /// Declarations up to the closing brace. The opening brace has
    /// already been consumed. Returns the statements and the span of `}`.
    fn block_body(&mut self, context: &'static str) -> ParseResult<(Vec<Stmt>, Span)> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        let close = self.consume(TokenKind::RightBrace, context)?;
        Ok((statements, close))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        let semi = self.consume(TokenKind::Semicolon, "after expression")?;
        let span = expr.span.join(semi);
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    // -- expressions --

    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logic_or()?;

        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().span;
            let value = self.expression()?;

            if let ExprKind::Identifier(name) = &expr.kind {
                let span = expr.span.join(value.span);
                return Ok(Expr {
                    kind: ExprKind::Assign {
                        name: name.clone(),
                        value: Box::new(value),
                    },
                    span,
                });
            }

            // reported, but parsing carries on with the left side
            self.errors.push(ParseError {
                kind: ParseErrorKind::InvalidAssignmentTarget,
                span: equals,
            });
        }

        Ok(expr)
    }

    fn logic_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenKind::OrOr], Self::logic_and)
    }

    fn logic_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenKind::AndAnd], Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenKind::EqualEqual, TokenKind::BangEqual], Self::comparison)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenKind::Star, TokenKind::Slash], Self::unary)
    }

    /// One left-associative precedence level: `next (op next)*`.
    fn binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;

        while let Some(op) = self.match_binary(operators) {
            let op_span = self.previous().span;
            let right = next(self)?;
            let span = expr.span.join(right.span);
            expr = Expr {
                kind: ExprKind::Binary {
                    left: Box::new(expr),
                    op,
                    op_span,
                    right: Box::new(right),
                },
                span,
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if let Some(op) = UnaryOp::from_token(self.peek().kind) {
            self.advance();
            let op_span = self.previous().span;
            let right = self.nested(Self::unary)?;
            let span = op_span.join(right.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    op_span,
                    right: Box::new(right),
                },
                span,
            });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        while self.match_kind(TokenKind::LeftParen) {
            expr = self.finish_call(expr)?;
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "after arguments")?;
        let span = callee.span.join(paren);
        Ok(Expr {
            kind: ExprKind::Call {
                callee: Box::new(callee),
                arguments,
                paren,
            },
            span,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::Number | TokenKind::True | TokenKind::False => {
                let expr = Expr {
                    kind: ExprKind::Literal(token.literal),
                    span: token.span,
                };
                self.advance();
                Ok(expr)
            }
            TokenKind::Identifier => {
                let ident = Ident {
                    name: token.lexeme.clone(),
                    span: token.span,
                };
                self.advance();
                Ok(Expr {
                    span: ident.span,
                    kind: ExprKind::Identifier(ident),
                })
            }
            TokenKind::LeftParen => {
                let open = token.span;
                self.advance();
                let inner = self.expression()?;
                let close = self.consume(TokenKind::RightParen, "after expression")?;
                Ok(Expr {
                    kind: ExprKind::Grouping(Box::new(inner)),
                    span: open.join(close),
                })
            }
            _ => Err(ParseError {
                kind: ParseErrorKind::ExpectedExpression,
                span: token.span,
            }),
        }
    }

    /// Run `parse` one nesting level down, failing at the current token
    /// once the limit is reached.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError {
                kind: ParseErrorKind::NestingTooDeep,
                span: self.peek().span,
            });
        }
        self.depth += 1;
        let result = crate::grow_stack(|| parse(self));
        self.depth -= 1;
        result
    }

    // -- token helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_binary(&mut self, operators: &[TokenKind]) -> Option<BinaryOp> {
        let kind = self.peek().kind;
        if self.is_at_end() || !operators.contains(&kind) {
            return None;
        }
        self.advance();
        BinaryOp::from_token(kind)
    }

    /// Consume a token of `kind` and return its span.
    fn consume(&mut self, kind: TokenKind, context: &'static str) -> ParseResult<Span> {
        if self.check(kind) {
            self.advance();
            return Ok(self.previous().span);
        }
        Err(ParseError {
            kind: ParseErrorKind::ExpectedToken {
                expected: kind,
                context,
            },
            span: self.peek().span,
        })
    }

    fn consume_name(
        &mut self,
        what: &'static str,
        context: Option<&'static str>,
    ) -> ParseResult<Ident> {
        if self.check(TokenKind::Identifier) {
            self.advance();
            let token = self.previous();
            return Ok(Ident {
                name: token.lexeme.clone(),
                span: token.span,
            });
        }
        Err(ParseError {
            kind: ParseErrorKind::ExpectedName { what, context },
            span: self.peek().span,
        })
    }

    /// Skip ahead to a likely statement boundary: just past a `;`, or in
    /// front of a keyword that starts a statement.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if self.peek().kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_input(input: &str) -> (Vec<Stmt>, Vec<String>) {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.scan_tokens();
        assert!(lexer.errors().is_empty(), "lex errors: {:?}", lexer.errors());
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        (program, parser.errors())
    }

    fn single_expr(input: &str) -> Expr {
        let (program, errors) = parse_input(input);
        assert!(errors.is_empty(), "{errors:?}");
        match program.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        let expr = single_expr("1 + 2 * 3;");
        let ExprKind::Binary { op, right, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = single_expr("8 - 4 - 2;");
        let ExprKind::Binary { left, op, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Subtract);
        assert!(matches!(
            left.kind,
            ExprKind::Binary {
                op: BinaryOp::Subtract,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = single_expr("a = b = 1;");
        let ExprKind::Assign { name, value } = expr.kind else {
            panic!("expected assignment");
        };
        assert_eq!(name.name, "a");
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn calls_chain() {
        let expr = single_expr("f(1)(2, 3);");
        let ExprKind::Call {
            callee, arguments, ..
        } = expr.kind
        else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 2);
        assert!(matches!(callee.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn spans_cover_whole_statement() {
        let (program, errors) = parse_input("let x = 1 + 2;");
        assert!(errors.is_empty());
        assert_eq!(program[0].span.start, 0);
        assert_eq!(program[0].span.end, 14);
        let StmtKind::Let { initializer, name } = &program[0].kind else {
            panic!("expected let");
        };
        assert_eq!(name.span.start, 4);
        assert_eq!(initializer.span.start, 8);
        assert_eq!(initializer.span.end, 13);
    }

    #[test]
    fn let_requires_initializer() {
        let (program, errors) = parse_input("let x;");
        assert!(program.is_empty());
        assert_eq!(errors, vec!["Line 1, col 6: Expect '=' after variable name."]);
    }

    #[test]
    fn invalid_assignment_target_keeps_parsing() {
        let (program, errors) = parse_input("1 = 2; let y = 3;");
        assert_eq!(errors, vec!["Line 1, col 3: Invalid assignment target."]);
        assert_eq!(program.len(), 2);
        assert!(matches!(
            program[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Literal(Literal::Integer(1)),
                ..
            })
        ));
    }

    #[test]
    fn synchronize_reports_one_error_per_statement() {
        let (program, errors) = parse_input("let = 1; print(1 +); let ok = 2;");
        assert_eq!(program.len(), 1);
        assert_eq!(
            errors,
            vec![
                "Line 1, col 5: Expect variable name after 'let'.",
                "Line 1, col 19: Expect expression.",
            ]
        );
    }

    #[test]
    fn error_inside_block_leaves_a_gap() {
        let (program, errors) = parse_input("{ let a = 1; a = ; let b = 2; }");
        assert_eq!(errors.len(), 1);
        let StmtKind::Block(inner) = &program[0].kind else {
            panic!("expected block");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn function_declaration() {
        let (program, errors) = parse_input("fn add(a, b) { return a + b; }");
        assert!(errors.is_empty());
        let StmtKind::Fn(decl) = &program[0].kind else {
            panic!("expected fn");
        };
        assert_eq!(decl.name.name, "add");
        let params: Vec<_> = decl.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["a", "b"]);
        assert_eq!(decl.body.len(), 1);
    }

    #[test]
    fn control_statements_parse_anywhere() {
        let (program, errors) = parse_input("break; continue; return; return 1;");
        assert!(errors.is_empty());
        assert_eq!(program.len(), 4);
        assert!(matches!(program[2].kind, StmtKind::Return(None)));
        assert!(matches!(program[3].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn missing_closing_brace_reported_at_eof() {
        let (_, errors) = parse_input("while (true) {\n  x = 1;\n");
        assert_eq!(errors, vec!["Line 3, col 1: Expect '}' after block."]);
    }

    #[test]
    fn nesting_depth_unwinds_after_errors() {
        let source = format!("{}1; x = ;", "-".repeat(MAX_NESTING_DEPTH + 10));
        let tokens = Lexer::new(&source).scan_tokens();
        let mut parser = Parser::new(tokens);
        parser.parse();
        assert_eq!(parser.depth, 0);
        assert_eq!(parser.diagnostics().len(), 2);
        assert_eq!(
            parser.diagnostics()[0].kind,
            ParseErrorKind::NestingTooDeep
        );
    }

    #[test]
    fn missing_eof_is_added() {
        let mut parser = Parser::new(Vec::new());
        assert!(parser.parse().is_empty());
        assert!(parser.errors().is_empty());
    }
}
