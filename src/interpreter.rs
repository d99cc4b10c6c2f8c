use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, FnDecl, Stmt, StmtKind, UnaryOp};
use crate::builtins::register_builtins;
use crate::environment::{Environment, Scope};
use crate::token::Span;
use crate::value::{Arity, Function, Value};

/// Nested user-function calls allowed before the run is aborted.
pub const DEFAULT_CALL_DEPTH_LIMIT: usize = 200;

/// Classifies a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Read of a name no scope binds.
    UndefinedIdentifier(String),
    /// Assignment to a name no scope binds.
    UndefinedVariable(String),
    VariableRedeclared(String),
    FunctionRedeclared(String),
    ExpectedNumber {
        context: &'static str,
        found: &'static str,
    },
    ExpectedBoolean {
        context: &'static str,
        found: &'static str,
    },
    DivisionByZero,
    IntegerOverflow {
        context: &'static str,
    },
    ArityMismatch {
        expected: usize,
        found: usize,
    },
    NotCallable,
    DuplicateParameter(String),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    ReturnOutsideFunction,
    CallDepthExceeded(usize),
    /// Writing builtin output failed.
    Output(String),
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedIdentifier(name) => write!(f, "Undefined identifier '{name}'."),
            Self::UndefinedVariable(name) => write!(f, "Undefined variable '{name}'."),
            Self::VariableRedeclared(name) => {
                write!(f, "Variable already declared in this scope: '{name}'.")
            }
            Self::FunctionRedeclared(name) => {
                write!(f, "Function already declared in this scope: '{name}'.")
            }
            Self::ExpectedNumber { context, found } => {
                write!(f, "Expected number in {context}, got {found}.")
            }
            Self::ExpectedBoolean { context, found } => {
                write!(f, "Expected boolean in {context}, got {found}.")
            }
            Self::DivisionByZero => write!(f, "Division by zero."),
            Self::IntegerOverflow { context } => write!(f, "Integer overflow in {context}."),
            Self::ArityMismatch { expected, found } => {
                write!(f, "Expected {expected} arguments but got {found}.")
            }
            Self::NotCallable => write!(f, "Can only call functions or builtins."),
            Self::DuplicateParameter(name) => write!(f, "Duplicate parameter name '{name}'."),
            Self::BreakOutsideLoop => write!(f, "Break used outside of a loop."),
            Self::ContinueOutsideLoop => write!(f, "Continue used outside of a loop."),
            Self::ReturnOutsideFunction => write!(f, "Return used outside of a function."),
            Self::CallDepthExceeded(limit) => {
                write!(f, "Stack overflow: more than {limit} nested calls.")
            }
            Self::Output(message) => write!(f, "Failed to write output: {message}."),
        }
    }
}

/// Error that aborted a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Line {}, col {}: {kind}", span.pos.line, span.pos.col)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
}

impl RuntimeError {
    const fn new(kind: RuntimeErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// How a statement finished. Anything but `Normal` unwinds to the
/// nearest loop (`Break`, `Continue`) or call (`Return`).
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Why evaluation left the normal path.
enum Unwind {
    Error(RuntimeError),
    /// `break` or `continue` run inside a called function, on its way
    /// out to the loop around the call.
    Loop(Flow),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Self::Error(err)
    }
}

type RunResult<T> = Result<T, Unwind>;

/// Callback run after every executed statement. Expression statements
/// and `let` declarations pass the value they produced.
pub type TraceHook<'a> = Box<dyn FnMut(&Stmt, Option<&Value>) + 'a>;

/// Tree-walking evaluator.
///
/// One instance can run several programs in turn; bindings made by
/// earlier runs stay in the global scope.
pub struct Interpreter<'a> {
    globals: Scope,
    environment: Scope,
    output: Box<dyn Write + 'a>,
    errors: Vec<RuntimeError>,
    loop_depth: usize,
    function_depth: usize,
    call_depth_limit: usize,
    trace_hook: Option<TraceHook<'a>>,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    /// Interpreter whose builtins write to standard output.
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Interpreter whose builtins write to `output`.
    pub fn with_output(output: impl Write + 'a) -> Self {
        let globals = Environment::global();
        register_builtins(&mut globals.borrow_mut());
        Self {
            environment: Rc::clone(&globals),
            globals,
            output: Box::new(output),
            errors: Vec::new(),
            loop_depth: 0,
            function_depth: 0,
            call_depth_limit: DEFAULT_CALL_DEPTH_LIMIT,
            trace_hook: None,
        }
    }

    #[must_use]
    pub fn with_call_depth_limit(mut self, limit: usize) -> Self {
        self.call_depth_limit = limit;
        self
    }

    pub fn set_trace_hook(&mut self, hook: impl FnMut(&Stmt, Option<&Value>) + 'a) {
        self.trace_hook = Some(Box::new(hook));
    }

    /// Run `statements` in order. The first runtime error stops the run
    /// and is recorded; errors from earlier runs are discarded.
    pub fn interpret(&mut self, statements: &[Stmt]) {
        self.errors.clear();
        self.environment = Rc::clone(&self.globals);
        self.loop_depth = 0;
        self.function_depth = 0;

        for stmt in statements {
            match self.execute(stmt) {
                Ok(_) => {}
                Err(Unwind::Error(err)) => {
                    tracing::debug!(error = %err, "runtime error");
                    self.errors.push(err);
                    break;
                }
                // raised only while a loop runs, and that loop stops it
                Err(Unwind::Loop(_)) => break,
            }
        }

        if let Err(err) = self.output.flush() {
            tracing::warn!(error = %err, "failed to flush program output");
        }
    }

    /// Rendered runtime errors from the last run (at most one).
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[RuntimeError] {
        &self.errors
    }

    /// Current value of a global binding.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name)
    }

    // -- statements --

    fn execute(&mut self, stmt: &Stmt) -> RunResult<Flow> {
        crate::grow_stack(|| self.execute_statement(stmt))
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> RunResult<Flow> {
        tracing::trace!(statement = %stmt.label(), line = stmt.span.pos.line, "execute");

        let (flow, produced) = match &stmt.kind {
            StmtKind::Expr(expr) => (Flow::Normal, Some(self.evaluate(expr)?)),
            StmtKind::Let { name, initializer } => {
                let value = self.evaluate(initializer)?;
                if !self
                    .environment
                    .borrow_mut()
                    .define(&name.name, value.clone())
                {
                    return fail(
                        RuntimeErrorKind::VariableRedeclared(name.name.clone()),
                        name.span,
                    );
                }
                (Flow::Normal, Some(value))
            }
            StmtKind::Block(statements) => {
                let scope = Environment::child(&self.environment);
                (self.execute_block(statements, scope)?, None)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let value = self.evaluate(condition)?;
                let flow = if expect_bool(&value, condition.span, "if condition")? {
                    self.execute(then_branch)?
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?
                } else {
                    Flow::Normal
                };
                (flow, None)
            }
            StmtKind::While { condition, body } => {
                self.loop_depth += 1;
                let result = self.run_loop(condition, body);
                self.loop_depth -= 1;
                (result?, None)
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return fail(RuntimeErrorKind::BreakOutsideLoop, stmt.span);
                }
                (Flow::Break, None)
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return fail(RuntimeErrorKind::ContinueOutsideLoop, stmt.span);
                }
                (Flow::Continue, None)
            }
            StmtKind::Return(value) => {
                if self.function_depth == 0 {
                    return fail(RuntimeErrorKind::ReturnOutsideFunction, stmt.span);
                }
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                (Flow::Return(value), None)
            }
            StmtKind::Fn(declaration) => {
                self.declare_function(declaration)?;
                (Flow::Normal, None)
            }
        };

        if let Some(hook) = self.trace_hook.as_mut() {
            hook(stmt, produced.as_ref());
        }
        Ok(flow)
    }

    /// Run `statements` inside `scope`, then return to the current scope
    /// whether they finished, signalled, or failed.
    fn execute_block(&mut self, statements: &[Stmt], scope: Scope) -> RunResult<Flow> {
        let previous = std::mem::replace(&mut self.environment, scope);
        let result = self.run_statements(statements);
        let finished = std::mem::replace(&mut self.environment, previous);
        Environment::release(finished);
        result
    }

    fn run_statements(&mut self, statements: &[Stmt]) -> RunResult<Flow> {
        for stmt in statements {
            let flow = self.execute(stmt)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Loop signals from the body, the condition, or a function either
    /// of them calls all end up here.
    fn run_loop(&mut self, condition: &Expr, body: &Stmt) -> RunResult<Flow> {
        loop {
            let flow = match self.iterate(condition, body) {
                Ok(None) => return Ok(Flow::Normal),
                Ok(Some(flow)) | Err(Unwind::Loop(flow)) => flow,
                Err(err) => return Err(err),
            };
            match flow {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal | Flow::Continue => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
    }

    /// Test the condition and run the body once. `None` when the
    /// condition is false.
    fn iterate(&mut self, condition: &Expr, body: &Stmt) -> RunResult<Option<Flow>> {
        let value = self.evaluate(condition)?;
        if !expect_bool(&value, condition.span, "while condition")? {
            return Ok(None);
        }
        self.execute(body).map(Some)
    }

    fn declare_function(&mut self, declaration: &Rc<FnDecl>) -> RunResult<()> {
        let function = Function {
            declaration: Rc::clone(declaration),
            closure: Rc::clone(&self.environment),
        };
        let name = &declaration.name;
        if self
            .environment
            .borrow_mut()
            .define(&name.name, Value::Function(Rc::new(function)))
        {
            Ok(())
        } else {
            fail(
                RuntimeErrorKind::FunctionRedeclared(name.name.clone()),
                name.span,
            )
        }
    }

    // -- expressions --

    fn evaluate(&mut self, expr: &Expr) -> RunResult<Value> {
        crate::grow_stack(|| self.evaluate_expression(expr))
    }

    fn evaluate_expression(&mut self, expr: &Expr) -> RunResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Value::from(*literal)),
            ExprKind::Identifier(ident) => {
                let value = self.environment.borrow().get(&ident.name);
                value.ok_or_else(|| {
                    Unwind::Error(RuntimeError::new(
                        RuntimeErrorKind::UndefinedIdentifier(ident.name.clone()),
                        ident.span,
                    ))
                })
            }
            ExprKind::Grouping(inner) => self.evaluate(inner),
            ExprKind::Unary { op, op_span, right } => {
                let value = self.evaluate(right)?;
                let result = match op {
                    UnaryOp::Negate => {
                        let n = expect_number(&value, *op_span, "unary minus")?;
                        Value::Integer(
                            n.checked_neg()
                                .ok_or_else(|| overflow(*op_span, "unary minus"))?,
                        )
                    }
                    UnaryOp::Not => {
                        Value::Boolean(!expect_bool(&value, *op_span, "logical not")?)
                    }
                };
                Ok(result)
            }
            ExprKind::Binary {
                left,
                op,
                op_span,
                right,
            } => self.evaluate_binary(left, *op, *op_span, right),
            ExprKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                let assigned = self
                    .environment
                    .borrow_mut()
                    .assign(&name.name, value.clone());
                if assigned {
                    Ok(value)
                } else {
                    fail(
                        RuntimeErrorKind::UndefinedVariable(name.name.clone()),
                        name.span,
                    )
                }
            }
            ExprKind::Call {
                callee,
                arguments,
                paren,
            } => self.evaluate_call(callee, arguments, *paren, expr.span),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        op: BinaryOp,
        op_span: Span,
        right: &Expr,
    ) -> RunResult<Value> {
        let value = match op {
            // the right operand only runs when the left one does not decide
            BinaryOp::And => {
                let lhs = self.evaluate(left)?;
                Value::Boolean(expect_bool(&lhs, left.span, "logical and")? && {
                    let rhs = self.evaluate(right)?;
                    expect_bool(&rhs, right.span, "logical and")?
                })
            }
            BinaryOp::Or => {
                let lhs = self.evaluate(left)?;
                Value::Boolean(expect_bool(&lhs, left.span, "logical or")? || {
                    let rhs = self.evaluate(right)?;
                    expect_bool(&rhs, right.span, "logical or")?
                })
            }
            BinaryOp::Equal => {
                let (lhs, rhs) = self.operands(left, right)?;
                Value::Boolean(lhs == rhs)
            }
            BinaryOp::NotEqual => {
                let (lhs, rhs) = self.operands(left, right)?;
                Value::Boolean(lhs != rhs)
            }
            BinaryOp::Add => self.arithmetic(left, right, op_span, "addition", i64::checked_add)?,
            BinaryOp::Subtract => {
                self.arithmetic(left, right, op_span, "subtraction", i64::checked_sub)?
            }
            BinaryOp::Multiply => {
                self.arithmetic(left, right, op_span, "multiplication", i64::checked_mul)?
            }
            BinaryOp::Divide => {
                // the divisor is checked, and tested for zero, before the dividend
                let (lhs, rhs) = self.operands(left, right)?;
                let divisor = expect_number(&rhs, op_span, "division")?;
                if divisor == 0 {
                    return fail(RuntimeErrorKind::DivisionByZero, op_span);
                }
                let dividend = expect_number(&lhs, op_span, "division")?;
                Value::Integer(
                    dividend
                        .checked_div(divisor)
                        .ok_or_else(|| overflow(op_span, "division"))?,
                )
            }
            BinaryOp::Less => {
                let (lhs, rhs) = self.numbers(left, right, op_span, "comparison")?;
                Value::Boolean(lhs < rhs)
            }
            BinaryOp::LessEqual => {
                let (lhs, rhs) = self.numbers(left, right, op_span, "comparison")?;
                Value::Boolean(lhs <= rhs)
            }
            BinaryOp::Greater => {
                let (lhs, rhs) = self.numbers(left, right, op_span, "comparison")?;
                Value::Boolean(lhs > rhs)
            }
            BinaryOp::GreaterEqual => {
                let (lhs, rhs) = self.numbers(left, right, op_span, "comparison")?;
                Value::Boolean(lhs >= rhs)
            }
        };
        Ok(value)
    }

    /// Evaluate both operands, left first.
    fn operands(&mut self, left: &Expr, right: &Expr) -> RunResult<(Value, Value)> {
        let lhs = self.evaluate(left)?;
        let rhs = self.evaluate(right)?;
        Ok((lhs, rhs))
    }

    fn numbers(
        &mut self,
        left: &Expr,
        right: &Expr,
        op_span: Span,
        context: &'static str,
    ) -> RunResult<(i64, i64)> {
        let (lhs, rhs) = self.operands(left, right)?;
        Ok((
            expect_number(&lhs, op_span, context)?,
            expect_number(&rhs, op_span, context)?,
        ))
    }

    fn arithmetic(
        &mut self,
        left: &Expr,
        right: &Expr,
        op_span: Span,
        context: &'static str,
        apply: fn(i64, i64) -> Option<i64>,
    ) -> RunResult<Value> {
        let (lhs, rhs) = self.numbers(left, right, op_span, context)?;
        let result = apply(lhs, rhs).ok_or_else(|| overflow(op_span, context))?;
        Ok(Value::Integer(result))
    }

    fn evaluate_call(
        &mut self,
        callee: &Expr,
        arguments: &[Expr],
        paren: Span,
        span: Span,
    ) -> RunResult<Value> {
        match self.evaluate(callee)? {
            Value::Builtin(builtin) => {
                if let Arity::Fixed(expected) = builtin.arity {
                    check_arity(expected, arguments.len(), paren)?;
                }
                let values = self.evaluate_arguments(arguments)?;
                tracing::trace!(builtin = builtin.name, arguments = values.len(), "call");
                builtin.call(&values, &mut *self.output).map_err(|err| {
                    Unwind::Error(RuntimeError::new(
                        RuntimeErrorKind::Output(err.to_string()),
                        span,
                    ))
                })
            }
            Value::Function(function) => self.call_function(&function, arguments, paren, span),
            _ => fail(RuntimeErrorKind::NotCallable, span),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        arguments: &[Expr],
        paren: Span,
        span: Span,
    ) -> RunResult<Value> {
        let params = &function.declaration.params;
        check_arity(params.len(), arguments.len(), paren)?;
        let values = self.evaluate_arguments(arguments)?;

        if self.function_depth >= self.call_depth_limit {
            return fail(
                RuntimeErrorKind::CallDepthExceeded(self.call_depth_limit),
                span,
            );
        }

        let scope = Environment::child(&function.closure);
        for (param, value) in params.iter().zip(values) {
            if !scope.borrow_mut().define(&param.name, value) {
                return fail(
                    RuntimeErrorKind::DuplicateParameter(param.name.clone()),
                    param.span,
                );
            }
        }

        tracing::trace!(
            function = function.name(),
            arguments = params.len(),
            depth = self.function_depth + 1,
            "call"
        );

        self.function_depth += 1;
        let result = self.execute_block(&function.declaration.body, scope);
        self.function_depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
            // handed to the loop around the call site
            flow @ (Flow::Break | Flow::Continue) => Err(Unwind::Loop(flow)),
        }
    }

    fn evaluate_arguments(&mut self, arguments: &[Expr]) -> RunResult<Vec<Value>> {
        arguments.iter().map(|arg| self.evaluate(arg)).collect()
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        // global functions capture the global scope; break those cycles
        self.globals.borrow_mut().clear();
    }
}

fn fail<T>(kind: RuntimeErrorKind, span: Span) -> RunResult<T> {
    Err(Unwind::Error(RuntimeError::new(kind, span)))
}

fn expect_number(value: &Value, span: Span, context: &'static str) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(RuntimeError::new(
            RuntimeErrorKind::ExpectedNumber {
                context,
                found: other.type_name(),
            },
            span,
        )),
    }
}

fn expect_bool(value: &Value, span: Span, context: &'static str) -> Result<bool, RuntimeError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(RuntimeError::new(
            RuntimeErrorKind::ExpectedBoolean {
                context,
                found: other.type_name(),
            },
            span,
        )),
    }
}

const fn check_arity(expected: usize, found: usize, paren: Span) -> Result<(), RuntimeError> {
    if expected == found {
        Ok(())
    } else {
        Err(RuntimeError::new(
            RuntimeErrorKind::ArityMismatch { expected, found },
            paren,
        ))
    }
}

const fn overflow(span: Span, context: &'static str) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::IntegerOverflow { context }, span)
}
