//! End-to-end tests: whole programs from source text to printed output
//! and diagnostics.

mod common;

use basic_interpreter::{Error, Lexer, Parser, check_str, run_str};
use common::{assert_output, run};

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_output("print(1 + 2 * 3);", "7\n");
    assert_output("print((1 + 2) * 3);", "9\n");
}

#[test]
fn reassignment() {
    assert_output("let x = 5; x = x + 1; print(x);", "6\n");
}

#[test]
fn function_call() {
    assert_output("fn add(a,b) { return a + b; } print(add(2,3));", "5\n");
}

#[test]
fn infinite_loop_left_with_break() {
    assert_output("while(true){break;} print(1);", "1\n");
    assert_output("while (false) { break; } print(1);", "1\n");
}

#[test]
fn top_level_break_halts_the_run() {
    let (out, errors) = run("print(0); break; print(1);");
    assert_eq!(out, "0\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("outside of a loop"), "{errors:?}");
}

#[test]
fn redeclaration_is_a_runtime_error() {
    let program = check_str("let x = 1; let x = 2;").expect("parses cleanly");
    assert_eq!(program.len(), 2);

    let (_, errors) = run("let x = 1; let x = 2;");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("already declared"), "{errors:?}");
}

#[test]
fn division_by_zero_produces_no_result() {
    let (out, errors) = run("print(7 / 0);");
    assert_eq!(out, "");
    assert_eq!(errors, vec!["Line 1, col 9: Division by zero."]);
}

#[test]
fn short_circuit_skips_division() {
    assert_output("print(false && (1/0 == 0));", "false\n");
}

#[test]
fn closure_sees_update_made_after_declaration() {
    assert_output(
        "let greeting = 1;\n\
         fn show() { print(greeting); }\n\
         greeting = 2;\n\
         show();",
        "2\n",
    );
}

#[test]
fn statement_count_matches_top_level_declarations() {
    let source = "let a = 1;\nfn f(x) { return x; }\nif (a == 1) { print(f(a)); }\nwhile (false) {}\n{ }\nf(2);";
    let mut lexer = Lexer::new(source);
    let mut parser = Parser::new(lexer.scan_tokens());
    let program = parser.parse();
    assert!(lexer.errors().is_empty());
    assert!(parser.errors().is_empty());
    assert_eq!(program.len(), 6);
}

#[test]
fn fizzbuzz_style_program() {
    let source = "\
fn divides(d, n) { return (n / d) * d == n; }
let i = 1;
let fizz = 0;
let buzz = 0;
while (i <= 15) {
  if (divides(15, i)) { print(i, true, true); }
  else if (divides(3, i)) { fizz = fizz + 1; }
  else if (divides(5, i)) { buzz = buzz + 1; }
  i = i + 1;
}
print(fizz, buzz);
";
    assert_output(source, "15 true true\n4 2\n");
}

#[test]
fn higher_order_functions() {
    let source = "\
fn twice(f, x) { return f(f(x)); }
fn inc(n) { return n + 1; }
fn adder(k) {
  fn add(n) { return n + k; }
  return add;
}
print(twice(inc, 5), twice(adder(10), 1));
";
    assert_output(source, "7 21\n");
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    assert_output(
        "// leading comment\n\nlet x = 2; // trailing\n// print(99);\nprint(x * x);\n",
        "4\n",
    );
}

#[test]
fn runtime_error_reports_line_of_fault() {
    let (out, errors) = run("let a = 1;\nprint(a);\nprint(a + true);\nprint(3);");
    assert_eq!(out, "1\n");
    assert_eq!(
        errors,
        vec!["Line 3, col 9: Expected number in addition, got boolean."]
    );
}

#[test]
fn run_str_reports_each_stage() {
    let mut out = Vec::new();
    run_str("print(1, 2);", &mut out).expect("runs");
    assert_eq!(out, b"1 2\n");

    let err = run_str("let x = 1 & 2;", std::io::sink()).expect_err("lex error");
    assert!(matches!(err, Error::Lex(_)));
    assert_eq!(
        err.to_string(),
        "Line 1, col 11: Unexpected '&' without pair."
    );

    let err = run_str("let = 1;\nprint(;", std::io::sink()).expect_err("parse error");
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(
        err.messages(),
        vec![
            "Line 1, col 5: Expect variable name after 'let'.",
            "Line 2, col 7: Expect expression.",
        ]
    );

    let err = run_str("continue;", std::io::sink()).expect_err("runtime error");
    assert!(matches!(err, Error::Runtime(_)));
    assert_eq!(err.to_string(), "Line 1, col 1: Continue used outside of a loop.");
}

#[test]
fn literal_boundary() {
    assert_output("print(9223372036854775807);", "9223372036854775807\n");
    let err = check_str("print(9223372036854775808);").expect_err("out of range");
    assert_eq!(
        err.to_string(),
        "Line 1, col 7: Integer literal out of range."
    );
}
