//! CLI tool that runs a script, or dumps its tokens or syntax tree.

use std::fs;
use std::process::ExitCode;

use basic_interpreter::{Interpreter, Lexer, Parser, format_program, format_tokens};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: basic-interpreter [--tokens | --ast] [--trace] [-v...] <path>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dump {
    Tokens,
    Ast,
}

#[derive(Debug, PartialEq, Eq)]
struct Options {
    path: String,
    dump: Option<Dump>,
    trace: bool,
    verbose: u8,
}

/// Count of `v`s in a `-v`, `-vv`, ... flag.
fn verbosity(flag: &str) -> Option<u8> {
    let vs = flag.strip_prefix('-')?;
    if vs.is_empty() || !vs.bytes().all(|b| b == b'v') {
        return None;
    }
    Some(u8::try_from(vs.len()).unwrap_or(u8::MAX))
}

/// Parse everything after the program name. `Err` carries a message
/// to print above the usage line, empty for plain usage.
fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut path = None;
    let mut dump = None;
    let mut trace = false;
    let mut verbose: u8 = 0;

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Err(String::new()),
            "--tokens" => dump = Some(Dump::Tokens),
            "--ast" => dump = Some(Dump::Ast),
            "--trace" => trace = true,
            flag if flag.starts_with('-') => match verbosity(flag) {
                Some(count) => verbose = verbose.saturating_add(count),
                None => return Err(format!("Unknown option: {flag}")),
            },
            other => {
                if path.is_some() {
                    return Err(format!("Unexpected argument: {other}"));
                }
                path = Some(other.to_string());
            }
        }
    }

    let Some(path) = path else {
        return Err(String::new());
    };
    Ok(Options {
        path,
        dump,
        trace,
        verbose,
    })
}

fn directive_for_verbosity(v: u8) -> &'static str {
    match v {
        0 => "basic_interpreter=warn",
        1 => "basic_interpreter=debug",
        _ => "basic_interpreter=trace",
    }
}

fn init_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(directive_for_verbosity(verbose))),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    init_logging(options.verbose);

    let path = &options.path;
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to open file '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };

    run(&source, &options)
}

fn run(source: &str, options: &Options) -> ExitCode {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.scan_tokens();
    if report(&lexer.errors()) {
        return ExitCode::FAILURE;
    }
    if options.dump == Some(Dump::Tokens) {
        print!("{}", format_tokens(&tokens));
        return ExitCode::SUCCESS;
    }

    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    if report(&parser.errors()) {
        return ExitCode::FAILURE;
    }
    if options.dump == Some(Dump::Ast) {
        print!("{}", format_program(&program));
        return ExitCode::SUCCESS;
    }

    let mut interpreter = Interpreter::new();
    if options.trace {
        interpreter.set_trace_hook(|stmt, value| match value {
            Some(value) => println!("Trace: {} -> {value}", stmt.label()),
            None => println!("Trace: {}", stmt.label()),
        });
    }
    interpreter.interpret(&program);
    if report(&interpreter.errors()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Print `errors` to stderr; true if there were any.
fn report(errors: &[String]) -> bool {
    for message in errors {
        eprintln!("{message}");
    }
    !errors.is_empty()
}
