//! Native functions installed into the global scope.

use std::io::{self, Write};
use std::rc::Rc;

use crate::environment::Environment;
use crate::value::{Arity, Builtin, BuiltinFn, Value};

/// Every builtin, in registration order.
const REGISTRY: &[(&str, Arity, BuiltinFn)] = &[("print", Arity::Variadic, print)];

/// Install every builtin into `globals`.
pub fn register_builtins(globals: &mut Environment) {
    for &(name, arity, function) in REGISTRY {
        let builtin = Builtin {
            name,
            arity,
            function,
        };
        globals.define(name, Value::Builtin(Rc::new(builtin)));
    }
}

/// `print(...)`: arguments separated by spaces, then a newline.
fn print(arguments: &[Value], out: &mut dyn Write) -> io::Result<Value> {
    for (i, value) in arguments.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{value}")?;
    }
    out.write_all(b"\n")?;
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_joins_with_spaces() {
        let mut out = Vec::new();
        let result = print(
            &[Value::Integer(1), Value::Boolean(false), Value::Nil],
            &mut out,
        )
        .expect("write to vec");
        assert_eq!(result, Value::Nil);
        assert_eq!(String::from_utf8(out).expect("utf8"), "1 false nil\n");
    }

    #[test]
    fn print_without_arguments_emits_newline() {
        let mut out = Vec::new();
        print(&[], &mut out).expect("write to vec");
        assert_eq!(out, b"\n");
    }

    #[test]
    fn registers_print() {
        let globals = Environment::global();
        register_builtins(&mut globals.borrow_mut());
        let Some(Value::Builtin(print)) = globals.borrow().get("print") else {
            panic!("print not registered");
        };
        assert_eq!(print.arity, Arity::Variadic);
    }
}
