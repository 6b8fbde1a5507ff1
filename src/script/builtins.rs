//! Native functions visible from every scope.

use crate::error::EvalError;
use crate::value::{Builtin, Value};

const BUILTINS: &[Builtin] = &[
    Builtin { name: "print", func: print },
    Builtin { name: "str", func: to_str },
    Builtin { name: "len", func: len },
    Builtin { name: "typename", func: typename },
    Builtin { name: "isinstance", func: isinstance },
];

/// Resolves a builtin by name. Bindings in scope shadow these.
pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS
        .iter()
        .find(|builtin| builtin.name == name)
        .map(|builtin| Value::Builtin(*builtin))
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::new(format!(
            "TypeError: {name}() takes {expected} argument(s) but {} were given",
            args.len()
        )))
    }
}

fn print(args: &[Value]) -> Result<Value, EvalError> {
    let shown: Vec<String> = args.iter().map(Value::to_string).collect();
    println!("{}", shown.join(" "));
    Ok(Value::Nil)
}

fn to_str(args: &[Value]) -> Result<Value, EvalError> {
    arity("str", args, 1)?;
    Ok(Value::str(args[0].to_string()))
}

fn len(args: &[Value]) -> Result<Value, EvalError> {
    arity("len", args, 1)?;
    let count = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        other => {
            return Err(EvalError::new(format!(
                "TypeError: object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(count as i64))
}

fn typename(args: &[Value]) -> Result<Value, EvalError> {
    arity("typename", args, 1)?;
    Ok(Value::str(args[0].type_name()))
}

fn isinstance(args: &[Value]) -> Result<Value, EvalError> {
    arity("isinstance", args, 2)?;
    let Some(class) = args[1].as_type() else {
        return Err(EvalError::new(
            "TypeError: isinstance() arg 2 must be a type",
        ));
    };
    let matches = match &args[0] {
        Value::Instance(instance) => instance.class().descends_from(class),
        _ => false,
    };
    Ok(Value::Bool(matches))
}
