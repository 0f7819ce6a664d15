use std::fmt;

use super::object::Object;
use crate::runtime::RuntimeError;

pub type BuiltinFn = fn(&[Object]) -> Result<Object, RuntimeError>;

/// A native function callable from Monkey code.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Built-in functions. The position in this table is the operand of
/// `OpGetBuiltin`; the compiler and the VM must use the same table.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: len,
    },
    Builtin {
        name: "puts",
        func: puts,
    },
    Builtin {
        name: "first",
        func: first,
    },
    Builtin {
        name: "last",
        func: last,
    },
    Builtin {
        name: "rest",
        func: rest,
    },
    Builtin {
        name: "push",
        func: push,
    },
];

fn expect_args(name: &'static str, args: &[Object], want: usize) -> Result<(), RuntimeError> {
    if args.len() != want {
        return Err(RuntimeError::builtin(
            name,
            format!("wrong number of arguments. got={}, want={}", args.len(), want),
        ));
    }
    Ok(())
}

fn unsupported(name: &'static str, arg: &Object) -> RuntimeError {
    RuntimeError::builtin(
        name,
        format!("argument to `{}` not supported, got {}", name, arg.type_name()),
    )
}

fn len(args: &[Object]) -> Result<Object, RuntimeError> {
    expect_args("len", args, 1)?;
    match &args[0] {
        Object::String(s) => Ok(Object::Integer(s.len() as i64)),
        Object::Array(elements) => Ok(Object::Integer(elements.borrow().len() as i64)),
        other => Err(unsupported("len", other)),
    }
}

fn puts(args: &[Object]) -> Result<Object, RuntimeError> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(Object::Null)
}

fn first(args: &[Object]) -> Result<Object, RuntimeError> {
    expect_args("first", args, 1)?;
    match &args[0] {
        Object::Array(elements) => Ok(elements.borrow().first().cloned().unwrap_or(Object::Null)),
        other => Err(unsupported("first", other)),
    }
}

fn last(args: &[Object]) -> Result<Object, RuntimeError> {
    expect_args("last", args, 1)?;
    match &args[0] {
        Object::Array(elements) => Ok(elements.borrow().last().cloned().unwrap_or(Object::Null)),
        other => Err(unsupported("last", other)),
    }
}

fn rest(args: &[Object]) -> Result<Object, RuntimeError> {
    expect_args("rest", args, 1)?;
    match &args[0] {
        Object::Array(elements) => {
            let elements = elements.borrow();
            if elements.is_empty() {
                Ok(Object::Null)
            } else {
                Ok(Object::array(elements[1..].to_vec()))
            }
        }
        other => Err(unsupported("rest", other)),
    }
}

fn push(args: &[Object]) -> Result<Object, RuntimeError> {
    expect_args("push", args, 2)?;
    match &args[0] {
        Object::Array(elements) => {
            let mut extended = elements.borrow().clone();
            extended.push(args[1].clone());
            Ok(Object::array(extended))
        }
        other => Err(unsupported("push", other)),
    }
}
