//! A compiler and stack virtual machine for the Monkey language.
//!
//! Source flows through four stages: [`frontend`] turns text into a
//! syntax tree, [`bytecode`] compiles the tree into instructions plus a
//! constant pool, [`runtime`] executes them, and [`session`] strings the
//! stages together while keeping global state between inputs.

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod runtime;
pub mod session;

pub use bytecode::{Bytecode, CompileError, Compiler};
pub use frontend::ParserError;
pub use lang::object::Object;
pub use runtime::{RuntimeError, Vm};
pub use session::Session;

/// Any failure from evaluating source text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every syntax error found in the input, in source order.
    #[error("{}", format_parse_errors(.0))]
    Parse(Vec<ParserError>),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A runtime failure and the frames that were active, outermost first.
    #[error("{error}{}", format_call_stack(.call_stack))]
    Runtime {
        error: RuntimeError,
        call_stack: Vec<String>,
    },
}

impl From<RuntimeError> for Error {
    fn from(error: RuntimeError) -> Self {
        Error::Runtime {
            error,
            call_stack: Vec::new(),
        }
    }
}

fn format_parse_errors(errors: &[ParserError]) -> String {
    let mut out = String::from("parse errors:");
    for error in errors {
        out.push_str("\n  ");
        out.push_str(&error.to_string());
    }
    out
}

fn format_call_stack(call_stack: &[String]) -> String {
    let mut out = String::new();
    if !call_stack.is_empty() {
        out.push_str("\n  call stack:");
        for (i, frame) in call_stack.iter().rev().enumerate() {
            out.push_str(&format!("\n    {}: {}", i, frame));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Span;

    #[test]
    fn test_parse_error_listing() {
        let err = Error::Parse(vec![
            ParserError::new("expected IDENT, got =", Span { line: 1, col: 5 }),
            ParserError::new("no prefix parse function for )", Span { line: 2, col: 1 }),
        ]);
        assert_eq!(
            err.to_string(),
            "parse errors:\n  1:5: expected IDENT, got =\n  2:1: no prefix parse function for )"
        );
    }

    #[test]
    fn test_runtime_error_lists_frames_innermost_first() {
        let err = Error::Runtime {
            error: RuntimeError::DivisionByZero,
            call_stack: vec!["main".to_string(), "outer".to_string(), "inner".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "runtime error: division by zero\n  call stack:\n    0: inner\n    1: outer\n    2: main"
        );
        assert_eq!(
            Error::from(RuntimeError::StackUnderflow).to_string(),
            "runtime error: stack underflow"
        );
    }
}
