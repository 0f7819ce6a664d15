use thiserror::Error;

use crate::bytecode::op::EncodeError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A name that resolves at no level: local, enclosing, global or builtin.
    #[error("compile error: undefined variable '{0}'")]
    UndefinedVariable(String),

    /// A construct that's valid syntax but appeared where it can't be lowered.
    #[error("compile error: {construct}: {reason}{}", hint_suffix(.hint))]
    InvalidPosition {
        construct: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("compile error: expression nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// An operand did not fit its encoding, e.g. more than 65536 constants.
    #[error("compile error: {0}")]
    Encode(#[from] EncodeError),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\n  hint: {}", h),
        None => String::new(),
    }
}

impl CompileError {
    pub fn return_outside_function() -> Self {
        CompileError::InvalidPosition {
            construct: "return".to_string(),
            reason: "return statements cannot appear at the top level".to_string(),
            hint: Some("use `return` only inside a function body".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_hint() {
        let message = CompileError::return_outside_function().to_string();
        assert_eq!(
            message,
            "compile error: return: return statements cannot appear at the top level\n  hint: use `return` only inside a function body"
        );
    }

    #[test]
    fn test_display_undefined() {
        assert_eq!(
            CompileError::UndefinedVariable("x".to_string()).to_string(),
            "compile error: undefined variable 'x'"
        );
    }
}
