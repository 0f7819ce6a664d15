use thiserror::Error;

/// Everything that can stop the VM. The stack is left as it was when the
/// error was raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A binary operator applied to operands of two different types.
    #[error("runtime error: type mismatch: {left} {op} {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("runtime error: unknown operator: {left} {op} {right}")]
    UnsupportedOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("runtime error: unknown operator: {op}{operand}")]
    UnsupportedUnary { op: &'static str, operand: &'static str },

    #[error("runtime error: division by zero")]
    DivisionByZero,

    #[error("runtime error: calling non-function: {0}")]
    NotCallable(&'static str),

    #[error("runtime error: wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("runtime error: unusable as hash key: {0}")]
    UnhashableKey(&'static str),

    #[error("runtime error: index operator not supported: {left}[{index}]")]
    IndexNotSupported {
        left: &'static str,
        index: &'static str,
    },

    #[error("runtime error: stack overflow (limit {0})")]
    StackOverflow(usize),

    #[error("runtime error: stack underflow")]
    StackUnderflow,

    #[error("runtime error: call depth limit exceeded ({0})\n  hint: check for unbounded recursion")]
    CallDepthExceeded(usize),

    #[error("runtime error: execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("runtime error: undefined opcode {opcode} at offset {ip}")]
    UnknownOpcode { opcode: u8, ip: usize },

    #[error("runtime error: malformed {op} at offset {ip}")]
    MalformedInstruction { op: &'static str, ip: usize },

    /// `OpClosure` pointed at a constant that is not a compiled function.
    #[error("runtime error: not a function: {0}")]
    NotAFunction(&'static str),

    #[error("runtime error: return outside of a function")]
    ReturnOutsideFunction,

    #[error("runtime error: {name}: {message}")]
    Builtin { name: &'static str, message: String },
}

impl RuntimeError {
    pub fn builtin(name: &'static str, message: impl Into<String>) -> Self {
        RuntimeError::Builtin {
            name,
            message: message.into(),
        }
    }
}
