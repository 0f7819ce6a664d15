//! Syntax tree to bytecode: the instruction set, its encoding, symbol
//! resolution and the single-pass compiler.

pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbol_table;

pub use compile::{Compiler, CompilerConfig};
pub use compile_error::CompileError;
pub use ir::{Bytecode, Instructions};
pub use op::Opcode;
