//! # Monkey language model
//!
//! The syntax tree produced by the parser, and the runtime objects shared by
//! the compiler's constant pool and the virtual machine.
//!
//! ## Conventions
//!
//! - AST nodes own their children; the tree is never mutated after parsing.
//! - `Object` is the only thing that lives on the VM stack, in globals, in
//!   the constant pool, or in a closure's captured slots.

pub mod ast;
pub mod builtins;
pub mod object;
