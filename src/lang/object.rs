use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::builtins::Builtin;
use crate::bytecode::Instructions;

/// Runtime value.
///
/// Arrays are shared and mutable in place; everything else is either a
/// plain value or immutable behind an `Rc`. Only integers, booleans and
/// strings can be hash keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    String(String),
    Array(Rc<RefCell<Vec<Object>>>),
    Hash(Rc<HashMap<HashKey, HashPair>>),

    /// A function body as it sits in the constant pool.
    CompiledFunction(Rc<CompiledFunction>),

    /// A function value with its captured free variables. Created at run
    /// time, never stored in a constant pool.
    #[serde(skip)]
    Closure(Rc<Closure>),

    #[serde(skip)]
    Builtin(&'static Builtin),

    Null,
}

/// The hashable projection of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(String),
}

/// A hash entry keeps the original key object for display and iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

impl Object {
    pub fn array(elements: Vec<Object>) -> Self {
        Object::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Object::String(value.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "integer",
            Object::Boolean(_) => "boolean",
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Hash(_) => "hash",
            Object::CompiledFunction(_) => "compiled function",
            Object::Closure(_) => "closure",
            Object::Builtin(_) => "builtin",
            Object::Null => "null",
        }
    }

    /// `false` and `null` are falsey; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::String(s) => write!(f, "{}", s),
            Object::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Object::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Object::CompiledFunction(function) => match &function.name {
                Some(name) => write!(f, "<compiled fn {}>", name),
                None => write!(f, "<compiled fn>"),
            },
            Object::Closure(closure) => match &closure.function.name {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<fn>"),
            },
            Object::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Object::Null => write!(f, "null"),
        }
    }
}
