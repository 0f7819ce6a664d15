use std::fmt;

use serde::{Deserialize, Serialize};

use super::disasm;
use super::op::{EncodeError, Opcode, make};
use crate::lang::object::Object;

/// An owned, growable buffer of encoded instructions.
///
/// Jump targets are absolute byte offsets into this buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Appends an encoded instruction and returns its starting offset.
    pub fn append(&mut self, instruction: &[u8]) -> usize {
        let position = self.0.len();
        self.0.extend_from_slice(instruction);
        position
    }

    /// Drops everything from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Overwrites the bytes at `position` with `instruction`. The new
    /// instruction must fit inside the buffer.
    pub fn replace(&mut self, position: usize, instruction: &[u8]) -> Result<(), EncodeError> {
        let end = position + instruction.len();
        match self.0.get_mut(position..end) {
            Some(slot) => {
                slot.copy_from_slice(instruction);
                Ok(())
            }
            None => Err(EncodeError::PatchOutOfBounds(position)),
        }
    }

    /// Re-encodes the instruction at `position` with a new operand. Used to
    /// backpatch jump placeholders once the target offset is known.
    pub fn patch_operand(&mut self, position: usize, operand: usize) -> Result<(), EncodeError> {
        let op = self
            .0
            .get(position)
            .and_then(|byte| Opcode::try_from(*byte).ok())
            .ok_or(EncodeError::PatchOutOfBounds(position))?;
        let instruction = make(op, &[operand])?;
        self.replace(position, &instruction)
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self(iter.into_iter().flatten().collect())
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", disasm::disassemble(&self.0))
    }
}

/// A compiled program: the top-level instructions plus the constant pool
/// they index into. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

impl Bytecode {
    /// Serializes to postcard's compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", disasm::disassemble_bytecode(self))
    }
}
