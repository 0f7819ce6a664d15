use thiserror::Error;

// =============================================================================
// OPCODES - one byte each, followed by fixed-width big-endian operands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // literals
    Constant,
    True,
    False,
    Null,

    // stack
    Pop,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // comparison
    Equal,
    NotEqual,
    GreaterThan,

    // unary
    Minus,
    Bang,

    // control flow (absolute byte offsets)
    Jump,
    JumpNotTruthy,

    // bindings
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    GetFree,
    GetBuiltin,

    // collections
    Array,
    Hash,
    Index,

    // functions
    Call,
    ReturnValue,
    Return,
    Closure,
    CurrentClosure,
}

/// Static description of an opcode: its mnemonic and operand widths in bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total encoded length of an instruction using this definition.
    pub fn width(&self) -> usize {
        1 + self.operand_widths.iter().sum::<usize>()
    }
}

macro_rules! def {
    ($name:literal) => {
        &Definition {
            name: $name,
            operand_widths: &[],
        }
    };
    ($name:literal, $($w:literal),+) => {
        &Definition {
            name: $name,
            operand_widths: &[$($w),+],
        }
    };
}

impl Opcode {
    /// Every opcode, in byte order.
    pub const ALL: [Opcode; 30] = [
        Opcode::Constant,
        Opcode::True,
        Opcode::False,
        Opcode::Null,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Equal,
        Opcode::NotEqual,
        Opcode::GreaterThan,
        Opcode::Minus,
        Opcode::Bang,
        Opcode::Jump,
        Opcode::JumpNotTruthy,
        Opcode::GetGlobal,
        Opcode::SetGlobal,
        Opcode::GetLocal,
        Opcode::SetLocal,
        Opcode::GetFree,
        Opcode::GetBuiltin,
        Opcode::Array,
        Opcode::Hash,
        Opcode::Index,
        Opcode::Call,
        Opcode::ReturnValue,
        Opcode::Return,
        Opcode::Closure,
        Opcode::CurrentClosure,
    ];

    pub fn definition(self) -> &'static Definition {
        match self {
            Opcode::Constant => def!("OpConstant", 2),
            Opcode::True => def!("OpTrue"),
            Opcode::False => def!("OpFalse"),
            Opcode::Null => def!("OpNull"),
            Opcode::Pop => def!("OpPop"),
            Opcode::Add => def!("OpAdd"),
            Opcode::Sub => def!("OpSub"),
            Opcode::Mul => def!("OpMul"),
            Opcode::Div => def!("OpDiv"),
            Opcode::Equal => def!("OpEqual"),
            Opcode::NotEqual => def!("OpNotEqual"),
            Opcode::GreaterThan => def!("OpGreaterThan"),
            Opcode::Minus => def!("OpMinus"),
            Opcode::Bang => def!("OpBang"),
            Opcode::Jump => def!("OpJump", 2),
            Opcode::JumpNotTruthy => def!("OpJumpNotTruthy", 2),
            Opcode::GetGlobal => def!("OpGetGlobal", 2),
            Opcode::SetGlobal => def!("OpSetGlobal", 2),
            Opcode::GetLocal => def!("OpGetLocal", 1),
            Opcode::SetLocal => def!("OpSetLocal", 1),
            Opcode::GetFree => def!("OpGetFree", 1),
            Opcode::GetBuiltin => def!("OpGetBuiltin", 1),
            Opcode::Array => def!("OpArray", 2),
            Opcode::Hash => def!("OpHash", 2),
            Opcode::Index => def!("OpIndex"),
            Opcode::Call => def!("OpCall", 1),
            Opcode::ReturnValue => def!("OpReturnValue"),
            Opcode::Return => def!("OpReturn"),
            Opcode::Closure => def!("OpClosure", 2, 1),
            Opcode::CurrentClosure => def!("OpCurrentClosure"),
        }
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    /// Encoded length of this instruction including operands.
    pub fn width(self) -> usize {
        self.definition().width()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(DecodeError::UnknownOpcode(byte))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{op} takes {expected} operand(s), got {got}")]
    OperandCount {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("operand {value} of {op} does not fit in {width} byte(s)")]
    OperandOverflow {
        op: &'static str,
        value: usize,
        width: usize,
    },

    #[error("no instruction at offset {0} to patch")]
    PatchOutOfBounds(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("undefined opcode {0}")]
    UnknownOpcode(u8),

    #[error("truncated instruction: {op} needs {needed} operand byte(s), {available} available")]
    Truncated {
        op: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Looks up the definition for a raw opcode byte.
pub fn lookup(byte: u8) -> Result<&'static Definition, DecodeError> {
    Opcode::try_from(byte).map(Opcode::definition)
}

fn fits(value: usize, width: usize) -> bool {
    match width {
        1 => value <= u8::MAX as usize,
        2 => value <= u16::MAX as usize,
        _ => false,
    }
}

/// Encodes one instruction: the opcode byte followed by each operand,
/// big-endian, at the width its definition gives.
pub fn make(op: Opcode, operands: &[usize]) -> Result<Vec<u8>, EncodeError> {
    let def = op.definition();

    if operands.len() != def.operand_widths.len() {
        return Err(EncodeError::OperandCount {
            op: def.name,
            expected: def.operand_widths.len(),
            got: operands.len(),
        });
    }

    let mut instruction = Vec::with_capacity(def.width());
    instruction.push(op as u8);

    for (&operand, &width) in operands.iter().zip(def.operand_widths) {
        if !fits(operand, width) {
            return Err(EncodeError::OperandOverflow {
                op: def.name,
                value: operand,
                width,
            });
        }
        match width {
            2 => instruction.extend_from_slice(&(operand as u16).to_be_bytes()),
            _ => instruction.push(operand as u8),
        }
    }

    Ok(instruction)
}

/// Decodes the operands that follow an opcode. Returns the operands and
/// the number of bytes they occupied.
pub fn read_operands(
    def: &'static Definition,
    ins: &[u8],
) -> Result<(Vec<usize>, usize), DecodeError> {
    let needed = def.width() - 1;
    if ins.len() < needed {
        return Err(DecodeError::Truncated {
            op: def.name,
            needed,
            available: ins.len(),
        });
    }

    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for &width in def.operand_widths {
        let operand = match width {
            2 => u16::from_be_bytes([ins[offset], ins[offset + 1]]) as usize,
            _ => ins[offset] as usize,
        };
        operands.push(operand);
        offset += width;
    }

    Ok((operands, offset))
}

pub fn read_u16(ins: &[u8]) -> Option<u16> {
    match ins {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

pub fn read_u8(ins: &[u8]) -> Option<u8> {
    ins.first().copied()
}
