use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::{
    bytecode::{
        Bytecode,
        op::{Opcode, read_u8, read_u16},
    },
    lang::{
        builtins::{BUILTINS, Builtin},
        object::{Closure, CompiledFunction, HashPair, Object},
    },
    runtime::{frame::Frame, runtime_error::RuntimeError},
};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Value stack slots, shared by every frame.
    pub stack_size: usize,
    pub max_frames: usize,
    pub globals_size: usize,
    /// Dispatch step budget; `None` runs to completion.
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 2048,
            max_frames: 1024,
            globals_size: 65536,
            max_steps: None,
        }
    }
}

/// A decoded instruction: the opcode, its operands, and where it started.
#[derive(Debug, Clone, Copy)]
struct Instruction {
    op: Opcode,
    operands: [usize; 2],
    ip: usize,
}

pub struct Vm {
    constants: Vec<Object>,

    /// Fixed-size stack; `sp` points at the next free slot. The slot at
    /// `sp` after a pop still holds the popped value.
    stack: Vec<Object>,
    sp: usize,

    globals: Vec<Object>,
    frames: Vec<Frame>,
    builtins: &'static [Builtin],

    config: VmConfig,
    steps: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_config(bytecode, VmConfig::default())
    }

    pub fn with_config(bytecode: Bytecode, config: VmConfig) -> Self {
        Self::with_globals(bytecode, Vec::new(), BUILTINS, config)
    }

    /// Starts a VM over an existing globals store, e.g. one carried between
    /// interactive inputs.
    pub fn with_globals(
        bytecode: Bytecode,
        globals: Vec<Object>,
        builtins: &'static [Builtin],
        config: VmConfig,
    ) -> Self {
        let main = CompiledFunction {
            instructions: bytecode.instructions,
            name: Some("main".to_string()),
            ..CompiledFunction::default()
        };
        let main = Closure {
            function: Rc::new(main),
            free: Vec::new(),
        };

        Self {
            constants: bytecode.constants,
            stack: vec![Object::Null; config.stack_size],
            sp: 0,
            globals,
            frames: vec![Frame::new(Rc::new(main), 0)],
            builtins,
            config,
            steps: 0,
        }
    }

    /// The element most recently popped off the stack, which is the value
    /// of the last expression statement.
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack.get(self.sp).cloned().unwrap_or(Object::Null)
    }

    pub fn stack_top(&self) -> Option<&Object> {
        match self.sp {
            0 => None,
            sp => self.stack.get(sp - 1),
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Names of the active frames, outermost (`main`) first. After `run`
    /// fails this is the call chain that was executing.
    pub fn call_stack(&self) -> Vec<String> {
        self.frames.iter().map(|frame| frame.name().to_string()).collect()
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    // Execution

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while let Some(instruction) = self.fetch()? {
            self.check_limits()?;
            self.execute(instruction)?;
        }
        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimitExceeded(max));
            }
        }

        Ok(())
    }

    /// Decodes the instruction at the current frame's ip and moves the ip
    /// past it. Returns `None` once the main frame runs out of code.
    fn fetch(&mut self) -> Result<Option<Instruction>, RuntimeError> {
        loop {
            let frame = self.current_frame_mut();
            let ip = frame.ip;
            let ins = frame.instructions();

            let Some(&byte) = ins.get(ip) else {
                // Function bodies always end in a return; treat running off
                // the end of one the same way.
                if self.frames.len() > 1 {
                    self.return_from_call(Object::Null)?;
                    continue;
                }
                return Ok(None);
            };

            let op = Opcode::try_from(byte)
                .map_err(|_| RuntimeError::UnknownOpcode { opcode: byte, ip })?;
            let def = op.definition();

            let mut operands = [0usize; 2];
            let mut offset = ip + 1;
            for (slot, &width) in operands.iter_mut().zip(def.operand_widths) {
                let rest = ins.get(offset..).unwrap_or(&[]);
                let operand = match width {
                    2 => read_u16(rest).map(usize::from),
                    _ => read_u8(rest).map(usize::from),
                };
                *slot = operand.ok_or(RuntimeError::MalformedInstruction { op: def.name, ip })?;
                offset += width;
            }

            frame.ip = offset;
            return Ok(Some(Instruction { op, operands, ip }));
        }
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), RuntimeError> {
        let Instruction { op, operands, ip } = instruction;
        let malformed = RuntimeError::MalformedInstruction { op: op.name(), ip };

        match op {
            Opcode::Constant => {
                let constant = self.constants.get(operands[0]).cloned().ok_or(malformed)?;
                self.push(constant)?;
            }

            Opcode::True => self.push(Object::Boolean(true))?,
            Opcode::False => self.push(Object::Boolean(false))?,
            Opcode::Null => self.push(Object::Null)?,

            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                self.execute_binary_operation(op)?;
            }

            Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                self.execute_comparison(op)?;
            }

            Opcode::Minus => {
                let operand = self.pop()?;
                match operand {
                    Object::Integer(n) => self.push(Object::Integer(n.wrapping_neg()))?,
                    other => {
                        return Err(RuntimeError::UnsupportedUnary {
                            op: "-",
                            operand: other.type_name(),
                        });
                    }
                }
            }

            Opcode::Bang => {
                let operand = self.pop()?;
                self.push(Object::Boolean(!operand.is_truthy()))?;
            }

            Opcode::Jump => {
                self.current_frame_mut().ip = operands[0];
            }

            Opcode::JumpNotTruthy => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.current_frame_mut().ip = operands[0];
                }
            }

            Opcode::SetGlobal => {
                let index = operands[0];
                if index >= self.config.globals_size {
                    return Err(malformed);
                }
                let value = self.pop()?;
                if index >= self.globals.len() {
                    self.globals.resize(index + 1, Object::Null);
                }
                self.globals[index] = value;
            }

            Opcode::GetGlobal => {
                let value = self.globals.get(operands[0]).cloned().unwrap_or(Object::Null);
                self.push(value)?;
            }

            Opcode::SetLocal => {
                let slot = self.current_frame().base_pointer + operands[0];
                let value = self.pop()?;
                *self.stack.get_mut(slot).ok_or(malformed)? = value;
            }

            Opcode::GetLocal => {
                let slot = self.current_frame().base_pointer + operands[0];
                let value = self.stack.get(slot).cloned().ok_or(malformed)?;
                self.push(value)?;
            }

            Opcode::GetFree => {
                let value = self
                    .current_frame()
                    .closure
                    .free
                    .get(operands[0])
                    .cloned()
                    .ok_or(malformed)?;
                self.push(value)?;
            }

            Opcode::GetBuiltin => {
                let builtin = self.builtins.get(operands[0]).ok_or(malformed)?;
                self.push(Object::Builtin(builtin))?;
            }

            Opcode::CurrentClosure => {
                let closure = Rc::clone(&self.current_frame().closure);
                self.push(Object::Closure(closure))?;
            }

            Opcode::Array => {
                let elements = self.take(operands[0])?;
                self.push(Object::array(elements))?;
            }

            Opcode::Hash => {
                let hash = self.build_hash(operands[0])?;
                self.push(hash)?;
            }

            Opcode::Index => {
                let index = self.pop()?;
                let left = self.pop()?;
                self.execute_index(left, index)?;
            }

            Opcode::Call => self.call(operands[0])?,

            Opcode::ReturnValue => {
                let value = self.pop()?;
                self.return_from_call(value)?;
            }

            Opcode::Return => self.return_from_call(Object::Null)?,

            Opcode::Closure => self.push_closure(operands[0], operands[1], malformed)?,
        }

        Ok(())
    }

    // Operators

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let (l, r) = (*l, *r);
                Object::Integer(match op {
                    Opcode::Add => l.wrapping_add(r),
                    Opcode::Sub => l.wrapping_sub(r),
                    Opcode::Mul => l.wrapping_mul(r),
                    _ if r == 0 => return Err(RuntimeError::DivisionByZero),
                    _ => l.wrapping_div(r),
                })
            }
            (Object::String(l), Object::String(r)) if op == Opcode::Add => {
                Object::String(format!("{}{}", l, r))
            }
            _ => return Err(operator_error(op, &left, &right)),
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (op, &left, &right) {
            (Opcode::GreaterThan, Object::Integer(l), Object::Integer(r)) => l > r,
            (Opcode::GreaterThan, _, _) => return Err(operator_error(op, &left, &right)),

            (_, Object::Integer(_), Object::Integer(_))
            | (_, Object::Boolean(_), Object::Boolean(_))
            | (_, Object::String(_), Object::String(_))
            | (_, Object::Null, Object::Null) => {
                let equal = left == right;
                if op == Opcode::Equal { equal } else { !equal }
            }

            _ => return Err(operator_error(op, &left, &right)),
        };

        self.push(Object::Boolean(result))
    }

    fn execute_index(&mut self, left: Object, index: Object) -> Result<(), RuntimeError> {
        let value = match (&left, &index) {
            (Object::Array(elements), Object::Integer(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| elements.borrow().get(i).cloned())
                .unwrap_or(Object::Null),

            (Object::Hash(pairs), key) => {
                let key = key
                    .hash_key()
                    .ok_or(RuntimeError::UnhashableKey(key.type_name()))?;
                pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Object::Null)
            }

            _ => {
                return Err(RuntimeError::IndexNotSupported {
                    left: left.type_name(),
                    index: index.type_name(),
                });
            }
        };

        self.push(value)
    }

    fn build_hash(&mut self, count: usize) -> Result<Object, RuntimeError> {
        let items = self.take(count)?;
        let mut pairs = HashMap::with_capacity(items.len() / 2);

        for pair in items.chunks_exact(2) {
            let (key, value) = (&pair[0], &pair[1]);
            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnhashableKey(key.type_name()))?;
            pairs.insert(
                hash_key,
                HashPair {
                    key: key.clone(),
                    value: value.clone(),
                },
            );
        }

        Ok(Object::Hash(Rc::new(pairs)))
    }

    // Calls

    fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        if self.sp < argc + 1 {
            return Err(RuntimeError::StackUnderflow);
        }
        let callee = self.stack[self.sp - 1 - argc].clone();

        match callee {
            Object::Closure(closure) => self.call_closure(closure, argc),
            Object::Builtin(builtin) => {
                let args = self.take(argc)?;
                let result = (builtin.func)(&args)?;
                // drop the callee too
                self.sp -= 1;
                self.push(result)
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        let function = &closure.function;
        if argc != function.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: function.num_parameters,
                got: argc,
            });
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeError::CallDepthExceeded(self.config.max_frames));
        }

        let base_pointer = self.sp - argc;
        let sp = base_pointer + function.num_locals;
        if sp > self.stack.len() {
            return Err(RuntimeError::StackOverflow(self.stack.len()));
        }
        for slot in &mut self.stack[self.sp..sp] {
            *slot = Object::Null;
        }

        let frame = Frame::new(closure, base_pointer);
        trace!("push frame {} (depth {})", frame.name(), self.frames.len() + 1);
        self.frames.push(frame);
        self.sp = sp;
        Ok(())
    }

    /// Pops the current frame, discards its locals and the callee slot, and
    /// pushes `value` in their place.
    fn return_from_call(&mut self, value: Object) -> Result<(), RuntimeError> {
        if self.frames.len() <= 1 {
            return Err(RuntimeError::ReturnOutsideFunction);
        }
        let Some(frame) = self.frames.pop() else {
            return Err(RuntimeError::ReturnOutsideFunction);
        };
        trace!("pop frame {} (depth {})", frame.name(), self.frames.len());

        self.sp = frame
            .base_pointer
            .checked_sub(1)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.push(value)
    }

    fn push_closure(
        &mut self,
        constant: usize,
        num_free: usize,
        malformed: RuntimeError,
    ) -> Result<(), RuntimeError> {
        let function = match self.constants.get(constant) {
            Some(Object::CompiledFunction(function)) => Rc::clone(function),
            Some(other) => return Err(RuntimeError::NotAFunction(other.type_name())),
            None => return Err(malformed),
        };
        let free = self.take(num_free)?;
        self.push(Object::Closure(Rc::new(Closure { function, free })))
    }

    // Stack operations

    fn push(&mut self, object: Object) -> Result<(), RuntimeError> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or(RuntimeError::StackOverflow(self.config.stack_size))?;
        *slot = object;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    /// Removes the top `count` elements, returned bottom first.
    fn take(&mut self, count: usize) -> Result<Vec<Object>, RuntimeError> {
        if count > self.sp {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.sp - count;
        let items = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(items)
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

fn operator_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        other => other.name(),
    }
}

/// Operands of one type that the operator doesn't handle are unsupported;
/// operands of two different types are a mismatch.
fn operator_error(op: Opcode, left: &Object, right: &Object) -> RuntimeError {
    let (op, left, right) = (operator_symbol(op), left.type_name(), right.type_name());
    if left == right {
        RuntimeError::UnsupportedOperator { op, left, right }
    } else {
        RuntimeError::TypeMismatch { op, left, right }
    }
}
