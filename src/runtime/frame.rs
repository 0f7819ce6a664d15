use std::rc::Rc;

use crate::lang::object::Closure;

/// One active function call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Offset of the next instruction to decode.
    pub ip: usize,
    /// Stack index of the first local; arguments sit at the bottom.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        self.closure.function.instructions.as_bytes()
    }

    pub fn name(&self) -> &str {
        self.closure.function.name.as_deref().unwrap_or("<anonymous>")
    }
}
