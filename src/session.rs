use std::mem;

use log::{debug, trace};

use crate::{
    Error,
    bytecode::{Compiler, CompilerConfig, compile::global_symbol_table, symbol_table::SymbolTable},
    frontend::{Lexer, Parser},
    lang::{builtins::BUILTINS, object::Object},
    runtime::{Vm, VmConfig},
};

/// Evaluates a sequence of inputs against shared state: the global symbol
/// table, the constant pool and the globals store all persist between
/// calls, so later inputs see earlier `let` bindings.
pub struct Session {
    symbols: SymbolTable,
    constants: Vec<Object>,
    globals: Vec<Object>,
    compiler_config: CompilerConfig,
    vm_config: VmConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default(), VmConfig::default())
    }

    pub fn with_config(compiler_config: CompilerConfig, vm_config: VmConfig) -> Self {
        Self {
            symbols: global_symbol_table(),
            constants: Vec::new(),
            globals: Vec::new(),
            compiler_config,
            vm_config,
        }
    }

    /// Runs `source` to completion and returns the value of the last
    /// expression statement it popped.
    ///
    /// Input with syntax errors is never compiled. A compile error leaves
    /// the session untouched; a runtime error keeps whatever globals were
    /// assigned before it was raised.
    pub fn eval(&mut self, source: &str) -> Result<Object, Error> {
        trace!("parsing {} bytes", source.len());
        let mut parser = Parser::new(Lexer::new(source));
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(Error::Parse(parser.into_errors()));
        }

        trace!("compiling {} statement(s)", program.statements.len());
        let mut compiler = Compiler::with_state(
            self.symbols.clone(),
            self.constants.clone(),
            self.compiler_config.clone(),
        );
        compiler.compile(&program)?;

        let bytecode = compiler.bytecode();
        debug!("compiled:\n{}", bytecode);
        (self.symbols, self.constants) = compiler.into_state();

        trace!("executing {} byte(s)", bytecode.instructions.len());
        let mut vm = Vm::with_globals(
            bytecode,
            mem::take(&mut self.globals),
            BUILTINS,
            self.vm_config.clone(),
        );
        let result = vm.run();
        let value = vm.last_popped_stack_elem();
        let call_stack = vm.call_stack();
        self.globals = vm.into_globals();

        match result {
            Ok(()) => Ok(value),
            Err(error) => Err(Error::Runtime { error, call_stack }),
        }
    }
}
