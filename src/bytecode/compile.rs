use std::rc::Rc;

use log::debug;

use crate::{
    bytecode::{
        Bytecode, Instructions,
        compile_error::CompileError,
        op::{Opcode, make},
        symbol_table::{Symbol, SymbolScope, SymbolTable, SymbolTableStack},
    },
    lang::{
        ast::{Block, Expression, FunctionLiteral, InfixOperator, PrefixOperator, Program, Statement},
        builtins::BUILTINS,
        object::{CompiledFunction, Object},
    },
};

/// Operand written into a jump before its target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Deepest expression nesting the compiler will recurse into.
    pub max_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instructions of one function body (or of the top level) being emitted.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// A symbol table with every built-in bound at its table index.
pub fn global_symbol_table() -> SymbolTable {
    let mut table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        table.define_builtin(index, builtin.name);
    }
    table
}

pub struct Compiler {
    /// Constant pool shared by the top level and every function body
    constants: Vec<Object>,

    symbols: SymbolTableStack,

    /// One entry per function literal currently being compiled, plus main
    scopes: Vec<CompilationScope>,

    config: CompilerConfig,
    depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self::with_state(global_symbol_table(), Vec::new(), config)
    }

    /// Resumes from the global table and constant pool of an earlier
    /// compilation so new input can refer to earlier bindings.
    pub fn with_state(globals: SymbolTable, constants: Vec<Object>, config: CompilerConfig) -> Self {
        Self {
            constants,
            symbols: SymbolTableStack::new(globals),
            scopes: vec![CompilationScope::default()],
            config,
            depth: 0,
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Snapshot of the top-level instructions and the constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbols.into_global(), self.constants)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[])?;
            }

            Statement::Let { name, value } => {
                self.compile_expression(value)?;

                if let Some(existing) = self.symbols.current().get(name) {
                    if matches!(existing.scope, SymbolScope::Global | SymbolScope::Local) {
                        debug!("rebinding '{}' in slot {}", name, existing.index);
                    }
                }

                let symbol = self.symbols.define(name);
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index])?,
                    _ => self.emit(Opcode::SetLocal, &[symbol.index])?,
                };
            }

            Statement::Return(value) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::return_outside_function());
                }
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[])?;
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        if self.depth >= self.config.max_depth {
            return Err(CompileError::NestingTooDeep(self.config.max_depth));
        }
        self.depth += 1;
        let result = self.compile_expression_inner(expression);
        self.depth -= 1;
        result
    }

    fn compile_expression_inner(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Integer(value) => {
                let index = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::Constant, &[index])?;
            }

            Expression::String(value) => {
                let index = self.add_constant(Object::string(value.as_str()));
                self.emit(Opcode::Constant, &[index])?;
            }

            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[])?;
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[])?;
            }

            Expression::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol)?;
            }

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOperator::Bang => self.emit(Opcode::Bang, &[])?,
                    PrefixOperator::Minus => self.emit(Opcode::Minus, &[])?,
                };
            }

            Expression::Infix { operator, left, right } => {
                // There is no less-than opcode: swap operands and use `>`
                if *operator == InfixOperator::LessThan {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[])?;
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                let opcode = match operator {
                    InfixOperator::Plus => Opcode::Add,
                    InfixOperator::Minus => Opcode::Sub,
                    InfixOperator::Multiply => Opcode::Mul,
                    InfixOperator::Divide => Opcode::Div,
                    InfixOperator::GreaterThan | InfixOperator::LessThan => Opcode::GreaterThan,
                    InfixOperator::Equal => Opcode::Equal,
                    InfixOperator::NotEqual => Opcode::NotEqual,
                };
                self.emit(opcode, &[])?;
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,

            Expression::Function(literal) => self.compile_function(literal)?,

            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()])?;
            }

            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()])?;
            }

            Expression::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2])?;
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[])?;
            }
        }
        Ok(())
    }

    /// Emits:
    ///
    /// ```text
    ///   <condition>
    ///   JumpNotTruthy else
    ///   <consequence>
    ///   Jump end
    /// else:
    ///   <alternative> | Null
    /// end:
    /// ```
    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;

        self.compile_value_block(consequence, jump_not_truthy)?;
        let jump = self.emit(Opcode::Jump, &[PLACEHOLDER])?;

        let else_start = self.current_instructions().len();
        self.change_operand(jump_not_truthy, else_start)?;

        match alternative {
            Some(block) => self.compile_value_block(block, jump)?,
            None => {
                self.emit(Opcode::Null, &[])?;
            }
        }

        let end = self.current_instructions().len();
        self.change_operand(jump, end)?;
        Ok(())
    }

    /// Compiles a block whose value is left on the stack. `start` is the
    /// position of the jump emitted right before the block.
    fn compile_value_block(&mut self, block: &Block, start: usize) -> Result<(), CompileError> {
        self.compile_block(block)?;

        let ends_in_pop = self
            .current_scope()
            .last_instruction
            .is_some_and(|last| last.opcode == Opcode::Pop && last.position > start);

        if ends_in_pop {
            self.remove_last_pop();
        } else {
            self.emit(Opcode::Null, &[])?;
        }
        Ok(())
    }

    fn compile_function(&mut self, literal: &FunctionLiteral) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = &literal.name {
            self.symbols.current_mut().define_function_name(name);
        }
        for parameter in &literal.parameters {
            self.symbols.define(parameter);
        }

        self.compile_block(&literal.body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return()?;
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[])?;
        }

        let free_symbols = self.symbols.current().free_symbols.clone();
        let num_locals = self.symbols.current().num_definitions();
        let instructions = self.leave_scope();

        for symbol in &free_symbols {
            self.load_symbol(symbol)?;
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: literal.parameters.len(),
            name: literal.name.clone(),
        };
        let index = self.add_constant(Object::CompiledFunction(Rc::new(function)));
        self.emit(Opcode::Closure, &[index, free_symbols.len()])?;
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<usize, CompileError> {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        }
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn add_constant(&mut self, object: Object) -> usize {
        self.constants.push(object);
        self.constants.len() - 1
    }

    /// Encodes and appends one instruction, returning its position.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> Result<usize, CompileError> {
        let instruction = make(opcode, operands)?;
        let scope = self.current_scope_mut();
        let position = scope.instructions.append(&instruction);

        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
        Ok(position)
    }

    fn change_operand(&mut self, position: usize, operand: usize) -> Result<(), CompileError> {
        self.current_scope_mut()
            .instructions
            .patch_operand(position, operand)?;
        Ok(())
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        self.current_scope()
            .last_instruction
            .is_some_and(|last| last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) -> Result<(), CompileError> {
        let instruction = make(Opcode::ReturnValue, &[])?;
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction.as_mut() {
            scope.instructions.replace(last.position, &instruction)?;
            last.opcode = Opcode::ReturnValue;
        }
        Ok(())
    }

    fn current_scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols.push();
    }

    fn leave_scope(&mut self) -> Instructions {
        self.symbols.pop();
        self.scopes
            .pop()
            .map(|scope| scope.instructions)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Lexer, Parser};

    fn parse(input: &str) -> Program {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        program
    }

    fn compile(input: &str) -> Bytecode {
        let mut compiler = Compiler::new();
        compiler.compile(&parse(input)).unwrap();
        compiler.bytecode()
    }

    fn instructions(parts: Vec<Vec<u8>>) -> Instructions {
        parts.into_iter().collect()
    }

    fn ins(op: Opcode, operands: &[usize]) -> Vec<u8> {
        make(op, operands).unwrap()
    }

    fn function_constant(bc: &Bytecode, index: usize) -> &CompiledFunction {
        match &bc.constants[index] {
            Object::CompiledFunction(function) => function,
            other => panic!("constant {} is not a function: {:?}", index, other),
        }
    }

    fn assert_instructions(actual: &Instructions, expected: Instructions) {
        assert_eq!(
            actual, &expected,
            "\nwant:\n{}\ngot:\n{}",
            expected, actual
        );
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_integer_arithmetic() {
        let bc = compile("1 + 2");
        assert_eq!(bc.constants, vec![Object::Integer(1), Object::Integer(2)]);
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_expression_statements_each_pop() {
        let bc = compile("1; 2");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Pop, &[]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_less_than_swaps_operands() {
        let bc = compile("1 < 2");
        assert_eq!(bc.constants, vec![Object::Integer(2), Object::Integer(1)]);
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::GreaterThan, &[]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_prefix_and_booleans() {
        let bc = compile("!true; -1");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::True, &[]),
                ins(Opcode::Bang, &[]),
                ins(Opcode::Pop, &[]),
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Minus, &[]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_conditional_with_else() {
        let bc = compile("if (true) { 10 } else { 20 }; 3333;");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::True, &[]),               // 0000
                ins(Opcode::JumpNotTruthy, &[10]),    // 0001
                ins(Opcode::Constant, &[0]),          // 0004
                ins(Opcode::Jump, &[13]),             // 0007
                ins(Opcode::Constant, &[1]),          // 0010
                ins(Opcode::Pop, &[]),                // 0013
                ins(Opcode::Constant, &[2]),          // 0014
                ins(Opcode::Pop, &[]),                // 0017
            ]),
        );
    }

    #[test]
    fn test_conditional_without_else_pushes_null() {
        let bc = compile("if (true) { 10 }; 3333;");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::True, &[]),               // 0000
                ins(Opcode::JumpNotTruthy, &[10]),    // 0001
                ins(Opcode::Constant, &[0]),          // 0004
                ins(Opcode::Jump, &[11]),             // 0007
                ins(Opcode::Null, &[]),               // 0010
                ins(Opcode::Pop, &[]),                // 0011
                ins(Opcode::Constant, &[1]),          // 0012
                ins(Opcode::Pop, &[]),                // 0015
            ]),
        );
    }

    #[test]
    fn test_empty_consequence_pushes_null() {
        let bc = compile("if (true) { }");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::True, &[]),
                ins(Opcode::JumpNotTruthy, &[8]),
                ins(Opcode::Null, &[]),
                ins(Opcode::Jump, &[9]),
                ins(Opcode::Null, &[]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_string_array_hash_index() {
        let bc = compile(r#""mon" + "key"; [1, 2][0]; {1: 2}"#);
        assert_eq!(bc.constants[0], Object::string("mon"));
        assert_eq!(bc.constants[1], Object::string("key"));
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::Pop, &[]),
                ins(Opcode::Constant, &[2]),
                ins(Opcode::Constant, &[3]),
                ins(Opcode::Array, &[2]),
                ins(Opcode::Constant, &[4]),
                ins(Opcode::Index, &[]),
                ins(Opcode::Pop, &[]),
                ins(Opcode::Constant, &[5]),
                ins(Opcode::Constant, &[6]),
                ins(Opcode::Hash, &[2]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    #[test]
    fn test_global_let() {
        let bc = compile("let one = 1; let two = one; two;");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::SetGlobal, &[0]),
                ins(Opcode::GetGlobal, &[0]),
                ins(Opcode::SetGlobal, &[1]),
                ins(Opcode::GetGlobal, &[1]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_let_rebinding_reuses_slot() {
        let bc = compile("let a = 1; let a = a + 1;");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::SetGlobal, &[0]),
                ins(Opcode::GetGlobal, &[0]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::SetGlobal, &[0]),
            ]),
        );
    }

    #[test]
    fn test_builtins() {
        let bc = compile("len([]); push([], 1);");
        assert_instructions(
            &bc.instructions,
            instructions(vec![
                ins(Opcode::GetBuiltin, &[0]),
                ins(Opcode::Array, &[0]),
                ins(Opcode::Call, &[1]),
                ins(Opcode::Pop, &[]),
                ins(Opcode::GetBuiltin, &[5]),
                ins(Opcode::Array, &[0]),
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Call, &[2]),
                ins(Opcode::Pop, &[]),
            ]),
        );
    }

    #[test]
    fn test_undefined_variable() {
        let mut compiler = Compiler::new();
        let err = compiler.compile(&parse("x + 1")).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("x".to_string()));
    }

    #[test]
    fn test_return_at_top_level_is_rejected() {
        let mut compiler = Compiler::new();
        let err = compiler.compile(&parse("return 1;")).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPosition { .. }), "{:?}", err);
    }

    // =========================================================================
    // Functions and closures
    // =========================================================================

    #[test]
    fn test_function_implicit_return() {
        let bc = compile("fn() { 5 + 10 }");
        let function = function_constant(&bc, 2);
        assert_instructions(
            &function.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Constant, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );
        assert_instructions(
            &bc.instructions,
            instructions(vec![ins(Opcode::Closure, &[2, 0]), ins(Opcode::Pop, &[])]),
        );
    }

    #[test]
    fn test_empty_function_returns_nothing() {
        let bc = compile("fn() { }");
        let function = function_constant(&bc, 0);
        assert_instructions(&function.instructions, instructions(vec![ins(Opcode::Return, &[])]));
    }

    #[test]
    fn test_function_ending_in_let_returns_nothing() {
        let bc = compile("fn() { let a = 1; }");
        let function = function_constant(&bc, 1);
        assert_eq!(function.num_locals, 1);
        assert_instructions(
            &function.instructions,
            instructions(vec![
                ins(Opcode::Constant, &[0]),
                ins(Opcode::SetLocal, &[0]),
                ins(Opcode::Return, &[]),
            ]),
        );
    }

    #[test]
    fn test_locals_and_parameters() {
        let bc = compile("let g = 1; fn(a, b) { let c = a; g + c + b }");
        let function = function_constant(&bc, 1);
        assert_eq!(function.num_parameters, 2);
        assert_eq!(function.num_locals, 3);
        assert_instructions(
            &function.instructions,
            instructions(vec![
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::SetLocal, &[2]),
                ins(Opcode::GetGlobal, &[0]),
                ins(Opcode::GetLocal, &[2]),
                ins(Opcode::Add, &[]),
                ins(Opcode::GetLocal, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );
    }

    #[test]
    fn test_closure_captures_free_variable() {
        let bc = compile("fn(a) { fn(b) { a + b } }");

        let inner = function_constant(&bc, 0);
        assert_instructions(
            &inner.instructions,
            instructions(vec![
                ins(Opcode::GetFree, &[0]),
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::Add, &[]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );

        let outer = function_constant(&bc, 1);
        assert_instructions(
            &outer.instructions,
            instructions(vec![
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::Closure, &[0, 1]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );

        assert_instructions(
            &bc.instructions,
            instructions(vec![ins(Opcode::Closure, &[1, 0]), ins(Opcode::Pop, &[])]),
        );
    }

    #[test]
    fn test_nested_capture_passes_through_middle_function() {
        let bc = compile("fn(a) { fn(b) { fn(c) { a + b + c } } }");

        let innermost = function_constant(&bc, 0);
        assert_instructions(
            &innermost.instructions,
            instructions(vec![
                ins(Opcode::GetFree, &[0]),
                ins(Opcode::GetFree, &[1]),
                ins(Opcode::Add, &[]),
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::Add, &[]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );

        let middle = function_constant(&bc, 1);
        assert_instructions(
            &middle.instructions,
            instructions(vec![
                ins(Opcode::GetFree, &[0]),
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::Closure, &[0, 2]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );
    }

    #[test]
    fn test_globals_are_not_captured() {
        let bc = compile("let g = 1; fn() { fn() { g } }");
        let inner = function_constant(&bc, 1);
        assert_instructions(
            &inner.instructions,
            instructions(vec![ins(Opcode::GetGlobal, &[0]), ins(Opcode::ReturnValue, &[])]),
        );
        let outer = function_constant(&bc, 2);
        assert_instructions(
            &outer.instructions,
            instructions(vec![ins(Opcode::Closure, &[1, 0]), ins(Opcode::ReturnValue, &[])]),
        );
    }

    #[test]
    fn test_recursive_function_uses_current_closure() {
        let bc = compile("let countdown = fn(x) { countdown(x - 1) }; countdown(1);");
        let function = function_constant(&bc, 1);
        assert_eq!(function.name.as_deref(), Some("countdown"));
        assert_instructions(
            &function.instructions,
            instructions(vec![
                ins(Opcode::CurrentClosure, &[]),
                ins(Opcode::GetLocal, &[0]),
                ins(Opcode::Constant, &[0]),
                ins(Opcode::Sub, &[]),
                ins(Opcode::Call, &[1]),
                ins(Opcode::ReturnValue, &[]),
            ]),
        );
    }

    // =========================================================================
    // Limits and state
    // =========================================================================

    #[test]
    fn test_nesting_too_deep() {
        let mut compiler = Compiler::with_config(CompilerConfig { max_depth: 3 });
        let err = compiler.compile(&parse("-(-(-(-1)))")).unwrap_err();
        assert_eq!(err, CompileError::NestingTooDeep(3));
    }

    #[test]
    fn test_too_many_constants_is_an_encode_error() {
        let mut compiler = Compiler::new();
        compiler.constants = vec![Object::Null; 65536];
        let err = compiler.compile(&parse("1")).unwrap_err();
        assert!(matches!(err, CompileError::Encode(_)), "{:?}", err);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let input = "let f = fn(a) { fn(b) { a + b } }; f(1)(2); if (1 < 2) { [1] } else { {1: 2} }";
        assert_eq!(compile(input), compile(input));
    }

    #[test]
    fn test_state_carries_over() {
        let mut first = Compiler::new();
        first.compile(&parse("let a = 1;")).unwrap();
        let (globals, constants) = first.into_state();

        let mut second = Compiler::with_state(globals, constants, CompilerConfig::default());
        second.compile(&parse("a")).unwrap();
        let bc = second.bytecode();

        assert_eq!(bc.constants, vec![Object::Integer(1)]);
        assert_instructions(
            &bc.instructions,
            instructions(vec![ins(Opcode::GetGlobal, &[0]), ins(Opcode::Pop, &[])]),
        );
    }
}
