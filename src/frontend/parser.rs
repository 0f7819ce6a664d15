use std::collections::HashMap;

use log::trace;

use crate::frontend::lexer::Lexer;
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::{Token, TokenKind};
use crate::lang::ast::{
    Block, Expression, FunctionLiteral, InfixOperator, PrefixOperator, Program, Statement,
};

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Binding power of operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Asterisk | TokenKind::Slash => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub type PrefixParseFn = fn(&mut Parser) -> Result<Expression, ParserError>;
pub type InfixParseFn = fn(&mut Parser, Expression) -> Result<Expression, ParserError>;

/// Pratt parser.
///
/// Holds one token of lookahead (`current` + `peek`). Each token kind that
/// can start an expression has one prefix handler; each operator kind has
/// one infix handler. Statement-level errors are collected in `errors` and
/// the parser resynchronizes at the next statement boundary, so
/// `parse_program` always returns a `Program`. Callers must treat a
/// non-empty `errors()` as failure.
pub struct Parser {
    lexer: Lexer,
    current: Token,
    peek: Token,
    errors: Vec<ParserError>,
    prefix_fns: HashMap<TokenKind, PrefixParseFn>,
    infix_fns: HashMap<TokenKind, InfixParseFn>,
    depth: usize,
    max_depth: usize,
    /// `{` minus `}` consumed before `current`.
    braces: isize,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self::with_max_depth(lexer, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(mut lexer: Lexer, max_depth: usize) -> Self {
        let current = lexer.next_token();
        let peek = lexer.next_token();

        let mut parser = Parser {
            lexer,
            current,
            peek,
            errors: Vec::new(),
            prefix_fns: HashMap::new(),
            infix_fns: HashMap::new(),
            depth: 0,
            max_depth,
            braces: 0,
        };

        parser.register_prefix(TokenKind::Ident, Parser::parse_identifier);
        parser.register_prefix(TokenKind::Int, Parser::parse_integer_literal);
        parser.register_prefix(TokenKind::String, Parser::parse_string_literal);
        parser.register_prefix(TokenKind::True, Parser::parse_boolean);
        parser.register_prefix(TokenKind::False, Parser::parse_boolean);
        parser.register_prefix(TokenKind::Bang, Parser::parse_prefix_expression);
        parser.register_prefix(TokenKind::Minus, Parser::parse_prefix_expression);
        parser.register_prefix(TokenKind::LParen, Parser::parse_grouped_expression);
        parser.register_prefix(TokenKind::If, Parser::parse_if_expression);
        parser.register_prefix(TokenKind::Function, Parser::parse_function_literal);
        parser.register_prefix(TokenKind::LBracket, Parser::parse_array_literal);
        parser.register_prefix(TokenKind::LBrace, Parser::parse_hash_literal);
        parser.register_prefix(TokenKind::Illegal, Parser::parse_illegal);

        for kind in [
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Asterisk,
            TokenKind::Slash,
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::Lt,
            TokenKind::Gt,
        ] {
            parser.register_infix(kind, Parser::parse_infix_expression);
        }
        parser.register_infix(TokenKind::LParen, Parser::parse_call_expression);
        parser.register_infix(TokenKind::LBracket, Parser::parse_index_expression);

        parser
    }

    /// Installs (or replaces) the prefix handler for `kind`.
    pub fn register_prefix(&mut self, kind: TokenKind, f: PrefixParseFn) {
        self.prefix_fns.insert(kind, f);
    }

    /// Installs (or replaces) the infix handler for `kind`.
    pub fn register_infix(&mut self, kind: TokenKind, f: InfixParseFn) {
        self.infix_fns.insert(kind, f);
    }

    pub fn errors(&self) -> &[ParserError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParserError> {
        self.errors
    }

    /// The token currently under examination.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Moves one token forward.
    pub fn next_token(&mut self) {
        match self.current.kind {
            TokenKind::LBrace => self.braces += 1,
            TokenKind::RBrace => self.braces -= 1,
            _ => {}
        }
        let next = self.lexer.next_token();
        self.current = std::mem::replace(&mut self.peek, next);
    }

    fn current_is(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParserError {
        ParserError::new(message, token.span)
    }

    /// Advances if the next token has the expected kind, errors otherwise.
    pub fn expect_peek(&mut self, kind: TokenKind) -> Result<(), ParserError> {
        if self.peek_is(kind) {
            self.next_token();
            Ok(())
        } else {
            Err(self.error_at(
                &self.peek,
                format!(
                    "expected next token to be {}, got {} instead",
                    kind, self.peek.kind
                ),
            ))
        }
    }

    fn peek_precedence(&self) -> Precedence {
        precedence_of(self.peek.kind)
    }

    fn current_precedence(&self) -> Precedence {
        precedence_of(self.current.kind)
    }

    /// Parses the whole input.
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.current_is(TokenKind::Eof) {
            let start = self.braces;
            match self.parse_statement() {
                Ok(statement) => program.statements.push(statement),
                Err(e) => {
                    trace!("syntax error: {}", e);
                    self.errors.push(e);
                    self.synchronize(start);
                }
            }
            self.next_token();
        }

        program
    }

    /// Skips to the end of a broken statement that began at brace depth
    /// `start`: the next `;` at that depth, the `}` closing the enclosing
    /// block, or end of input. Braces the statement opened itself (hash
    /// literals, function bodies) are skipped whole. Leaves `current` on
    /// the stopping token.
    fn synchronize(&mut self, start: isize) {
        loop {
            match self.current.kind {
                TokenKind::Eof => return,
                TokenKind::Semicolon | TokenKind::RBrace if self.braces <= start => return,
                _ => {}
            }
            self.next_token();
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.current.kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect_peek(TokenKind::Ident)?;
        let name = self.current.literal.clone();

        self.expect_peek(TokenKind::Assign)?;
        self.next_token();

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expression::Function(function) = &mut value {
            function.name = Some(name.clone());
        }

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Ok(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParserError> {
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Ok(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParserError> {
        let expression = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Ok(Statement::Expression(expression))
    }

    /// Precedence climbing: run the prefix handler for the current token,
    /// then fold in infix operators while they bind tighter than `precedence`.
    pub fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        if self.depth >= self.max_depth {
            return Err(self.error_at(&self.current, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.parse_expression_inner(precedence);
        self.depth -= 1;
        result
    }

    fn parse_expression_inner(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let Some(prefix) = self.prefix_fns.get(&self.current.kind).copied() else {
            return Err(self.error_at(
                &self.current,
                format!("no prefix parse function for {} found", self.current.kind),
            ));
        };
        let mut left = prefix(self)?;

        while !self.peek_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            let Some(infix) = self.infix_fns.get(&self.peek.kind).copied() else {
                return Ok(left);
            };
            self.next_token();
            left = infix(self, left)?;
        }

        Ok(left)
    }

    fn parse_identifier(&mut self) -> Result<Expression, ParserError> {
        Ok(Expression::Identifier(self.current.literal.clone()))
    }

    fn parse_integer_literal(&mut self) -> Result<Expression, ParserError> {
        self.current
            .literal
            .parse::<i64>()
            .map(Expression::Integer)
            .map_err(|_| {
                self.error_at(
                    &self.current,
                    format!("could not parse {:?} as integer", self.current.literal),
                )
            })
    }

    fn parse_string_literal(&mut self) -> Result<Expression, ParserError> {
        Ok(Expression::String(self.current.literal.clone()))
    }

    fn parse_boolean(&mut self) -> Result<Expression, ParserError> {
        Ok(Expression::Boolean(self.current_is(TokenKind::True)))
    }

    fn parse_illegal(&mut self) -> Result<Expression, ParserError> {
        Err(self.error_at(
            &self.current,
            format!("illegal token {:?}", self.current.literal),
        ))
    }

    fn parse_prefix_expression(&mut self) -> Result<Expression, ParserError> {
        let operator = match self.current.kind {
            TokenKind::Bang => PrefixOperator::Bang,
            _ => PrefixOperator::Minus,
        };
        self.next_token();

        let right = self.parse_expression(Precedence::Prefix)?;

        Ok(Expression::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Result<Expression, ParserError> {
        let operator = match self.current.kind {
            TokenKind::Plus => InfixOperator::Plus,
            TokenKind::Minus => InfixOperator::Minus,
            TokenKind::Asterisk => InfixOperator::Multiply,
            TokenKind::Slash => InfixOperator::Divide,
            TokenKind::Lt => InfixOperator::LessThan,
            TokenKind::Gt => InfixOperator::GreaterThan,
            TokenKind::Eq => InfixOperator::Equal,
            TokenKind::NotEq => InfixOperator::NotEqual,
            other => {
                return Err(self.error_at(
                    &self.current,
                    format!("{} is not an infix operator", other),
                ));
            }
        };
        let precedence = self.current_precedence();
        self.next_token();

        let right = self.parse_expression(precedence)?;

        Ok(Expression::Infix {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> Result<Expression, ParserError> {
        self.next_token();

        let expression = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;

        Ok(expression)
    }

    fn parse_if_expression(&mut self) -> Result<Expression, ParserError> {
        self.expect_peek(TokenKind::LParen)?;
        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;

        self.expect_peek(TokenKind::LBrace)?;
        let consequence = self.parse_block()?;

        let alternative = if self.peek_is(TokenKind::Else) {
            self.next_token();
            self.expect_peek(TokenKind::LBrace)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// Parses statements up to the closing `}`. Errors inside the block are
    /// recorded and skipped so the rest of the block is still checked.
    fn parse_block(&mut self) -> Result<Block, ParserError> {
        let mut block = Block::default();
        self.next_token();

        while !self.current_is(TokenKind::RBrace) {
            if self.current_is(TokenKind::Eof) {
                return Err(self.error_at(&self.current, "unexpected end of input, expected }"));
            }

            let start = self.braces;
            match self.parse_statement() {
                Ok(statement) => block.statements.push(statement),
                Err(e) => {
                    trace!("syntax error in block: {}", e);
                    self.errors.push(e);
                    self.synchronize(start);
                    if self.current_is(TokenKind::RBrace) || self.current_is(TokenKind::Eof) {
                        continue;
                    }
                }
            }
            self.next_token();
        }

        Ok(block)
    }

    fn parse_function_literal(&mut self) -> Result<Expression, ParserError> {
        self.expect_peek(TokenKind::LParen)?;
        let parameters = self.parse_function_parameters()?;

        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;

        Ok(Expression::Function(FunctionLiteral {
            parameters,
            body,
            name: None,
        }))
    }

    fn parse_function_parameters(&mut self) -> Result<Vec<String>, ParserError> {
        let mut parameters = Vec::new();

        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Ok(parameters);
        }

        self.expect_peek(TokenKind::Ident)?;
        parameters.push(self.current.literal.clone());

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.expect_peek(TokenKind::Ident)?;
            parameters.push(self.current.literal.clone());
        }

        self.expect_peek(TokenKind::RParen)?;

        Ok(parameters)
    }

    fn parse_call_expression(&mut self, function: Expression) -> Result<Expression, ParserError> {
        let arguments = self.parse_expression_list(TokenKind::RParen)?;
        Ok(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index_expression(&mut self, left: Expression) -> Result<Expression, ParserError> {
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RBracket)?;

        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParserError> {
        Ok(Expression::Array(
            self.parse_expression_list(TokenKind::RBracket)?,
        ))
    }

    /// Comma-separated expressions up to `end`; `current` is the opening
    /// delimiter on entry and `end` on exit.
    fn parse_expression_list(&mut self, end: TokenKind) -> Result<Vec<Expression>, ParserError> {
        let mut list = Vec::new();

        if self.peek_is(end) {
            self.next_token();
            return Ok(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        self.expect_peek(end)?;

        Ok(list)
    }

    fn parse_hash_literal(&mut self) -> Result<Expression, ParserError> {
        let mut pairs = Vec::new();

        while !self.peek_is(TokenKind::RBrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;

            self.expect_peek(TokenKind::Colon)?;
            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;

            pairs.push((key, value));

            if !self.peek_is(TokenKind::RBrace) {
                self.expect_peek(TokenKind::Comma)?;
            }
        }

        self.expect_peek(TokenKind::RBrace)?;

        Ok(Expression::Hash(pairs))
    }
}
