//! Source text to syntax tree: tokens, the lexer and the Pratt parser.

pub mod lexer;
pub mod parser;
pub mod parser_error;
pub mod token;

pub use lexer::Lexer;
pub use parser::Parser;
pub use parser_error::ParserError;
pub use token::{Span, Token, TokenKind};
