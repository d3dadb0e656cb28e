//! Parser module for command lines
//!
//! This module contains the lexer and the recursive-descent parser.

pub mod types;
pub mod lexer;
pub mod parser;

// Re-exports
pub use types::{ParseError, MAX_INPUT_SIZE, MAX_PARSER_DEPTH};
pub use lexer::{Lexer, Token, TokenType, LexerError};
pub use parser::{parse, parse_line, Parser};
