//! Parser Types and Constants

use thiserror::Error;
use crate::parser::lexer::TokenType;

// Parser limits to prevent hangs and stack exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_PARSER_DEPTH: usize = 1_000; // Max nesting of `;`, `&` and `|` chains

/// Check if a token type is a redirection operator
pub fn is_redirection_token(t: TokenType) -> bool {
    matches!(t, TokenType::Less | TokenType::Great)
}

/// Check if a token type separates statements
pub fn is_statement_separator(t: TokenType) -> bool {
    matches!(t, TokenType::Amp | TokenType::Semicolon)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset of the offending token
    pub offset: usize,
    pub token_type: Option<TokenType>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            token_type: None,
        }
    }

    pub fn at_token(message: impl Into<String>, offset: usize, token_type: TokenType) -> Self {
        Self {
            message: message.into(),
            offset,
            token_type: Some(token_type),
        }
    }
}
