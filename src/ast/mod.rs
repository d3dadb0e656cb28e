//! Abstract Syntax Tree (AST) Types
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → ExecutionEngine → ProcessBackend

pub mod types;
