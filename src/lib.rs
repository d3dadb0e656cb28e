//! embsh - An embeddable single-line shell interpreter
//!
//! This library tokenizes and parses one line of shell-like syntax
//! (`|`, `<`, `>`, `;`, `&`, quoted words) and runs it against the
//! operating system, optionally capturing child output into buffers or
//! streaming it to callbacks.

pub mod ast;
pub mod ffi;
pub mod interpreter;
pub mod parser;
pub mod process;
pub mod shell;

pub use ast::types::{AstNode, CommandNode};
pub use interpreter::errors::{ErrorCode, ShellError};
pub use parser::{parse, Lexer, LexerError, ParseError, Token, TokenType};
pub use process::{CaptureBuffer, IoConfig, JobHandle, NativeBackend, ProcessBackend};
pub use shell::{interpret, interpret_fmt, Shell, ShellOptions};

/// Serializes tests that read or change the process working directory.
#[cfg(test)]
pub(crate) static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
