//! Interpreter Errors
//!
//! Every failure the interpreter can report, and the mapping from each
//! failure to the negative integer codes returned by `interpret`:
//!
//! | code | meaning                                        |
//! |------|------------------------------------------------|
//! | -1   | generic failure (redirection open, wait, I/O)  |
//! | -2   | tokenize failure                               |
//! | -3   | parse/evaluate failure                         |
//! | -4   | pipe creation failure                          |
//! | -5   | process creation failure                       |
//! | -6   | read failure                                   |

use std::io;
use thiserror::Error;

use crate::parser::lexer::LexerError;
use crate::parser::types::ParseError;

/// Negative status codes reported for library failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Generic = -1,
    Tokenize = -2,
    Parse = -3,
    Pipe = -4,
    Fork = -5,
    Read = -6,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Lex(#[from] LexerError),

    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),

    #[error("{path}: {source}")]
    Redirect { path: String, source: io::Error },

    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("{program}: cannot start process: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("cannot read child output: {0}")]
    Read(#[source] io::Error),

    #[error("cannot wait for child: {0}")]
    Wait(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Raised by the `exit` builtin; stops evaluation and is never reported.
    #[error("exit {0}")]
    Exit(i32),
}

impl ShellError {
    /// The library error code, or `None` for [`ShellError::Exit`].
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Lex(_) => Some(ErrorCode::Tokenize),
            Self::Parse(_) => Some(ErrorCode::Parse),
            Self::Pipe(_) => Some(ErrorCode::Pipe),
            Self::Spawn { .. } => Some(ErrorCode::Fork),
            Self::Read(_) => Some(ErrorCode::Read),
            Self::Redirect { .. } | Self::Wait(_) | Self::Io(_) => Some(ErrorCode::Generic),
            Self::Exit(_) => None,
        }
    }

    /// Integer result of a call that ended with this error: the requested
    /// status for `exit`, otherwise the negative error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Exit(status) => *status,
            other => other
                .error_code()
                .unwrap_or(ErrorCode::Generic)
                .as_i32(),
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit(_))
    }
}
