//! Shell Facade
//!
//! Main entry point for embedding applications.
//! Ties together the lexer, parser, execution engine and process backend.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::ast::types::AstNode;
use crate::interpreter::errors::ShellError;
use crate::interpreter::execution_engine::ExecutionEngine;
use crate::interpreter::types::ExecutionContext;
use crate::parser::lexer::{Lexer, TokenType};
use crate::parser::parser::parse;
use crate::parser::types::{ParseError, MAX_INPUT_SIZE};
use crate::process::{IoConfig, NativeBackend, ProcessBackend};

/// Options for creating a [`Shell`].
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// When set, the `exit` builtin terminates the host process. Otherwise
    /// it stops evaluation and `interpret` returns the requested status.
    pub exit_terminates_process: bool,
    /// Target of a bare `cd`; defaults to `HOME` (or `USERPROFILE`).
    pub home_dir: Option<PathBuf>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            exit_terminates_process: true,
            home_dir: None,
        }
    }
}

impl ShellOptions {
    pub fn exit_terminates_process(mut self, enabled: bool) -> Self {
        self.exit_terminates_process = enabled;
        self
    }

    pub fn home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(dir.into());
        self
    }
}

/// An embeddable command-line interpreter.
///
/// A `Shell` holds no state between calls besides its options; every call
/// starts with a fresh engine. Calls may run concurrently from several
/// threads.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    options: ShellOptions,
}

impl Shell {
    pub fn new(options: ShellOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    /// Run `command`, returning its status or a negative error code.
    pub fn interpret(&self, command: &str, io: Option<&mut IoConfig>) -> i32 {
        match self.run(command, io) {
            Ok(status) => status,
            Err(err) => err.code(),
        }
    }

    /// Run `command` with the platform's native process backend.
    pub fn run(&self, command: &str, io: Option<&mut IoConfig>) -> Result<i32, ShellError> {
        self.run_with(&NativeBackend::new(), command, io)
    }

    /// Run `command` against `backend`.
    pub fn run_with<B: ProcessBackend>(
        &self,
        backend: &B,
        command: &str,
        mut io: Option<&mut IoConfig>,
    ) -> Result<i32, ShellError> {
        if let Some(io) = io.as_deref_mut() {
            io.reset();
        }

        let ast = match parse_command(command) {
            Ok(Some(ast)) => ast,
            Ok(None) => return Ok(0),
            Err(err) => {
                report(&err, io.as_deref_mut());
                return Err(err);
            }
        };

        let mut engine = ExecutionEngine::new(backend, command, &self.options, io);
        match engine.execute(&ast, ExecutionContext::default()) {
            Err(ShellError::Exit(status)) => Ok(status),
            result => result,
        }
    }
}

/// Tokenize and parse; `None` for a blank line.
fn parse_command(command: &str) -> Result<Option<AstNode>, ShellError> {
    if command.len() > MAX_INPUT_SIZE {
        return Err(ParseError::new(
            format!(
                "Input too large: {} bytes exceeds limit of {}",
                command.len(),
                MAX_INPUT_SIZE
            ),
            0,
        )
        .into());
    }

    let tokens = Lexer::new(command).tokenize()?;
    if tokens.iter().all(|t| t.token_type == TokenType::Eol) {
        return Ok(None);
    }
    let ast = parse(&tokens)?;
    debug!(tokens = tokens.len(), root = ast.kind(), "parsed command line");
    Ok(Some(ast))
}

fn report(err: &ShellError, io: Option<&mut IoConfig>) {
    warn!(error = %err, "cannot run command line");
    let message = format!("embsh: {}\n", err);
    match io {
        Some(io) => io.stderr_sink().deliver(message.as_bytes()),
        None => {
            let _ = std::io::stderr().write_all(message.as_bytes());
        }
    }
}

/// Run `command` with default options.
///
/// Returns the last command's exit status, or a negative
/// [`ErrorCode`](crate::ErrorCode) on failure.
pub fn interpret(command: &str, io: Option<&mut IoConfig>) -> i32 {
    Shell::default().interpret(command, io)
}

/// Format a command line and run it; see [`interpretf!`](crate::interpretf).
pub fn interpret_fmt(args: fmt::Arguments<'_>, io: Option<&mut IoConfig>) -> i32 {
    match args.as_str() {
        Some(command) => interpret(command, io),
        None => interpret(&args.to_string(), io),
    }
}

/// Format a command line and run it.
///
/// ```
/// # #[cfg(unix)]
/// # {
/// let mut io = embsh::IoConfig::new();
/// let status = embsh::interpretf!(Some(&mut io), "echo {}", 6 * 7);
/// assert_eq!(status, 0);
/// assert_eq!(io.stdout().as_bytes(), b"42\n");
/// # }
/// ```
#[macro_export]
macro_rules! interpretf {
    ($io:expr, $($arg:tt)+) => {
        $crate::interpret_fmt(::std::format_args!($($arg)+), $io)
    };
}
