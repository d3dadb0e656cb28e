//! Interpreter Types
//!
//! Values threaded through the AST walk.

use crate::process::BorrowedStream;

/// Streams and mode for the subtree being executed.
///
/// Passed by value down the walk; a redirection or pipe builds a new
/// context for its child and the caller's copy is untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionContext<'a> {
    /// Standard input for the next command; host stdin when unset.
    pub input: Option<BorrowedStream<'a>>,
    /// Standard output for the next command; capture or host stdout when unset.
    pub output: Option<BorrowedStream<'a>>,
    pub background: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn in_background(self) -> Self {
        Self {
            background: true,
            ..self
        }
    }

    pub fn with_input<'b>(self, input: BorrowedStream<'b>) -> ExecutionContext<'b>
    where
        'a: 'b,
    {
        ExecutionContext {
            input: Some(input),
            output: self.output,
            background: self.background,
        }
    }

    pub fn with_output<'b>(self, output: BorrowedStream<'b>) -> ExecutionContext<'b>
    where
        'a: 'b,
    {
        ExecutionContext {
            input: self.input,
            output: Some(output),
            background: self.background,
        }
    }
}

/// A background child started by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Sequential job number, starting at 1.
    pub id: usize,
    pub pid: u32,
    pub program: String,
}

/// What launching one pipeline stage produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// A builtin ran in-process with this status.
    Finished(i32),
    /// A child was started and must be waited on (or was detached).
    Spawned,
}
