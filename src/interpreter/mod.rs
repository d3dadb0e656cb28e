//! Interpreter module
//!
//! This module walks the AST and dispatches builtins or external programs.

pub mod builtin_dispatch;
pub mod builtins;
pub mod errors;
pub mod execution_engine;
pub mod types;

pub use builtin_dispatch::{Builtin, BuiltinContext};
pub use errors::{ErrorCode, ShellError};
pub use execution_engine::ExecutionEngine;
pub use types::{ExecutionContext, JobRecord, StageOutcome};
