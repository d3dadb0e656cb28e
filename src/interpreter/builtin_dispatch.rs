//! Builtin Command Dispatch
//!
//! Builtins run inside the host process: `cd` must change the host's own
//! working directory, and `exit` must stop evaluation.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::interpreter::builtins::{cd_cmd, exit_cmd, pwd_cmd};
use crate::process::capture::OutputSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Cd,
    Exit,
    Pwd,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cd" => Some(Self::Cd),
            "exit" => Some(Self::Exit),
            "pwd" => Some(Self::Pwd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cd => "cd",
            Self::Exit => "exit",
            Self::Pwd => "pwd",
        }
    }
}

/// Destination of builtin output: the current context output, else the
/// capture sink, else the host stream.
pub enum StreamWriter<'a> {
    Sink(OutputSink<'a>),
    File(File),
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

impl Write for StreamWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Sink(sink) => sink.write(buf),
            Self::File(file) => file.write(buf),
            Self::Stdout(out) => out.write(buf),
            Self::Stderr(err) => err.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Sink(sink) => sink.flush(),
            Self::File(file) => file.flush(),
            Self::Stdout(out) => out.flush(),
            Self::Stderr(err) => err.flush(),
        }
    }
}

/// Everything a builtin may read or write.
pub struct BuiltinContext<'a> {
    pub args: &'a [String],
    pub stdout: StreamWriter<'a>,
    pub stderr: StreamWriter<'a>,
    pub last_status: i32,
    pub home_dir: Option<&'a Path>,
}

/// Run `builtin` and return its status.
pub fn dispatch_builtin(builtin: Builtin, ctx: &mut BuiltinContext<'_>) -> io::Result<i32> {
    let status = match builtin {
        Builtin::Cd => cd_cmd::handle_cd(ctx)?,
        Builtin::Exit => exit_cmd::handle_exit(ctx)?,
        Builtin::Pwd => pwd_cmd::handle_pwd(ctx)?,
    };
    ctx.stdout.flush()?;
    ctx.stderr.flush()?;
    Ok(status)
}
