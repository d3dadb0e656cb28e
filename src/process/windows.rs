//! Windows process backend
//!
//! Children are created through `std::process::Command` (CreateProcess with
//! the supplied handles in STARTUPINFO). Capture uses two reader threads,
//! one per output pipe, while the calling thread writes the stdin payload.

use std::fs::File;
use std::io::{self, Write};
use std::os::windows::io::{BorrowedHandle, OwnedHandle};
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::debug;

use crate::interpreter::errors::ShellError;
use crate::process::capture::{feed, pump};
use crate::process::io_config::{IoConfig, IoParts};
use crate::process::{CaptureSession, JobHandle, ParentEnds, Pipe, ProcessBackend, SpawnRequest};

/// Status reported when the program cannot be found, matching POSIX shells.
pub const STATUS_NOT_FOUND: i32 = 127;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
pub enum WindowsJob {
    Running(Child),
    /// Never started; carries the status it evaluates to.
    Finished(i32),
}

fn inherit(handle: Option<BorrowedHandle<'_>>) -> io::Result<Option<Stdio>> {
    handle
        .map(|h| h.try_clone_to_owned().map(Stdio::from))
        .transpose()
}

fn report_not_found(request: &SpawnRequest<'_>) {
    let message = format!("embsh: {}: command not found\n", request.program());
    let written = match request.stderr {
        Some(handle) => handle
            .try_clone_to_owned()
            .and_then(|owned| File::from(owned).write_all(message.as_bytes())),
        None => io::stderr().write_all(message.as_bytes()),
    };
    if let Err(e) = written {
        debug!(error = %e, "cannot report missing program");
    }
}

impl ProcessBackend for WindowsBackend {
    type Job = WindowsJob;

    fn pipe(&self) -> Result<Pipe, ShellError> {
        let (reader, writer) = io::pipe().map_err(ShellError::Pipe)?;
        Ok(Pipe {
            reader: OwnedHandle::from(reader),
            writer: OwnedHandle::from(writer),
        })
    }

    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<WindowsJob, ShellError> {
        let program = request.program().to_string();
        let spawn_error = |source| ShellError::Spawn {
            program: program.clone(),
            source,
        };

        let mut command = Command::new(&program);
        command.args(request.argv.iter().skip(1));
        if let Some(stdin) = inherit(request.stdin).map_err(spawn_error)? {
            command.stdin(stdin);
        }
        if let Some(stdout) = inherit(request.stdout).map_err(spawn_error)? {
            command.stdout(stdout);
        }
        if let Some(stderr) = inherit(request.stderr).map_err(spawn_error)? {
            command.stderr(stderr);
        }

        match command.spawn() {
            Ok(child) => {
                debug!(pid = child.id(), program = %program, background = request.background, "spawned child");
                Ok(WindowsJob::Running(child))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report_not_found(request);
                Ok(WindowsJob::Finished(STATUS_NOT_FOUND))
            }
            Err(e) => Err(spawn_error(e)),
        }
    }

    fn drain(&self, session: CaptureSession, io: &mut IoConfig) -> Result<(), ShellError> {
        let ParentEnds {
            stdout: stdout_end,
            stderr: stderr_end,
            stdin: stdin_end,
        } = session.into_parent_ends();
        let IoParts {
            stdin,
            stdout,
            stderr,
        } = io.parts();

        thread::scope(|scope| {
            let out = scope.spawn(move || pump(File::from(stdout_end), stdout));
            let err = scope.spawn(move || pump(File::from(stderr_end), stderr));

            let fed = match (stdin_end, stdin) {
                (Some(handle), Some(data)) => feed(File::from(handle), data),
                _ => Ok(()),
            };

            let out = out.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            let err = err.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            let stdout_bytes = out.map_err(ShellError::Read)?;
            let stderr_bytes = err.map_err(ShellError::Read)?;
            fed.map_err(ShellError::Io)?;
            debug!(stdout_bytes, stderr_bytes, "capture drained");
            Ok(())
        })
    }
}

impl JobHandle for WindowsJob {
    fn id(&self) -> u32 {
        match self {
            Self::Running(child) => child.id(),
            Self::Finished(_) => 0,
        }
    }

    fn wait(self) -> Result<i32, ShellError> {
        match self {
            Self::Running(mut child) => {
                let status = child.wait().map_err(ShellError::Wait)?;
                // NTSTATUS failure codes are negative as i32.
                Ok(status.code().filter(|code| *code >= 0).unwrap_or(255))
            }
            Self::Finished(status) => Ok(status),
        }
    }

    fn detach(self) {
        // Dropping the Child closes its process handle; the OS cleans up.
        drop(self);
    }
}
