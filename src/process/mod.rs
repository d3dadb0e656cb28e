//! Process Backend
//!
//! Platform plumbing behind the executor: pipes, process creation, capture
//! draining and exit-status collection. The executor only talks to the
//! [`ProcessBackend`] trait; [`NativeBackend`] selects the implementation
//! for the build target.

pub mod capture;
pub mod io_config;

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use std::os::fd::{AsFd as AsStream, BorrowedFd as BorrowedStream, OwnedFd as OwnedStream};
#[cfg(windows)]
pub use std::os::windows::io::{
    AsHandle as AsStream, BorrowedHandle as BorrowedStream, OwnedHandle as OwnedStream,
};

#[cfg(unix)]
pub use posix::{PosixBackend as NativeBackend, PosixJob as NativeJob};
#[cfg(windows)]
pub use windows::{WindowsBackend as NativeBackend, WindowsJob as NativeJob};

pub use capture::{CaptureBuffer, OutputSink, READ_CHUNK};
pub use io_config::{IoConfig, IoParts, OutputCallback};

use crate::interpreter::errors::ShellError;

/// Borrow the OS handle behind any file-like value.
pub fn borrow_stream<S: AsStream>(stream: &S) -> BorrowedStream<'_> {
    #[cfg(unix)]
    {
        stream.as_fd()
    }
    #[cfg(windows)]
    {
        stream.as_handle()
    }
}

/// An anonymous pipe. Both ends are closed on drop.
#[derive(Debug)]
pub struct Pipe {
    pub reader: OwnedStream,
    pub writer: OwnedStream,
}

/// Everything needed to start one child process.
///
/// Unset streams are inherited from the host process.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub argv: &'a [String],
    pub stdin: Option<BorrowedStream<'a>>,
    pub stdout: Option<BorrowedStream<'a>>,
    pub stderr: Option<BorrowedStream<'a>>,
    pub background: bool,
}

impl<'a> SpawnRequest<'a> {
    pub fn new(argv: &'a [String]) -> Self {
        Self {
            argv,
            stdin: None,
            stdout: None,
            stderr: None,
            background: false,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// Capture pipes shared by every stage of one foreground group.
///
/// Children write into `stdout`/`stderr` and read from `stdin`; the parent
/// keeps the opposite ends until [`CaptureSession::into_parent_ends`].
#[derive(Debug)]
pub struct CaptureSession {
    stdout: Pipe,
    stderr: Pipe,
    stdin: Option<Pipe>,
    feed_stdin: bool,
}

/// The parent's side of a capture session, child ends already closed.
#[derive(Debug)]
pub struct ParentEnds {
    pub stdout: OwnedStream,
    pub stderr: OwnedStream,
    pub stdin: Option<OwnedStream>,
}

impl CaptureSession {
    pub fn open<B: ProcessBackend + ?Sized>(
        backend: &B,
        with_stdin: bool,
    ) -> Result<Self, ShellError> {
        let stdout = backend.pipe()?;
        let stderr = backend.pipe()?;
        let stdin = if with_stdin { Some(backend.pipe()?) } else { None };
        Ok(Self {
            stdout,
            stderr,
            stdin,
            feed_stdin: true,
        })
    }

    /// Keep the stdin pipe but close it unwritten, so readers see EOF.
    pub fn skip_stdin_payload(&mut self) {
        self.feed_stdin = false;
    }

    pub fn stdout_writer(&self) -> BorrowedStream<'_> {
        borrow_stream(&self.stdout.writer)
    }

    pub fn stderr_writer(&self) -> BorrowedStream<'_> {
        borrow_stream(&self.stderr.writer)
    }

    pub fn stdin_reader(&self) -> Option<BorrowedStream<'_>> {
        self.stdin.as_ref().map(|pipe| borrow_stream(&pipe.reader))
    }

    /// Close the child ends and hand back the parent ends.
    ///
    /// Must only be called once every child has been spawned, or the
    /// readers never see end-of-file.
    pub fn into_parent_ends(self) -> ParentEnds {
        let Self {
            stdout,
            stderr,
            stdin,
            feed_stdin,
        } = self;
        ParentEnds {
            stdout: stdout.reader,
            stderr: stderr.reader,
            stdin: stdin.filter(|_| feed_stdin).map(|pipe| pipe.writer),
        }
    }
}

/// One live child process.
pub trait JobHandle {
    /// OS process id.
    fn id(&self) -> u32;

    /// Block until the child exits. Signal death maps to 128 + signal.
    fn wait(self) -> Result<i32, ShellError>;

    /// Stop tracking the child; it is reaped without being waited on.
    fn detach(self);
}

pub trait ProcessBackend {
    type Job: JobHandle;

    fn pipe(&self) -> Result<Pipe, ShellError>;

    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<Self::Job, ShellError>;

    /// Feed the stdin payload and copy child output into `io` until every
    /// writer has closed.
    fn drain(&self, session: CaptureSession, io: &mut IoConfig) -> Result<(), ShellError>;

    /// Run one program to completion, capturing into `io` when given.
    fn run(&self, argv: &[String], io: Option<&mut IoConfig>) -> Result<i32, ShellError> {
        let Some(io) = io else {
            return self.spawn(&SpawnRequest::new(argv))?.wait();
        };

        io.reset();
        let session = CaptureSession::open(self, io.stdin().is_some())?;
        let job = self.spawn(&SpawnRequest {
            argv,
            stdin: session.stdin_reader(),
            stdout: Some(session.stdout_writer()),
            stderr: Some(session.stderr_writer()),
            background: false,
        })?;

        let drained = self.drain(session, io);
        let status = job.wait();
        drained?;
        status
    }
}
