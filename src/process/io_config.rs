//! I/O Control Object
//!
//! Caller-owned configuration and result record for one `interpret` call:
//! capture buffers, optional streaming callbacks and an optional stdin
//! payload for the first child.

use std::borrow::Cow;
use std::fmt;

use crate::process::capture::{CaptureBuffer, OutputSink};

/// Streaming callback receiving each chunk of output as it is read.
pub type OutputCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Capture configuration for one call.
///
/// Without a callback a stream is accumulated into its [`CaptureBuffer`];
/// with one, the buffer is left empty. Buffers are cleared at the start of
/// every call, so an `IoConfig` can be reused.
///
/// Background commands (`cmd &`) are not captured: they write to the host
/// process's own stdout and stderr. The stdin payload is written once per
/// call, to the first child that reads it; later commands read EOF.
///
/// ```
/// use embsh::{interpret, IoConfig};
///
/// let mut io = IoConfig::new();
/// # #[cfg(unix)]
/// # {
/// assert_eq!(interpret("echo 42", Some(&mut io)), 0);
/// assert_eq!(io.stdout().as_bytes(), b"42\n");
/// # }
/// ```
#[derive(Default)]
pub struct IoConfig {
    stdout: CaptureBuffer,
    stderr: CaptureBuffer,
    stdout_callback: Option<OutputCallback>,
    stderr_callback: Option<OutputCallback>,
    stdin: Option<Vec<u8>>,
}

/// Disjoint views of an [`IoConfig`] used while draining a capture session.
pub struct IoParts<'a> {
    pub stdin: Option<&'a [u8]>,
    pub stdout: OutputSink<'a>,
    pub stderr: OutputSink<'a>,
}

impl IoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `data` to the first child's standard input.
    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn on_stdout(mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.stdout_callback = Some(Box::new(callback));
        self
    }

    pub fn on_stderr(mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.stderr_callback = Some(Box::new(callback));
        self
    }

    pub fn set_stdin(&mut self, data: Option<Vec<u8>>) {
        self.stdin = data;
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn stdout(&self) -> &CaptureBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &CaptureBuffer {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        self.stdout.to_string_lossy()
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        self.stderr.to_string_lossy()
    }

    pub fn take_stdout(&mut self) -> CaptureBuffer {
        std::mem::take(&mut self.stdout)
    }

    pub fn take_stderr(&mut self) -> CaptureBuffer {
        std::mem::take(&mut self.stderr)
    }

    /// Clear both buffers. Callbacks and the stdin payload are kept.
    pub fn reset(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }

    pub fn stdout_sink(&mut self) -> OutputSink<'_> {
        sink(&mut self.stdout_callback, &mut self.stdout)
    }

    pub fn stderr_sink(&mut self) -> OutputSink<'_> {
        sink(&mut self.stderr_callback, &mut self.stderr)
    }

    pub fn sinks(&mut self) -> (OutputSink<'_>, OutputSink<'_>) {
        (
            sink(&mut self.stdout_callback, &mut self.stdout),
            sink(&mut self.stderr_callback, &mut self.stderr),
        )
    }

    pub fn parts(&mut self) -> IoParts<'_> {
        IoParts {
            stdin: self.stdin.as_deref(),
            stdout: sink(&mut self.stdout_callback, &mut self.stdout),
            stderr: sink(&mut self.stderr_callback, &mut self.stderr),
        }
    }
}

fn sink<'a>(
    callback: &'a mut Option<OutputCallback>,
    buffer: &'a mut CaptureBuffer,
) -> OutputSink<'a> {
    match callback {
        Some(callback) => OutputSink::Callback(&mut **callback),
        None => OutputSink::Buffer(buffer),
    }
}

impl fmt::Debug for IoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoConfig")
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("stdout_callback", &self.stdout_callback.is_some())
            .field("stderr_callback", &self.stderr_callback.is_some())
            .field("stdin_len", &self.stdin.as_ref().map(Vec::len))
            .finish()
    }
}
