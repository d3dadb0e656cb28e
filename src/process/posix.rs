//! POSIX process backend
//!
//! `fork` + `execvp` with descriptors wired by `dup2`, a single-threaded
//! `poll` loop for capture, and a `SIGCHLD` handler that reaps detached
//! background children.

use std::ffi::{c_char, c_int, c_void, CString};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use tracing::debug;

use crate::interpreter::errors::ShellError;
use crate::process::capture::{OutputSink, READ_CHUNK};
use crate::process::io_config::{IoConfig, IoParts};
use crate::process::{CaptureSession, JobHandle, ParentEnds, Pipe, ProcessBackend, SpawnRequest};

/// Status reported when `execvp` cannot find the program.
pub const STATUS_NOT_FOUND: i32 = 127;
/// Status reported when the program exists but cannot be executed.
pub const STATUS_NOT_EXECUTABLE: i32 = 126;

#[derive(Debug, Default, Clone, Copy)]
pub struct PosixBackend;

impl PosixBackend {
    pub fn new() -> Self {
        Self
    }
}

/// A forked child, identified by pid.
#[derive(Debug)]
pub struct PosixJob {
    pid: libc::pid_t,
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn cvt(result: c_int) -> io::Result<c_int> {
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
fn create_pipe(fds: &mut [c_int; 2]) -> io::Result<()> {
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    Ok(())
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn create_pipe(fds: &mut [c_int; 2]) -> io::Result<()> {
    let _guard = CLOEXEC_LOCK.read().unwrap_or_else(|e| e.into_inner());
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    for fd in fds.iter() {
        if let Err(e) = cvt(unsafe { libc::fcntl(*fd, libc::F_SETFD, libc::FD_CLOEXEC) }) {
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Held shared between `pipe` and `FD_CLOEXEC`, exclusive across `fork`.
///
/// Only forks made through this backend are ordered by it; a host thread
/// that forks on its own can still inherit a pipe in that window.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
static CLOEXEC_LOCK: std::sync::RwLock<()> = std::sync::RwLock::new(());

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn fork_guard() -> Option<std::sync::RwLockWriteGuard<'static, ()>> {
    Some(CLOEXEC_LOCK.write().unwrap_or_else(|e| e.into_inner()))
}

/// `pipe2` sets close-on-exec atomically; nothing to order.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
fn fork_guard() -> Option<std::sync::RwLockWriteGuard<'static, ()>> {
    None
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// argv and diagnostics, built before `fork` so the child never allocates.
struct PreparedExec {
    args: Vec<CString>,
    argv: Vec<*const c_char>,
    not_found: Vec<u8>,
    cannot_execute: Vec<u8>,
}

impl PreparedExec {
    fn new(argv: &[String]) -> io::Result<Self> {
        let args = argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if args.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        }
        let mut pointers: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        pointers.push(ptr::null());

        let program = &argv[0];
        Ok(Self {
            argv: pointers,
            not_found: format!("embsh: {}: command not found\n", program).into_bytes(),
            cannot_execute: format!("embsh: {}: cannot execute\n", program).into_bytes(),
            args,
        })
    }
}

/// Runs in the forked child. Only async-signal-safe calls from here on.
unsafe fn exec_child(prepared: &PreparedExec, streams: [Option<RawFd>; 3]) -> ! {
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);

    // Lift sources out of 0..=2 first so one dup2 cannot clobber another's source.
    let mut sources = streams;
    for fd in sources.iter_mut().flatten() {
        if *fd <= 2 {
            let moved = libc::fcntl(*fd, libc::F_DUPFD_CLOEXEC, 3);
            if moved < 0 {
                libc::_exit(STATUS_NOT_EXECUTABLE);
            }
            *fd = moved;
        }
    }

    for (target, source) in sources.iter().enumerate() {
        if let Some(fd) = *source {
            if libc::dup2(fd, target as c_int) < 0 {
                libc::_exit(STATUS_NOT_EXECUTABLE);
            }
        }
    }

    for (i, source) in sources.iter().enumerate() {
        if let Some(fd) = *source {
            if !sources[..i].contains(&Some(fd)) {
                libc::close(fd);
            }
        }
    }

    libc::execvp(prepared.args[0].as_ptr(), prepared.argv.as_ptr());

    let (message, status) = if errno() == libc::ENOENT {
        (&prepared.not_found, STATUS_NOT_FOUND)
    } else {
        (&prepared.cannot_execute, STATUS_NOT_EXECUTABLE)
    };
    libc::write(2, message.as_ptr() as *const c_void, message.len());
    libc::_exit(status)
}

impl ProcessBackend for PosixBackend {
    type Job = PosixJob;

    fn pipe(&self) -> Result<Pipe, ShellError> {
        let mut fds = [0 as c_int; 2];
        create_pipe(&mut fds).map_err(ShellError::Pipe)?;
        // SAFETY: both descriptors were just created and are owned by nobody else.
        let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Pipe { reader, writer })
    }

    fn spawn(&self, request: &SpawnRequest<'_>) -> Result<PosixJob, ShellError> {
        let program = request.program().to_string();
        let prepared = PreparedExec::new(request.argv).map_err(|source| ShellError::Spawn {
            program: program.clone(),
            source,
        })?;
        reaper::sweep();

        let streams = [
            request.stdin.map(|fd| fd.as_raw_fd()),
            request.stdout.map(|fd| fd.as_raw_fd()),
            request.stderr.map(|fd| fd.as_raw_fd()),
        ];

        let guard = fork_guard();
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            // SAFETY: we are the forked child; exec_child never returns.
            unsafe { exec_child(&prepared, streams) }
        }
        let fork_error = io::Error::last_os_error();
        drop(guard);
        if pid < 0 {
            return Err(ShellError::Spawn {
                program,
                source: fork_error,
            });
        }

        debug!(pid, program = %program, background = request.background, "spawned child");
        Ok(PosixJob { pid })
    }

    fn drain(&self, session: CaptureSession, io: &mut IoConfig) -> Result<(), ShellError> {
        let ends = session.into_parent_ends();
        let IoParts {
            stdin,
            stdout,
            stderr,
        } = io.parts();
        let stdin = stdin.filter(|data| !data.is_empty() && ends.stdin.is_some());
        let _sigpipe = stdin.map(|_| SigpipeGuard::block());
        drain_loop(ends, stdin, stdout, stderr)
    }
}

impl JobHandle for PosixJob {
    fn id(&self) -> u32 {
        self.pid as u32
    }

    fn wait(self) -> Result<i32, ShellError> {
        let mut status: c_int = 0;
        loop {
            let result = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if result == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ShellError::Wait(err));
            }
            if libc::WIFEXITED(status) {
                let code = libc::WEXITSTATUS(status);
                debug!(pid = self.pid, status = code, "child exited");
                return Ok(code);
            }
            if libc::WIFSIGNALED(status) {
                let signal = libc::WTERMSIG(status);
                debug!(pid = self.pid, signal, "child killed by signal");
                return Ok(128 + signal);
            }
        }
    }

    fn detach(self) {
        reaper::install();
        reaper::register(self.pid);
        // The child may already have exited before it was registered.
        reaper::reap_registered();
    }
}

struct ReadEnd<'s> {
    fd: Option<OwnedFd>,
    sink: OutputSink<'s>,
    total: usize,
}

impl ReadEnd<'_> {
    /// Read one chunk. Closes the end on EOF.
    fn read_chunk(&mut self, chunk: &mut [u8]) -> io::Result<()> {
        let Some(fd) = self.fd.as_ref() else {
            return Ok(());
        };
        let n = unsafe { libc::read(fd.as_raw_fd(), chunk.as_mut_ptr() as *mut c_void, chunk.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(()),
                _ => Err(err),
            };
        }
        if n == 0 {
            self.fd = None;
        } else {
            self.sink.deliver(&chunk[..n as usize]);
            self.total += n as usize;
        }
        Ok(())
    }
}

struct WriteEnd<'s> {
    fd: Option<OwnedFd>,
    pending: &'s [u8],
}

impl WriteEnd<'_> {
    /// Write as much as the pipe accepts. Closes the end when done.
    fn write_some(&mut self) -> io::Result<()> {
        let Some(fd) = self.fd.as_ref() else {
            return Ok(());
        };
        let n = unsafe {
            libc::write(
                fd.as_raw_fd(),
                self.pending.as_ptr() as *const c_void,
                self.pending.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(()),
                io::ErrorKind::BrokenPipe => {
                    debug!(dropped = self.pending.len(), "child closed stdin early");
                    self.fd = None;
                    Ok(())
                }
                _ => Err(err),
            };
        }
        self.pending = &self.pending[n as usize..];
        if self.pending.is_empty() {
            self.fd = None;
        }
        Ok(())
    }
}

fn drain_loop<'a>(
    ends: ParentEnds,
    stdin: Option<&[u8]>,
    stdout: OutputSink<'a>,
    stderr: OutputSink<'a>,
) -> Result<(), ShellError> {
    let mut readers = [
        ReadEnd { fd: Some(ends.stdout), sink: stdout, total: 0 },
        ReadEnd { fd: Some(ends.stderr), sink: stderr, total: 0 },
    ];
    // Without a payload the writer is dropped here and the child sees EOF.
    let mut writer = WriteEnd {
        fd: stdin.and(ends.stdin),
        pending: stdin.unwrap_or(&[]),
    };

    for reader in &readers {
        if let Some(fd) = &reader.fd {
            set_nonblocking(fd.as_raw_fd()).map_err(ShellError::Read)?;
        }
    }
    if let Some(fd) = &writer.fd {
        set_nonblocking(fd.as_raw_fd()).map_err(ShellError::Io)?;
    }

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(3);
        for reader in &readers {
            if let Some(fd) = &reader.fd {
                fds.push(libc::pollfd { fd: fd.as_raw_fd(), events: libc::POLLIN, revents: 0 });
            }
        }
        if let Some(fd) = &writer.fd {
            fds.push(libc::pollfd { fd: fd.as_raw_fd(), events: libc::POLLOUT, revents: 0 });
        }
        if fds.is_empty() {
            break;
        }

        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ShellError::Read(err));
        }

        for pfd in &fds {
            if pfd.revents == 0 {
                continue;
            }
            if let Some(reader) = readers
                .iter_mut()
                .find(|r| r.fd.as_ref().map(|fd| fd.as_raw_fd()) == Some(pfd.fd))
            {
                reader.read_chunk(&mut chunk).map_err(ShellError::Read)?;
            } else if writer.fd.as_ref().map(|fd| fd.as_raw_fd()) == Some(pfd.fd) {
                writer.write_some().map_err(ShellError::Io)?;
            }
        }
    }

    debug!(
        stdout_bytes = readers[0].total,
        stderr_bytes = readers[1].total,
        "capture drained"
    );
    Ok(())
}

/// Blocks `SIGPIPE` for the draining thread so a child that stops reading
/// its stdin cannot kill the host; a pending `SIGPIPE` is consumed on drop.
struct SigpipeGuard {
    previous: libc::sigset_t,
}

impl SigpipeGuard {
    fn block() -> Self {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGPIPE);
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
            Self { previous }
        }
    }
}

impl Drop for SigpipeGuard {
    fn drop(&mut self) {
        unsafe {
            let mut pending: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut pending);
            let was_blocked = libc::sigismember(&self.previous, libc::SIGPIPE) == 1;
            if !was_blocked
                && libc::sigpending(&mut pending) == 0
                && libc::sigismember(&pending, libc::SIGPIPE) == 1
            {
                let mut only: libc::sigset_t = std::mem::zeroed();
                libc::sigemptyset(&mut only);
                libc::sigaddset(&mut only, libc::SIGPIPE);
                let mut signal: c_int = 0;
                libc::sigwait(&only, &mut signal);
            }
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut());
        }
    }
}

/// Reaping of detached background children.
///
/// Detached pids live in a fixed table the `SIGCHLD` handler can scan
/// without locking; pids that do not fit go to an overflow list swept on
/// the next spawn. Foreground children are never touched here.
mod reaper {
    use std::ffi::c_int;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Mutex, Once};

    use tracing::warn;

    const SLOTS: usize = 64;

    static BACKGROUND: [AtomicI32; SLOTS] = [const { AtomicI32::new(0) }; SLOTS];
    static OVERFLOW: Mutex<Vec<libc::pid_t>> = Mutex::new(Vec::new());
    static INSTALL: Once = Once::new();

    pub(super) fn install() {
        INSTALL.call_once(|| unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_sigchld as extern "C" fn(c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) != 0 {
                warn!(error = %std::io::Error::last_os_error(), "cannot install SIGCHLD handler");
            }
        });
    }

    pub(super) fn register(pid: libc::pid_t) {
        for slot in BACKGROUND.iter() {
            if slot
                .compare_exchange(0, pid, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
        warn!(pid, "background table full, deferring reap to next spawn");
        OVERFLOW
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(pid);
    }

    /// Reap overflowed pids that have exited.
    pub(super) fn sweep() {
        let mut overflow = OVERFLOW
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        overflow.retain(|&pid| !try_reap(pid));
    }

    pub(super) fn reap_registered() {
        for slot in BACKGROUND.iter() {
            let pid = slot.load(Ordering::Acquire);
            if pid > 0 && try_reap(pid) {
                let _ = slot.compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Relaxed);
            }
        }
    }

    /// True once `pid` is gone.
    fn try_reap(pid: libc::pid_t) -> bool {
        let mut status: c_int = 0;
        let result = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        result == pid || (result == -1 && super::errno() == libc::ECHILD)
    }

    extern "C" fn on_sigchld(_signal: c_int) {
        let saved = errno_location();
        let errno = if saved.is_null() { 0 } else { unsafe { *saved } };
        reap_registered();
        if !saved.is_null() {
            unsafe { *saved = errno };
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "redox"))]
    fn errno_location() -> *mut c_int {
        unsafe { libc::__errno_location() }
    }

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    ))]
    fn errno_location() -> *mut c_int {
        unsafe { libc::__error() }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "redox",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    )))]
    fn errno_location() -> *mut c_int {
        std::ptr::null_mut()
    }

    #[cfg(test)]
    pub(super) fn is_registered(pid: libc::pid_t) -> bool {
        BACKGROUND.iter().any(|slot| slot.load(Ordering::Acquire) == pid)
            || OVERFLOW
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains(&pid)
    }
}
