//! C FFI for embedding in C and C++ hosts
//!
//! ```c
//! EmbshIo io = {0};
//! int status = embsh_interpret("echo 42", &io);
//! /* io.stdout_data == "42\n", NUL-terminated, io.stdout_len == 3 */
//! embsh_io_free(&io);
//! ```

use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::interpreter::errors::ErrorCode;
use crate::process::{CaptureBuffer, IoConfig};
use crate::shell::Shell;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Streaming callback: `(chunk, len, user_data)`.
pub type EmbshOutputFn = unsafe extern "C" fn(chunk: *const c_char, len: usize, user_data: *mut c_void);

/// I/O control block for [`embsh_interpret`].
///
/// Zero-initialize before first use. Output buffers are allocated by the
/// library, always NUL-terminated, and released with [`embsh_io_free`].
#[repr(C)]
#[derive(Debug)]
pub struct EmbshIo {
    /// Captured stdout (owned, must be freed). Empty when `stdout_fn` is set.
    pub stdout_data: *mut c_char,
    /// Length of stdout data in bytes, excluding the terminator
    pub stdout_len: usize,
    /// Captured stderr (owned, must be freed). Empty when `stderr_fn` is set.
    pub stderr_data: *mut c_char,
    pub stderr_len: usize,
    pub stdout_fn: Option<EmbshOutputFn>,
    pub stderr_fn: Option<EmbshOutputFn>,
    /// Passed back to both callbacks
    pub user_data: *mut c_void,
    /// Optional bytes fed to the first child's stdin
    pub stdin_data: *const c_char,
    pub stdin_len: usize,
}

/// Raw `user_data` handed back to the host, which owns its thread safety.
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// SAFETY: the pointer is only passed back to the host's own callback.
unsafe impl Send for UserData {}

fn forward(callback: EmbshOutputFn, user_data: UserData) -> impl FnMut(&[u8]) + Send + 'static {
    move |chunk: &[u8]| {
        let user_data = user_data;
        // SAFETY: the host guarantees the callback accepts these arguments.
        unsafe { callback(chunk.as_ptr() as *const c_char, chunk.len(), user_data.0) }
    }
}

/// Build an `IoConfig` from the control block.
///
/// # Safety
/// `stdin_data` must point to `stdin_len` readable bytes when non-null.
unsafe fn io_config(io: &EmbshIo) -> IoConfig {
    let mut config = IoConfig::new();
    if let Some(callback) = io.stdout_fn {
        config = config.on_stdout(forward(callback, UserData(io.user_data)));
    }
    if let Some(callback) = io.stderr_fn {
        config = config.on_stderr(forward(callback, UserData(io.user_data)));
    }
    if !io.stdin_data.is_null() {
        let data = unsafe { std::slice::from_raw_parts(io.stdin_data as *const u8, io.stdin_len) };
        config = config.with_stdin(data);
    }
    config
}

fn into_raw(buffer: CaptureBuffer) -> (*mut c_char, usize) {
    let len = buffer.len();
    let data = Box::into_raw(buffer.into_bytes_with_nul().into_boxed_slice());
    (data as *mut c_char, len)
}

/// # Safety
/// `data` must be null or have come from [`into_raw`] with the same `len`.
unsafe fn free_raw(data: *mut c_char, len: usize) {
    if !data.is_null() {
        // SAFETY: allocated by into_raw as a boxed slice of len + 1 bytes.
        unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data as *mut u8, len + 1))) };
    }
}

/// Get the last error message (thread-local)
///
/// # Safety
/// Returns a pointer to a thread-local string, or null if the last call on
/// this thread succeeded. The pointer is valid until the next FFI call on
/// the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn embsh_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Interpret one command line.
///
/// Returns the last command's exit status, or a negative error code; the
/// message for a negative code is available from `embsh_last_error()`.
/// Buffers left in `io` by a previous call are released first.
///
/// # Safety
/// - `command` must be a valid null-terminated C string.
/// - `io` must be null or point to a zero-initialized `EmbshIo` (or one
///   filled by a previous call).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embsh_interpret(command: *const c_char, io: *mut EmbshIo) -> c_int {
    clear_last_error();
    if command.is_null() {
        set_last_error("command is null");
        return ErrorCode::Generic.as_i32();
    }
    let command = match unsafe { CStr::from_ptr(command) }.to_str() {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&format!("invalid UTF-8 in command: {}", e));
            return ErrorCode::Generic.as_i32();
        }
    };

    // SAFETY: caller guarantees io is null or valid.
    let mut io = unsafe { io.as_mut() };
    let mut config = match io.as_deref_mut() {
        Some(io) => {
            unsafe { embsh_io_free(io) };
            Some(unsafe { io_config(io) })
        }
        None => None,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        Shell::default().run(command, config.as_mut())
    }));
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            set_last_error(&err.to_string());
            err.code()
        }
        Err(_) => {
            set_last_error("interpreter panicked");
            ErrorCode::Generic.as_i32()
        }
    };

    if let (Some(io), Some(mut config)) = (io, config) {
        (io.stdout_data, io.stdout_len) = into_raw(config.take_stdout());
        (io.stderr_data, io.stderr_len) = into_raw(config.take_stderr());
    }
    status
}

/// Release the output buffers of an `EmbshIo`.
///
/// Callbacks, `user_data` and the stdin fields are left untouched.
///
/// # Safety
/// `io` must be null or point to an `EmbshIo` whose buffers were filled by
/// `embsh_interpret` (or are null).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embsh_io_free(io: *mut EmbshIo) {
    // SAFETY: caller guarantees io is null or valid.
    let Some(io) = (unsafe { io.as_mut() }) else {
        return;
    };
    unsafe {
        free_raw(io.stdout_data, io.stdout_len);
        free_raw(io.stderr_data, io.stderr_len);
    }
    io.stdout_data = ptr::null_mut();
    io.stdout_len = 0;
    io.stderr_data = ptr::null_mut();
    io.stderr_len = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> EmbshIo {
        EmbshIo {
            stdout_data: ptr::null_mut(),
            stdout_len: 0,
            stderr_data: ptr::null_mut(),
            stderr_len: 0,
            stdout_fn: None,
            stderr_fn: None,
            user_data: ptr::null_mut(),
            stdin_data: ptr::null(),
            stdin_len: 0,
        }
    }

    unsafe fn bytes<'a>(data: *mut c_char, len: usize) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(data as *const u8, len + 1) }
    }

    #[test]
    fn test_null_command() {
        let status = unsafe { embsh_interpret(ptr::null(), ptr::null_mut()) };
        assert_eq!(status, -1);
        let message = unsafe { CStr::from_ptr(embsh_last_error()) };
        assert_eq!(message.to_str().unwrap(), "command is null");
    }

    #[test]
    fn test_syntax_error_sets_last_error() {
        let command = CString::new("echo 'open").unwrap();
        let mut io = zeroed();
        let status = unsafe { embsh_interpret(command.as_ptr(), &mut io) };
        assert_eq!(status, -2);
        let message = unsafe { CStr::from_ptr(embsh_last_error()) };
        assert!(message.to_str().unwrap().contains("unterminated quote"));
        unsafe { embsh_io_free(&mut io) };
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_into_owned_buffers() {
        let command = CString::new("echo 42").unwrap();
        let mut io = zeroed();
        let status = unsafe { embsh_interpret(command.as_ptr(), &mut io) };
        assert_eq!(status, 0);
        assert!(embsh_last_error().is_null());
        assert_eq!(io.stdout_len, 3);
        assert_eq!(unsafe { bytes(io.stdout_data, io.stdout_len) }, b"42\n\0");
        assert_eq!(io.stderr_len, 0);
        assert_eq!(unsafe { bytes(io.stderr_data, io.stderr_len) }, b"\0");

        // Reusing the block releases the previous buffers.
        let status = unsafe { embsh_interpret(command.as_ptr(), &mut io) };
        assert_eq!(status, 0);
        assert_eq!(io.stdout_len, 3);

        unsafe { embsh_io_free(&mut io) };
        assert!(io.stdout_data.is_null());
        assert!(io.stderr_data.is_null());
    }

    #[cfg(unix)]
    #[test]
    fn test_callbacks_and_stdin() {
        unsafe extern "C" fn collect(chunk: *const c_char, len: usize, user_data: *mut c_void) {
            let sink = unsafe { &mut *(user_data as *mut Vec<u8>) };
            sink.extend_from_slice(unsafe { std::slice::from_raw_parts(chunk as *const u8, len) });
        }

        let mut collected: Vec<u8> = Vec::new();
        let stdin = b"from host\n";
        let command = CString::new("cat").unwrap();
        let mut io = zeroed();
        io.stdout_fn = Some(collect);
        io.user_data = &mut collected as *mut Vec<u8> as *mut c_void;
        io.stdin_data = stdin.as_ptr() as *const c_char;
        io.stdin_len = stdin.len();

        let status = unsafe { embsh_interpret(command.as_ptr(), &mut io) };
        assert_eq!(status, 0);
        assert_eq!(io.stdout_len, 0);
        assert_eq!(unsafe { bytes(io.stdout_data, 0) }, b"\0");
        unsafe { embsh_io_free(&mut io) };
        assert_eq!(collected, b"from host\n");
    }
}
