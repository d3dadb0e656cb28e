//! Capture buffers and output sinks
//!
//! Child output is read in fixed-size chunks and handed to an
//! [`OutputSink`]: either a caller callback or a [`CaptureBuffer`].

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};

/// Size of each read from a child's output pipe.
pub const READ_CHUNK: usize = 4096;

const INITIAL_CAPACITY: usize = 256;

/// Growable byte buffer that is always NUL-terminated.
///
/// The terminator is not part of the content: [`CaptureBuffer::as_bytes`]
/// excludes it, [`CaptureBuffer::as_bytes_with_nul`] includes it. Capacity
/// doubles whenever the remaining headroom is smaller than the next chunk.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    data: Vec<u8>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        let mut data = Vec::with_capacity(INITIAL_CAPACITY);
        data.push(0);
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.data.push(0);
    }

    pub fn extend_from_slice(&mut self, chunk: &[u8]) {
        let needed = self.data.len() + chunk.len();
        if needed > self.data.capacity() {
            let mut capacity = self.data.capacity().max(INITIAL_CAPACITY);
            while capacity < needed {
                capacity *= 2;
            }
            self.data.reserve_exact(capacity - self.data.len());
        }
        self.data.pop();
        self.data.extend_from_slice(chunk);
        self.data.push(0);
    }

    /// Consume the buffer, keeping the trailing NUL.
    pub fn into_bytes_with_nul(self) -> Vec<u8> {
        self.data
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CaptureBuffer")
            .field(&self.to_string_lossy())
            .finish()
    }
}

/// Where one captured stream goes.
pub enum OutputSink<'a> {
    Callback(&'a mut (dyn FnMut(&[u8]) + Send)),
    Buffer(&'a mut CaptureBuffer),
}

impl OutputSink<'_> {
    pub fn deliver(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        match self {
            Self::Callback(callback) => callback(chunk),
            Self::Buffer(buffer) => buffer.extend_from_slice(chunk),
        }
    }
}

impl Write for OutputSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.deliver(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Copy `reader` into `sink` chunk by chunk until end of stream.
///
/// Returns the number of bytes delivered.
pub fn pump<R: Read>(mut reader: R, mut sink: OutputSink<'_>) -> io::Result<u64> {
    let mut chunk = [0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                sink.deliver(&chunk[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // A writer that went away without closing cleanly ends the stream.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(total),
            Err(e) => return Err(e),
        }
    }
}

/// Write the whole stdin payload, then close the writer.
///
/// A reader that exits early is not an error; the rest is dropped.
pub fn feed<W: Write>(mut writer: W, data: &[u8]) -> io::Result<()> {
    match writer.write_all(data) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_empty_buffer_is_nul_terminated() {
        let buffer = CaptureBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_bytes(), b"");
        assert_eq!(buffer.as_bytes_with_nul(), b"\0");
    }

    #[test]
    fn test_extend_keeps_terminator() {
        let mut buffer = CaptureBuffer::new();
        buffer.extend_from_slice(b"42");
        buffer.extend_from_slice(b"\n");
        assert_eq!(buffer.as_bytes(), b"42\n");
        assert_eq!(buffer.as_bytes_with_nul(), b"42\n\0");
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert_eq!(buffer.as_bytes_with_nul(), b"\0");
    }

    #[test]
    fn test_capacity_doubles() {
        let mut buffer = CaptureBuffer::new();
        let start = buffer.capacity();
        buffer.extend_from_slice(&vec![b'x'; start]);
        assert!(buffer.capacity() >= start * 2);

        buffer.extend_from_slice(&vec![b'y'; 10 * READ_CHUNK]);
        assert_eq!(buffer.len(), start + 10 * READ_CHUNK);
        assert!(buffer.capacity() > buffer.len());
    }

    #[test]
    fn test_pump_into_buffer() {
        let payload: Vec<u8> = (0..3 * READ_CHUNK + 17).map(|i| (i % 251) as u8).collect();
        let mut buffer = CaptureBuffer::new();
        let copied = pump(Cursor::new(payload.clone()), OutputSink::Buffer(&mut buffer)).unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(buffer.as_bytes(), &payload[..]);
    }

    #[test]
    fn test_pump_into_callback_is_chunked() {
        let mut chunks: Vec<usize> = Vec::new();
        let mut callback = |chunk: &[u8]| chunks.push(chunk.len());
        pump(
            Cursor::new(vec![b'a'; READ_CHUNK + 1]),
            OutputSink::Callback(&mut callback),
        )
        .unwrap();
        assert_eq!(chunks, vec![READ_CHUNK, 1]);
    }

    #[test]
    fn test_feed_ignores_broken_pipe() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        assert!(feed(Closed, b"data").is_ok());

        let mut sink = Vec::new();
        feed(&mut sink, b"data").unwrap();
        assert_eq!(sink, b"data");
    }
}
