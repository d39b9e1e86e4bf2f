//! Byte-range channels: bounded, forward-only views over the container.
//!
//! A [`ReadableChannel`] covers `[start, start + size)` and reports end of
//! data once the range is consumed. A [`WritableChannel`] appends at
//! increasing offsets from `start` and reports the final byte count to a
//! completion hook exactly once on close, so the caller can persist the
//! resulting `(offset, size)` into a directory entry.
//!
//! Closing either view is idempotent and never touches the shared container
//! itself; reads and writes after close fail with
//! [`ChannelClosed`](crate::CapsuleError::ChannelClosed).

use crate::error::{CapsuleError, Result};
use crate::io::Container;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Commit hook invoked with the number of bytes written.
pub(crate) type CloseHook = Box<dyn FnOnce(u64) -> Result<()> + Send>;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, CapsuleError::ChannelClosed)
}

/// Sequential reader over a fixed byte range of the container.
pub struct ReadableChannel {
    container: Arc<Container>,
    start: u64,
    size: u64,
    consumed: u64,
    open: AtomicBool,
}

impl ReadableChannel {
    pub(crate) fn new(container: Arc<Container>, start: u64, size: u64) -> Self {
        ReadableChannel {
            container,
            start,
            size,
            consumed: 0,
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Bytes left before the end of the range.
    pub fn remaining(&self) -> u64 {
        self.size - self.consumed
    }

    /// Close this view. Idempotent; the container stays open.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl io::Read for ReadableChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(closed_error());
        }
        if self.consumed == self.size {
            return Ok(0);
        }

        let want = buf.len().min((self.size - self.consumed) as usize);
        let n = self.container.read_at(self.start + self.consumed, &mut buf[..want])?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Sequential writer appending at increasing offsets from `start`.
pub struct WritableChannel {
    container: Arc<Container>,
    start: u64,
    written: AtomicU64,
    open: AtomicBool,
    on_close: Mutex<Option<CloseHook>>,
}

impl WritableChannel {
    pub(crate) fn new(container: Arc<Container>, start: u64, on_close: Option<CloseHook>) -> Self {
        WritableChannel {
            container,
            start,
            written: AtomicU64::new(0),
            open: AtomicBool::new(true),
            on_close: Mutex::new(on_close),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Total bytes written through this channel so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Close this view, firing the completion hook exactly once.
    ///
    /// Safe to call more than once and from multiple threads; the hook runs
    /// on the first call only. The container stays open.
    pub fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            if let Some(hook) = self.on_close.lock().take() {
                return hook(self.written());
            }
        }
        Ok(())
    }
}

impl io::Write for WritableChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(closed_error());
        }

        let written = self.written.load(Ordering::Acquire);
        self.container.write_all_at(self.start + written, buf)?;
        self.written.store(written + buf.len() as u64, Ordering::Release);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WritableChannel {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                tracing::warn!("write channel dropped without close, commit failed: {err}");
            }
        }
    }
}
