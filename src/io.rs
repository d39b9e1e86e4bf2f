//! Disk I/O for the backing container file.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

/// The single backing store multiplexed by the engine.
///
/// All directory blocks and byte-range channels share one container. The
/// mutex serializes positional accesses so that overlapping seek/read pairs
/// from different channels never tear.
pub struct Container {
    file: Mutex<File>,
}

impl Container {
    /// Create a new, empty container file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Container { file: Mutex::new(file) })
    }

    /// Open an existing container file, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        Ok(Container { file: Mutex::new(file) })
    }

    /// Current end-of-container offset; new allocations append here.
    pub fn len(&self) -> std::io::Result<u64> {
        self.file.lock().metadata().map(|m| m.len())
    }

    /// Read at most `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` at end of the container.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }

    /// Write all of `buf` starting at `offset`.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    /// Flush all written data to disk.
    pub fn sync(&self) -> std::io::Result<()> {
        self.file.lock().sync_all()
    }
}
