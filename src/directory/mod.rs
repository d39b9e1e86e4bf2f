//! Fixed-capacity on-disk directory blocks.
//!
//! A block is the durable key-value table of one directory's children. It
//! owns a fixed region of [`BLOCK_SIZE`] bytes in the container, reserved in
//! full when the block is allocated; the region never moves or grows. Every
//! mutation re-serializes the full live entry set into the region, so a
//! block stays within its reservation regardless of insert/delete order.

pub mod entry;

use crate::channel::{ReadableChannel, WritableChannel};
use crate::error::{CapsuleError, Result};
use crate::io::Container;
use crate::path::Segment;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use entry::DirectoryEntry;

/// Most entries a single directory can hold.
pub const MAX_ENTRIES: usize = 255;

/// Worst-case record size: tag, four separators, two numeric fields as wide
/// as `i64::MAX`, the name, and the terminating newline.
const ENTRY_SIZE: usize = Segment::SIZE_LIMIT + 4 + 2 * 19 + 1 + 1;

/// Reserved disk region per directory block.
pub const BLOCK_SIZE: u64 = (MAX_ENTRIES * ENTRY_SIZE) as u64;

/// The on-disk table of one directory's children.
///
/// Records are loaded lazily on first access and cached for the lifetime of
/// the block. The end of live records within the region is signaled by a
/// blank line; a freshly allocated block is pre-filled with blank-line
/// filler so it reads back as zero entries.
pub struct DirectoryBlock {
    container: Arc<Container>,
    start: u64,
    entries: Mutex<Option<Vec<DirectoryEntry>>>,
}

impl DirectoryBlock {
    /// Allocate a new block at `start`, reserving its full region on disk.
    pub fn create(container: Arc<Container>, start: u64) -> Result<Self> {
        let mut channel = WritableChannel::new(container.clone(), start, None);
        channel.write_all(&vec![b'\n'; BLOCK_SIZE as usize])?;
        channel.close()?;

        Ok(DirectoryBlock {
            container,
            start,
            entries: Mutex::new(Some(Vec::new())),
        })
    }

    /// Refer to an existing block at `start` without touching the disk.
    pub fn open(container: Arc<Container>, start: u64) -> Self {
        DirectoryBlock {
            container,
            start,
            entries: Mutex::new(None),
        }
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Snapshot of the current entry set, in insertion/load order.
    pub fn entries(&self) -> Result<Vec<DirectoryEntry>> {
        let mut cache = self.entries.lock();
        Ok(self.loaded(&mut cache)?.clone())
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let mut cache = self.entries.lock();
        Ok(self.loaded(&mut cache)?.len())
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &Segment) -> Result<Option<DirectoryEntry>> {
        let mut cache = self.entries.lock();
        Ok(self
            .loaded(&mut cache)?
            .iter()
            .find(|e| e.name() == name)
            .cloned())
    }

    /// Upsert an entry by name, rewriting the record region when the live
    /// set actually changed.
    ///
    /// Fails with [`CapacityExceeded`](CapsuleError::CapacityExceeded) when
    /// the upsert would introduce a 256th distinct name; neither memory nor
    /// disk are touched in that case.
    pub fn add_or_replace(&self, entry: DirectoryEntry) -> Result<()> {
        let mut cache = self.entries.lock();
        let entries = self.loaded(&mut cache)?;

        match entries.iter().position(|e| e.name() == entry.name()) {
            Some(i) => {
                if entries[i] == entry {
                    return Ok(());
                }
                entries[i] = entry;
            }
            None => {
                if entries.len() >= MAX_ENTRIES {
                    return Err(CapsuleError::CapacityExceeded);
                }
                entries.push(entry);
            }
        }
        self.save(entries)
    }

    /// Remove an entry by name if present; returns whether one was removed.
    ///
    /// With `commit` false the rewrite is deferred until [`commit`](Self::commit)
    /// is called, allowing several unlinks to batch into one rewrite.
    pub fn unlink(&self, name: &Segment, commit: bool) -> Result<bool> {
        let mut cache = self.entries.lock();
        let entries = self.loaded(&mut cache)?;

        let Some(i) = entries.iter().position(|e| e.name() == name) else {
            return Ok(false);
        };
        entries.remove(i);
        if commit {
            self.save(entries)?;
        }
        Ok(true)
    }

    /// Rewrite the record region from the current entry set.
    pub fn commit(&self) -> Result<()> {
        let mut cache = self.entries.lock();
        let entries = self.loaded(&mut cache)?;
        self.save(entries)
    }

    /// Replace the whole entry set at once, with a single rewrite.
    pub fn install(&self, entries: Vec<DirectoryEntry>) -> Result<()> {
        if entries.len() > MAX_ENTRIES {
            return Err(CapsuleError::CapacityExceeded);
        }
        self.save(&entries)?;
        *self.entries.lock() = Some(entries);
        Ok(())
    }

    fn loaded<'a>(
        &self,
        cache: &'a mut Option<Vec<DirectoryEntry>>,
    ) -> Result<&'a mut Vec<DirectoryEntry>> {
        if cache.is_none() {
            *cache = Some(self.load()?);
        }
        Ok(cache.get_or_insert_with(Vec::new))
    }

    fn load(&self) -> Result<Vec<DirectoryEntry>> {
        let channel = ReadableChannel::new(self.container.clone(), self.start, BLOCK_SIZE);
        let reader = BufReader::new(channel);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() || entries.len() == MAX_ENTRIES {
                break;
            }
            entries.push(DirectoryEntry::decode(&line)?);
        }
        Ok(entries)
    }

    fn save(&self, entries: &[DirectoryEntry]) -> Result<()> {
        let mut records = String::new();
        for entry in entries {
            records.push_str(&entry.encode());
            records.push('\n');
        }
        // blank line signals premature end of entries
        if entries.len() < MAX_ENTRIES {
            records.push('\n');
        }

        let mut channel = WritableChannel::new(self.container.clone(), self.start, None);
        channel.write_all(records.as_bytes())?;
        channel.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn scratch() -> (NamedTempFile, Arc<Container>) {
        let temp = NamedTempFile::new().unwrap();
        let container = Container::create(temp.path()).unwrap();
        (temp, Arc::new(container))
    }

    fn file_entry(name: &str, offset: u64, size: u64) -> DirectoryEntry {
        DirectoryEntry::File {
            name: Segment::of(name).unwrap(),
            offset,
            size,
        }
    }

    fn dir_entry(name: &str, offset: u64) -> DirectoryEntry {
        DirectoryEntry::Directory {
            name: Segment::of(name).unwrap(),
            offset,
        }
    }

    #[test]
    fn test_empty_block_is_queryable() {
        let (_temp, container) = scratch();
        let block = DirectoryBlock::create(container, 0).unwrap();
        assert!(block.entries().unwrap().is_empty());
        assert_eq!(block.len().unwrap(), 0);
    }

    #[test]
    fn test_fresh_block_reads_back_empty() {
        let (_temp, container) = scratch();
        DirectoryBlock::create(container.clone(), 0).unwrap();

        // a second view over the same region sees the blank-line filler
        let reopened = DirectoryBlock::open(container, 0);
        assert!(reopened.entries().unwrap().is_empty());
    }

    #[test]
    fn test_add_get_unlink_round_trip() {
        let (_temp, container) = scratch();
        let block = DirectoryBlock::create(container, 0).unwrap();
        let file = file_entry("fileA.txt", 456, 123);
        let dir = dir_entry("dirA", 123);

        block.add_or_replace(file.clone()).unwrap();
        block.add_or_replace(dir.clone()).unwrap();

        assert_eq!(block.get(file.name()).unwrap(), Some(file.clone()));
        assert_eq!(block.get(dir.name()).unwrap(), Some(dir.clone()));

        assert!(block.unlink(file.name(), true).unwrap());
        assert!(!block.unlink(file.name(), true).unwrap());
        assert_eq!(block.entries().unwrap(), vec![dir]);
    }

    #[test]
    fn test_replace_by_name_keeps_position() {
        let (_temp, container) = scratch();
        let block = DirectoryBlock::create(container, 0).unwrap();

        block.add_or_replace(file_entry("a", 0, 0)).unwrap();
        block.add_or_replace(file_entry("b", 0, 0)).unwrap();
        block.add_or_replace(file_entry("a", 99, 7)).unwrap();

        assert_eq!(
            block.entries().unwrap(),
            vec![file_entry("a", 99, 7), file_entry("b", 0, 0)]
        );
    }

    #[test]
    fn test_entries_persist_across_reopen() {
        let (temp, container) = scratch();
        let entries = vec![file_entry("fileA.txt", 456, 123), dir_entry("dirB", 255)];
        {
            let block = DirectoryBlock::create(container, 0).unwrap();
            for e in &entries {
                block.add_or_replace(e.clone()).unwrap();
            }
        }

        let container = Arc::new(Container::open(temp.path()).unwrap());
        let block = DirectoryBlock::open(container, 0);
        assert_eq!(block.entries().unwrap(), entries);
    }

    #[test]
    fn test_deferred_unlink_commits_in_one_rewrite() {
        let (_temp, container) = scratch();
        let block = DirectoryBlock::create(container.clone(), 0).unwrap();
        for name in ["a", "b", "c"] {
            block.add_or_replace(file_entry(name, 0, 0)).unwrap();
        }

        block.unlink(&Segment::of("a").unwrap(), false).unwrap();
        block.unlink(&Segment::of("b").unwrap(), false).unwrap();

        // not yet on disk
        let stale = DirectoryBlock::open(container.clone(), 0);
        assert_eq!(stale.len().unwrap(), 3);

        block.commit().unwrap();
        let fresh = DirectoryBlock::open(container, 0);
        assert_eq!(fresh.entries().unwrap(), vec![file_entry("c", 0, 0)]);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let (_temp, container) = scratch();
        let block = DirectoryBlock::create(container, 0).unwrap();

        for i in 0..MAX_ENTRIES {
            block
                .add_or_replace(file_entry(&format!("entry-{i}"), i64::MAX as u64, 0))
                .unwrap();
        }
        assert!(matches!(
            block.add_or_replace(file_entry("one-too-many", 0, 0)),
            Err(CapsuleError::CapacityExceeded)
        ));
        // replacing an existing name is still allowed at capacity
        block.add_or_replace(file_entry("entry-0", 1, 1)).unwrap();
        assert_eq!(block.len().unwrap(), MAX_ENTRIES);
    }

    #[test]
    fn test_full_block_round_trips_through_disk() {
        let (temp, container) = scratch();
        {
            let block = DirectoryBlock::create(container, 0).unwrap();
            let name = "n".repeat(Segment::SIZE_LIMIT);
            for i in 0..MAX_ENTRIES {
                let mut name = name.clone().into_bytes();
                name[0] = b'a' + (i % 26) as u8;
                name[1] = b'a' + (i / 26) as u8;
                let name = String::from_utf8(name).unwrap();
                block
                    .add_or_replace(file_entry(&name, i64::MAX as u64, i64::MAX as u64))
                    .unwrap();
            }
        }

        let container = Arc::new(Container::open(temp.path()).unwrap());
        let block = DirectoryBlock::open(container, 0);
        assert_eq!(block.len().unwrap(), MAX_ENTRIES);
    }
}
