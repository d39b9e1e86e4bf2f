//! Compaction: rewrite the live tree into a fresh container.
//!
//! The capsule grows append-only, so deleted entries and overwritten
//! content keep occupying space until a compaction pass copies everything
//! still reachable into a new container and the caller swaps it in.
//! Absolute paths and file bytes are preserved exactly; unreachable regions
//! and directories left without any live file below them are dropped.

use crate::channel::{ReadableChannel, WritableChannel};
use crate::directory::entry::DirectoryEntry;
use crate::directory::DirectoryBlock;
use crate::error::Result;
use crate::io::Container;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

/// Copy the live tree of `source` into a new container at `destination`.
///
/// The source is only read; on error the destination is left partially
/// written and should be discarded by the caller. The root block is always
/// written at offset 0, even when the tree is empty.
pub fn rewrite_live_tree(source: &Arc<Container>, destination: &Path) -> Result<()> {
    let dest = Arc::new(Container::create(destination)?);

    let src_root = Arc::new(DirectoryBlock::open(source.clone(), 0));
    let dst_root = Arc::new(DirectoryBlock::create(dest.clone(), 0)?);

    // breadth-first: parents settle their entry tables before children
    let mut queue = VecDeque::new();
    queue.push_back((src_root, dst_root));

    while let Some((src_block, dst_block)) = queue.pop_front() {
        let mut rewritten = Vec::new();

        for entry in src_block.entries()? {
            match entry {
                DirectoryEntry::File { name, offset, size } => {
                    let new_offset = dest.len()?;
                    let copied = copy_content(source, offset, size, &dest, new_offset)?;
                    rewritten.push(DirectoryEntry::File {
                        name,
                        offset: new_offset,
                        size: copied,
                    });
                }
                DirectoryEntry::Directory { name, offset } => {
                    let child = Arc::new(DirectoryBlock::open(source.clone(), offset));
                    // a directory without any live file below it is dropped
                    if !subtree_has_file(&child)? {
                        continue;
                    }
                    let new_offset = dest.len()?;
                    let child_dst = Arc::new(DirectoryBlock::create(dest.clone(), new_offset)?);
                    rewritten.push(DirectoryEntry::Directory {
                        name,
                        offset: new_offset,
                    });
                    queue.push_back((child, child_dst));
                }
            }
        }

        dst_block.install(rewritten)?;
    }

    Ok(dest.sync()?)
}

fn copy_content(
    source: &Arc<Container>,
    offset: u64,
    size: u64,
    dest: &Arc<Container>,
    new_offset: u64,
) -> Result<u64> {
    let mut reader = ReadableChannel::new(source.clone(), offset, size);
    let mut writer = WritableChannel::new(dest.clone(), new_offset, None);
    std::io::copy(&mut reader, &mut writer)?;

    let copied = writer.written();
    writer.close()?;
    Ok(copied)
}

fn subtree_has_file(block: &DirectoryBlock) -> Result<bool> {
    for entry in block.entries()? {
        match entry {
            DirectoryEntry::File { .. } => return Ok(true),
            DirectoryEntry::Directory { offset, .. } => {
                let child = DirectoryBlock::open(block.container().clone(), offset);
                if subtree_has_file(&child)? {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}
