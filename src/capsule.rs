//! The public facade over a capsule container file.

use crate::compact;
use crate::engine::StorageEngine;
use crate::error::Result;
use crate::io::Container;
use crate::node::{DirectoryNode, FileNode, Node};
use crate::path::CapsulePath;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A minimal filesystem multiplexed into a single container file.
///
/// Nodes are either a [`DirectoryNode`] or a [`FileNode`], which offer
/// additional APIs for traversal and reading/writing content.
///
/// This type and all related types are not safe for concurrent use from
/// multiple threads; doing so may corrupt the on-disk state.
pub struct Capsule {
    engine: Arc<StorageEngine>,
    path: PathBuf,
}

impl Capsule {
    /// Create a new, empty capsule file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let container = Container::create(&path)?;
        Ok(Capsule {
            engine: StorageEngine::start(container)?,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing capsule file, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let container = Container::open(&path)?;
        Ok(Capsule {
            engine: StorageEngine::start(container)?,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Path of the backing container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The root directory of this capsule.
    pub fn root(&self) -> DirectoryNode {
        self.engine.root_node()
    }

    /// Create a new, empty directory at `path`.
    ///
    /// Fails with [`NoSuchParent`](crate::CapsuleError::NoSuchParent) when
    /// an ancestor is missing and [`AlreadyExists`](crate::CapsuleError::AlreadyExists)
    /// when the path is taken.
    pub fn create_directory(&self, path: &CapsulePath) -> Result<DirectoryNode> {
        self.engine.create_directory(path)
    }

    /// Create a new, empty file at `path`.
    pub fn create_file(&self, path: &CapsulePath) -> Result<FileNode> {
        self.engine.create_file(path)
    }

    /// Open an existing node, or `None` when the path does not exist.
    pub fn open_node(&self, path: &CapsulePath) -> Result<Option<Node>> {
        self.engine.open(path)
    }

    /// Optimize the disk space used by the capsule.
    ///
    /// Rewrites all live data into a fresh container, dropping previously
    /// deleted nodes and directories without children, then atomically
    /// swaps it in place of the old file. Behaves like [`close`](Self::close)
    /// for the consumed instance: all outstanding node handles become
    /// defunct. On failure the original file is untouched and remains
    /// openable.
    pub fn compact(self) -> Result<Capsule> {
        let old_size = self.engine.container().len()?;

        let mut scratch = OsString::from(self.path.as_os_str());
        scratch.push(".compact");
        let scratch = PathBuf::from(scratch);

        if let Err(err) = compact::rewrite_live_tree(self.engine.container(), &scratch) {
            let _ = std::fs::remove_file(&scratch);
            return Err(err);
        }

        self.engine.invalidate_all();
        std::fs::rename(&scratch, &self.path)?;

        let reopened = Capsule::open(&self.path)?;
        tracing::info!(
            "Compacted capsule {}: {} -> {} bytes",
            self.path.display(),
            old_size,
            reopened.engine.container().len()?
        );
        Ok(reopened)
    }

    /// Flush and release the capsule. All node handles become defunct once
    /// the instance is gone.
    pub fn close(self) -> Result<()> {
        self.engine.sync()
    }
}
