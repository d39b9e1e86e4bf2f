//! Node handles: live, path-aware references to directories and files.
//!
//! Handles are thin views; every durable mutation is delegated to the
//! storage engine. All handles obtained for the same path share one
//! identity, so a mutation performed through one is observed by the others.
//! Once the underlying entry is unlinked, every outstanding handle fails
//! with [`AlreadyDeleted`](crate::CapsuleError::AlreadyDeleted).

use crate::channel::{ReadableChannel, WritableChannel};
use crate::engine::{NodeShared, StorageEngine};
use crate::error::Result;
use crate::path::{CapsulePath, Segment};
use std::fmt;
use std::sync::Arc;

/// A directory or file node.
#[derive(Clone)]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    pub fn name(&self) -> String {
        match self {
            Node::Directory(dir) => dir.name(),
            Node::File(file) => file.name(),
        }
    }

    pub fn path(&self) -> CapsulePath {
        match self {
            Node::Directory(dir) => dir.path(),
            Node::File(file) => file.path(),
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    /// Move this node (and all its children) under another directory.
    pub fn move_to(&self, directory: &DirectoryNode) -> Result<()> {
        match self {
            Node::Directory(dir) => dir.move_to(directory),
            Node::File(file) => file.move_to(directory),
        }
    }

    /// Rename this node in place.
    pub fn rename(&self, name: Segment) -> Result<()> {
        match self {
            Node::Directory(dir) => dir.rename(name),
            Node::File(file) => file.rename(name),
        }
    }

    /// Delete this node, making it unreachable and all handles defunct.
    pub fn delete(&self) -> Result<()> {
        match self {
            Node::Directory(dir) => dir.delete(),
            Node::File(file) => file.delete(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Directory(dir) => fmt::Debug::fmt(dir, f),
            Node::File(file) => fmt::Debug::fmt(file, f),
        }
    }
}

/// A live reference to a directory.
#[derive(Clone)]
pub struct DirectoryNode {
    engine: Arc<StorageEngine>,
    state: NodeShared,
}

impl DirectoryNode {
    pub(crate) fn new(engine: Arc<StorageEngine>, state: NodeShared) -> Self {
        DirectoryNode { engine, state }
    }

    pub(crate) fn state(&self) -> &NodeShared {
        &self.state
    }

    /// The directory name; `"/"` for the root.
    pub fn name(&self) -> String {
        let path = self.path();
        match path.last() {
            Some(segment) => segment.to_string(),
            None => "/".to_string(),
        }
    }

    /// The absolute path of this directory.
    pub fn path(&self) -> CapsulePath {
        self.state.lock().path.clone()
    }

    pub fn is_root(&self) -> bool {
        self.path().is_root()
    }

    /// The current children of this directory, resolved to handles.
    ///
    /// Backed by the live block, not a frozen snapshot: calling again after
    /// a mutation observes it.
    pub fn children(&self) -> Result<Vec<Node>> {
        self.engine.children_of(&self.state)
    }

    /// Open a direct child by name.
    pub fn open(&self, segment: Segment) -> Result<Option<Node>> {
        self.engine.open(&self.path().child(segment))
    }

    /// Create a new, empty sub-directory of this directory.
    pub fn create_directory(&self, name: Segment) -> Result<DirectoryNode> {
        self.engine.create_directory(&self.path().child(name))
    }

    /// Create a new, empty file in this directory.
    pub fn create_file(&self, name: Segment) -> Result<FileNode> {
        self.engine.create_file(&self.path().child(name))
    }

    pub fn move_to(&self, directory: &DirectoryNode) -> Result<()> {
        self.engine.move_node(&self.state, directory.state())
    }

    pub fn rename(&self, name: Segment) -> Result<()> {
        self.engine.rename_node(&self.state, name)
    }

    pub fn delete(&self) -> Result<()> {
        self.engine.delete_node(&self.state)
    }
}

impl PartialEq for DirectoryNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine) && self.path() == other.path()
    }
}

impl Eq for DirectoryNode {}

impl fmt::Debug for DirectoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DirectoryNode")
            .field("path", &state.path.to_string())
            .field("deleted", &state.deleted)
            .finish()
    }
}

/// A live reference to a file.
#[derive(Clone)]
pub struct FileNode {
    engine: Arc<StorageEngine>,
    state: NodeShared,
}

impl FileNode {
    pub(crate) fn new(engine: Arc<StorageEngine>, state: NodeShared) -> Self {
        FileNode { engine, state }
    }

    /// The file name, including any extension.
    pub fn name(&self) -> String {
        let path = self.path();
        match path.last() {
            Some(segment) => segment.to_string(),
            None => String::new(),
        }
    }

    /// The absolute path of this file.
    pub fn path(&self) -> CapsulePath {
        self.state.lock().path.clone()
    }

    /// The recorded size of the file content in bytes.
    pub fn size(&self) -> Result<u64> {
        self.engine.size_of(&self.state)
    }

    /// Open a reader over the file's current content.
    pub fn read_channel(&self) -> Result<ReadableChannel> {
        self.engine.read_channel_for(&self.state)
    }

    /// Open a writer that replaces the file's content on close.
    pub fn write_channel(&self) -> Result<WritableChannel> {
        self.engine.write_channel_for(&self.state)
    }

    /// Open a writer that appends to the file's content.
    ///
    /// Existing content is re-read in full before the new bytes, so the
    /// cost of an append grows with the current file size.
    pub fn append_channel(&self) -> Result<WritableChannel> {
        self.engine.append_channel_for(&self.state)
    }

    pub fn move_to(&self, directory: &DirectoryNode) -> Result<()> {
        self.engine.move_node(&self.state, directory.state())
    }

    pub fn rename(&self, name: Segment) -> Result<()> {
        self.engine.rename_node(&self.state, name)
    }

    pub fn delete(&self) -> Result<()> {
        self.engine.delete_node(&self.state)
    }
}

impl PartialEq for FileNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine) && self.path() == other.path()
    }
}

impl Eq for FileNode {}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileNode")
            .field("path", &state.path.to_string())
            .field("deleted", &state.deleted)
            .finish()
    }
}
