//! The storage engine: path resolution, allocation, and tree mutation.
//!
//! The engine walks validated paths from the root block, caching every
//! resolved [`DirectoryBlock`] and every handed-out node identity by
//! absolute path. All allocation appends at the current end of the
//! container; existing bytes are never overwritten in place except for a
//! block rewriting its own reserved record region.
//!
//! Handles obtained for the same path share one identity: the caches are
//! re-keyed on rename/move and evicted on delete, so an outstanding handle
//! always observes mutations performed through its aliases.

use crate::channel::{ReadableChannel, WritableChannel};
use crate::directory::entry::DirectoryEntry;
use crate::directory::{DirectoryBlock, MAX_ENTRIES};
use crate::error::{CapsuleError, Result};
use crate::io::Container;
use crate::node::{DirectoryNode, FileNode, Node};
use crate::path::{CapsulePath, Segment};
use ahash::AHashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Mutable identity of one handed-out node, shared by all of its handles.
pub(crate) struct NodeState {
    pub path: CapsulePath,
    pub deleted: bool,
}

pub(crate) type NodeShared = Arc<Mutex<NodeState>>;

pub(crate) struct StorageEngine {
    container: Arc<Container>,
    root: Arc<DirectoryBlock>,
    /// Resolved directory blocks by absolute path. Blocks live for the life
    /// of the engine instance.
    blocks: Mutex<AHashMap<CapsulePath, Arc<DirectoryBlock>>>,
    /// Node identities by absolute path, evicted deterministically at every
    /// mutation site.
    nodes: Mutex<AHashMap<CapsulePath, NodeShared>>,
}

impl StorageEngine {
    /// Wrap an opened container, initializing the root block when empty.
    pub fn start(container: Container) -> Result<Arc<Self>> {
        let container = Arc::new(container);
        let root = if container.len()? == 0 {
            Arc::new(DirectoryBlock::create(container.clone(), 0)?)
        } else {
            Arc::new(DirectoryBlock::open(container.clone(), 0))
        };

        let engine = StorageEngine {
            container: container.clone(),
            root: root.clone(),
            blocks: Mutex::new(AHashMap::new()),
            nodes: Mutex::new(AHashMap::new()),
        };
        engine.blocks.lock().insert(CapsulePath::root(), root);
        Ok(Arc::new(engine))
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn sync(&self) -> Result<()> {
        Ok(self.container.sync()?)
    }

    pub fn root_node(self: &Arc<Self>) -> DirectoryNode {
        DirectoryNode::new(self.clone(), self.state_for(&CapsulePath::root()))
    }

    /// Create a new, empty directory at `path`.
    pub fn create_directory(self: &Arc<Self>, path: &CapsulePath) -> Result<DirectoryNode> {
        let (parent, name) = self.resolve_new(path)?;
        if parent.get(&name)?.is_some() {
            return Err(CapsuleError::AlreadyExists(path.clone()));
        }
        if parent.len()? >= MAX_ENTRIES {
            return Err(CapsuleError::CapacityExceeded);
        }

        let offset = self.container.len()?;
        let block = Arc::new(DirectoryBlock::create(self.container.clone(), offset)?);
        parent.add_or_replace(DirectoryEntry::Directory { name, offset })?;
        self.blocks.lock().insert(path.clone(), block);

        Ok(DirectoryNode::new(self.clone(), self.state_for(path)))
    }

    /// Create a new, empty file at `path`.
    ///
    /// The recorded offset is a placeholder until the first write finalizes
    /// it.
    pub fn create_file(self: &Arc<Self>, path: &CapsulePath) -> Result<FileNode> {
        let (parent, name) = self.resolve_new(path)?;
        if parent.get(&name)?.is_some() {
            return Err(CapsuleError::AlreadyExists(path.clone()));
        }

        let offset = self.container.len()?;
        parent.add_or_replace(DirectoryEntry::File {
            name,
            offset,
            size: 0,
        })?;

        Ok(FileNode::new(self.clone(), self.state_for(path)))
    }

    /// Open the node at `path`, or `None` if any segment is missing.
    pub fn open(self: &Arc<Self>, path: &CapsulePath) -> Result<Option<Node>> {
        if path.is_root() {
            return Ok(Some(Node::Directory(self.root_node())));
        }
        let Some(parent) = self.parent_block_of(path)? else {
            return Ok(None);
        };
        let Some(name) = path.last() else {
            return Ok(None);
        };

        match parent.get(name)? {
            None => Ok(None),
            Some(DirectoryEntry::File { .. }) => Ok(Some(Node::File(FileNode::new(
                self.clone(),
                self.state_for(path),
            )))),
            Some(DirectoryEntry::Directory { .. }) => {
                self.block_at(path, &parent)?;
                Ok(Some(Node::Directory(DirectoryNode::new(
                    self.clone(),
                    self.state_for(path),
                ))))
            }
        }
    }

    /// Current children of the directory behind `state`, resolved to nodes.
    ///
    /// Computed from the live block at call time; querying again after a
    /// mutation observes it. Entries unlinked between the snapshot and
    /// resolution are skipped.
    pub fn children_of(self: &Arc<Self>, state: &NodeShared) -> Result<Vec<Node>> {
        let path = self.live_path(state)?;
        let block = self
            .directory_block_of(&path)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;

        let mut children = Vec::new();
        for entry in block.entries()? {
            let child = path.child(entry.name().clone());
            if let Some(node) = self.open(&child)? {
                children.push(node);
            }
        }
        Ok(children)
    }

    /// Re-link `state` under the directory behind `target`.
    ///
    /// The entry keeps its name and its content/block location; only the
    /// parent link changes.
    pub fn move_node(&self, state: &NodeShared, target: &NodeShared) -> Result<()> {
        let path = self.live_path(state)?;
        let target = self.live_path(target)?;

        if path.is_root() {
            return Err(CapsuleError::IllegalMove(
                "cannot move the root directory".into(),
            ));
        }
        if target.all_sub_paths().any(|prefix| prefix == path) {
            return Err(CapsuleError::IllegalMove(format!(
                "cannot move {path} into its own subtree at {target}"
            )));
        }
        // already linked there
        if path.parent().as_ref() == Some(&target) {
            return Ok(());
        }

        let old_parent = self
            .parent_block_of(&path)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;
        let new_parent = self
            .directory_block_of(&target)?
            .ok_or_else(|| CapsuleError::NoSuchParent(target.clone()))?;
        let name = match path.last() {
            Some(name) => name.clone(),
            None => return Err(CapsuleError::AlreadyDeleted(path.clone())),
        };
        let pointer = old_parent
            .get(&name)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;

        let new_path = target.child(name.clone());
        self.evict_prefix(&new_path);
        new_parent.add_or_replace(pointer)?;
        old_parent.unlink(&name, true)?;
        self.rekey_prefix(&path, &new_path);
        Ok(())
    }

    /// Re-link `state` under its current parent with a new name.
    pub fn rename_node(&self, state: &NodeShared, new_name: Segment) -> Result<()> {
        let path = self.live_path(state)?;
        if path.is_root() {
            return Err(CapsuleError::IllegalMove(
                "cannot rename the root directory".into(),
            ));
        }

        let parent = self
            .parent_block_of(&path)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;
        let (parent_path, old_name) = match (path.parent(), path.last()) {
            (Some(parent_path), Some(name)) => (parent_path, name.clone()),
            _ => return Err(CapsuleError::AlreadyDeleted(path.clone())),
        };
        if old_name == new_name {
            return Ok(());
        }
        let pointer = parent
            .get(&old_name)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;

        let new_path = parent_path.child(new_name.clone());
        self.evict_prefix(&new_path);
        parent.unlink(&old_name, false)?;
        parent.add_or_replace(pointer.with_name(new_name))?;
        self.rekey_prefix(&path, &new_path);
        Ok(())
    }

    /// Unlink `state` from its parent, children first for directories.
    ///
    /// Every outstanding handle under the deleted path becomes defunct.
    pub fn delete_node(&self, state: &NodeShared) -> Result<()> {
        let path = self.live_path(state)?;
        if path.is_root() {
            return Err(CapsuleError::IllegalMove(
                "cannot delete the root directory".into(),
            ));
        }

        let parent = self
            .parent_block_of(&path)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;
        let name = match path.last() {
            Some(name) => name.clone(),
            None => return Err(CapsuleError::AlreadyDeleted(path.clone())),
        };
        let entry = parent
            .get(&name)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;

        if entry.is_directory() {
            if let Some(block) = self.block_at(&path, &parent)? {
                self.unlink_subtree(&path, &block)?;
            }
        }
        parent.unlink(&name, true)?;
        self.evict_prefix(&path);
        Ok(())
    }

    /// Open a writer that overwrites the file's content.
    ///
    /// Content goes to a fresh region at the end of the container; the
    /// entry's offset and size are updated when the channel closes.
    pub fn write_channel_for(&self, state: &NodeShared) -> Result<WritableChannel> {
        let (path, parent, _, _) = self.live_file(state)?;
        let offset = self.container.len()?;
        let name = match path.last() {
            Some(name) => name.clone(),
            None => return Err(CapsuleError::AlreadyDeleted(path)),
        };

        Ok(WritableChannel::new(
            self.container.clone(),
            offset,
            Some(Box::new(move |size| {
                parent.add_or_replace(DirectoryEntry::File { name, offset, size })
            })),
        ))
    }

    /// Open a reader bounded by the file's recorded offset and size.
    pub fn read_channel_for(&self, state: &NodeShared) -> Result<ReadableChannel> {
        let (_, _, offset, size) = self.live_file(state)?;
        Ok(ReadableChannel::new(self.container.clone(), offset, size))
    }

    /// Open a writer positioned after the file's current content.
    ///
    /// Appends cannot extend a region in place, so the existing content is
    /// re-read in full and written ahead of the new bytes; cost is
    /// proportional to the existing size.
    pub fn append_channel_for(&self, state: &NodeShared) -> Result<WritableChannel> {
        let mut reader = self.read_channel_for(state)?;
        let mut writer = self.write_channel_for(state)?;
        std::io::copy(&mut reader, &mut writer)?;
        Ok(writer)
    }

    /// Recorded content size of the file behind `state`.
    pub fn size_of(&self, state: &NodeShared) -> Result<u64> {
        let (_, _, _, size) = self.live_file(state)?;
        Ok(size)
    }

    /// Mark every cached identity defunct and drop all caches.
    ///
    /// Used when the engine is replaced wholesale by compaction.
    pub fn invalidate_all(&self) {
        let mut nodes = self.nodes.lock();
        for state in nodes.values() {
            state.lock().deleted = true;
        }
        nodes.clear();
        drop(nodes);
        self.blocks.lock().clear();
    }

    fn state_for(&self, path: &CapsulePath) -> NodeShared {
        self.nodes
            .lock()
            .entry(path.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(NodeState {
                    path: path.clone(),
                    deleted: false,
                }))
            })
            .clone()
    }

    fn live_path(&self, state: &NodeShared) -> Result<CapsulePath> {
        let state = state.lock();
        if state.deleted {
            return Err(CapsuleError::AlreadyDeleted(state.path.clone()));
        }
        Ok(state.path.clone())
    }

    fn live_file(
        &self,
        state: &NodeShared,
    ) -> Result<(CapsulePath, Arc<DirectoryBlock>, u64, u64)> {
        let path = self.live_path(state)?;
        let parent = self
            .parent_block_of(&path)?
            .ok_or_else(|| CapsuleError::AlreadyDeleted(path.clone()))?;
        let entry = match path.last() {
            Some(name) => parent.get(name)?,
            None => None,
        };
        match entry {
            Some(DirectoryEntry::File { offset, size, .. }) => Ok((path, parent, offset, size)),
            _ => Err(CapsuleError::AlreadyDeleted(path)),
        }
    }

    /// Parent checks shared by the create operations.
    fn resolve_new(&self, path: &CapsulePath) -> Result<(Arc<DirectoryBlock>, Segment)> {
        let (parent_path, name) = match (path.parent(), path.last()) {
            (Some(parent_path), Some(name)) => (parent_path, name.clone()),
            // the root always exists
            _ => return Err(CapsuleError::AlreadyExists(path.clone())),
        };
        let parent = self
            .directory_block_of(&parent_path)?
            .ok_or(CapsuleError::NoSuchParent(parent_path))?;
        Ok((parent, name))
    }

    /// The block holding `path`'s entry; the root resolves to itself.
    fn parent_block_of(&self, path: &CapsulePath) -> Result<Option<Arc<DirectoryBlock>>> {
        match path.parent() {
            None => Ok(Some(self.root.clone())),
            Some(parent) => self.directory_block_of(&parent),
        }
    }

    /// Walk the segment chain from the root down to the block at `path`.
    fn directory_block_of(&self, path: &CapsulePath) -> Result<Option<Arc<DirectoryBlock>>> {
        let mut block = self.root.clone();
        for prefix in path.all_sub_paths() {
            block = match self.block_at(&prefix, &block)? {
                Some(next) => next,
                None => return Ok(None),
            };
        }
        Ok(Some(block))
    }

    /// Cached or freshly materialized block for the directory entry `path`
    /// inside `parent`. `None` when the entry is missing or names a file.
    fn block_at(
        &self,
        path: &CapsulePath,
        parent: &Arc<DirectoryBlock>,
    ) -> Result<Option<Arc<DirectoryBlock>>> {
        if let Some(block) = self.blocks.lock().get(path) {
            return Ok(Some(block.clone()));
        }
        let Some(name) = path.last() else {
            return Ok(Some(self.root.clone()));
        };

        match parent.get(name)? {
            Some(DirectoryEntry::Directory { offset, .. }) => {
                let block = Arc::new(DirectoryBlock::open(self.container.clone(), offset));
                self.blocks.lock().insert(path.clone(), block.clone());
                Ok(Some(block))
            }
            _ => Ok(None),
        }
    }

    /// Unlink everything below a doomed directory, children before parents.
    ///
    /// Unlinks within one block are deferred and committed as a single
    /// rewrite per block; the regions become unreachable once the top-level
    /// entry is unlinked, and compaction discards them.
    fn unlink_subtree(&self, path: &CapsulePath, block: &Arc<DirectoryBlock>) -> Result<()> {
        for entry in block.entries()? {
            let child = path.child(entry.name().clone());
            if entry.is_directory() {
                if let Some(child_block) = self.block_at(&child, block)? {
                    self.unlink_subtree(&child, &child_block)?;
                }
            }
            block.unlink(entry.name(), false)?;
        }
        block.commit()
    }

    /// Mark and drop every cached identity at or below `prefix`.
    fn evict_prefix(&self, prefix: &CapsulePath) {
        let mut nodes = self.nodes.lock();
        let doomed: Vec<_> = nodes
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        for path in doomed {
            if let Some(state) = nodes.remove(&path) {
                state.lock().deleted = true;
            }
        }
        drop(nodes);

        self.blocks.lock().retain(|path, _| !path.starts_with(prefix));
    }

    /// Re-key every cached identity under `old` to live under `new`,
    /// updating each node's recorded path.
    fn rekey_prefix(&self, old: &CapsulePath, new: &CapsulePath) {
        let mut blocks = self.blocks.lock();
        let moved: Vec<_> = blocks
            .keys()
            .filter(|path| path.starts_with(old))
            .cloned()
            .collect();
        for path in moved {
            if let Some(block) = blocks.remove(&path) {
                blocks.insert(path.rebased(old, new), block);
            }
        }
        drop(blocks);

        let mut nodes = self.nodes.lock();
        let moved: Vec<_> = nodes
            .keys()
            .filter(|path| path.starts_with(old))
            .cloned()
            .collect();
        for path in moved {
            if let Some(state) = nodes.remove(&path) {
                let rebased = path.rebased(old, new);
                state.lock().path = rebased.clone();
                nodes.insert(rebased, state);
            }
        }
    }
}
