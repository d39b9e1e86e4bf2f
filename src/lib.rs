//! capsulefs — a filesystem in a single file
//!
//! A minimal, embeddable storage engine that multiplexes one flat container
//! file (a *capsule*) into a tree of directories and files addressed by
//! slash-delimited paths. Applications get hierarchical named storage
//! without depending on the host filesystem: many small logical files pack
//! into one physical file, or storage sandboxes inside a single blob.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use capsulefs::{Capsule, CapsulePath};
//! use std::io::{Read, Write};
//!
//! # fn main() -> capsulefs::Result<()> {
//! let capsule = Capsule::create("app.capsule")?;
//!
//! capsule.create_directory(&CapsulePath::parse("docs")?)?;
//! let file = capsule.create_file(&CapsulePath::parse("docs/readme.md")?)?;
//!
//! let mut writer = file.write_channel()?;
//! writer.write_all(b"hello capsule")?;
//! writer.close()?;
//!
//! let mut content = String::new();
//! file.read_channel()?.read_to_string(&mut content)?;
//! assert_eq!(content, "hello capsule");
//!
//! // reclaim space taken by deleted or overwritten data
//! let capsule = capsule.compact()?;
//! # drop(capsule);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Capsule Container              │
//! ├─────────────────────────────────────────────┤
//! │ Offset 0: Root Directory Block              │
//! │  - 255 fixed-size text records              │
//! │  - <tag>\t<offset>\t<size>\t<name>          │
//! ├─────────────────────────────────────────────┤
//! │ Directory Blocks                            │
//! │  - one reserved region per directory        │
//! │  - rewritten in place, never relocated      │
//! ├─────────────────────────────────────────────┤
//! │ File Content Regions                        │
//! │  - raw bytes at (offset, size)              │
//! │  - appended on every (re)write              │
//! ├─────────────────────────────────────────────┤
//! │ Dead Regions                                │
//! │  - unreachable after delete/overwrite       │
//! │  - reclaimed by compact()                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The container grows append-only: every allocation (new directory block,
//! new or rewritten file content) lands at the current end of the file.
//! Space from deleted and overwritten data is reclaimed by
//! [`Capsule::compact`], which rewrites the live tree into a fresh
//! container and atomically swaps it in.
//!
//! Not safe for concurrent mutation: an engine instance expects a single
//! logical owner thread. There is no crash recovery for partially written
//! content, and no compression or encryption of stored bytes.

pub mod capsule;
pub mod channel;
mod compact;
mod directory;
mod engine;
pub mod error;
mod io;
pub mod node;
pub mod path;

// Re-export commonly used types
pub use capsule::Capsule;
pub use channel::{ReadableChannel, WritableChannel};
pub use directory::MAX_ENTRIES;
pub use error::{CapsuleError, Result};
pub use node::{DirectoryNode, FileNode, Node};
pub use path::{CapsulePath, Segment, DELIMITER};

/// Capsule format version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
