//! One child of a directory: a file pointer or a sub-directory pointer.

use crate::error::{CapsuleError, Result};
use crate::path::Segment;

const DIR_TAG: &str = "d";
const FILE_TAG: &str = "f";

/// Directory blocks store one record per entry, keyed by the entry name.
///
/// A file pointer carries the absolute offset and size of the content
/// region; a directory pointer carries the absolute offset of the child's
/// block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryEntry {
    File {
        name: Segment,
        offset: u64,
        size: u64,
    },
    Directory {
        name: Segment,
        offset: u64,
    },
}

impl DirectoryEntry {
    pub fn name(&self) -> &Segment {
        match self {
            DirectoryEntry::File { name, .. } => name,
            DirectoryEntry::Directory { name, .. } => name,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, DirectoryEntry::Directory { .. })
    }

    /// The same entry under a different name, for renames.
    pub fn with_name(self, name: Segment) -> Self {
        match self {
            DirectoryEntry::File { offset, size, .. } => DirectoryEntry::File { name, offset, size },
            DirectoryEntry::Directory { offset, .. } => DirectoryEntry::Directory { name, offset },
        }
    }

    /// Persistent record form: `<tag>\t<offset>\t<size>\t<name>`.
    ///
    /// Directories have no size; the field is written as `-1`.
    pub fn encode(&self) -> String {
        match self {
            DirectoryEntry::File { name, offset, size } => {
                format!("{FILE_TAG}\t{offset}\t{size}\t{name}")
            }
            DirectoryEntry::Directory { name, offset } => {
                format!("{DIR_TAG}\t{offset}\t-1\t{name}")
            }
        }
    }

    /// Parse one record line written by [`encode`](Self::encode).
    pub fn decode(line: &str) -> Result<Self> {
        let corrupt = || CapsuleError::CorruptEntry(line.to_string());

        let mut fields = line.splitn(4, '\t');
        let (tag, offset, size, name) =
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(tag), Some(offset), Some(size), Some(name)) => (tag, offset, size, name),
                _ => return Err(corrupt()),
            };

        let offset: u64 = offset.parse().map_err(|_| corrupt())?;
        let name = Segment::of(name)?;

        match tag {
            DIR_TAG => Ok(DirectoryEntry::Directory { name, offset }),
            FILE_TAG => {
                let size: u64 = size.parse().map_err(|_| corrupt())?;
                Ok(DirectoryEntry::File { name, offset, size })
            }
            _ => Err(corrupt()),
        }
    }
}
