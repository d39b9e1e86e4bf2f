use crate::path::CapsulePath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapsuleError {
    #[error("Invalid path segment \"{segment}\": {reason}")]
    InvalidSegment {
        segment: String,
        reason: &'static str,
    },

    #[error("No such parent directory: {0}")]
    NoSuchParent(CapsulePath),

    #[error("Node already exists: {0}")]
    AlreadyExists(CapsulePath),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Node already deleted: {0}")]
    AlreadyDeleted(CapsulePath),

    #[error("Maximum number of entries per directory exceeded")]
    CapacityExceeded,

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Corrupt directory record: {0:?}")]
    CorruptEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CapsuleError>;
