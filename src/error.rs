//! Error kinds surfaced at the codec, registry, lock and transfer boundaries.

use std::path::PathBuf;

/// Errors produced by the p2pshare protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("field `{field}` is {len} bytes, max {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    #[error("command code must be exactly 3 bytes, got {0}")]
    InvalidCodeLength(usize),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("exactly one of name or code must be given")]
    AmbiguousSelector,

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("upload already in progress for {}", .0.display())]
    LockContention(PathBuf),

    #[error("upload destination is a directory: {}", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("overwrite of a mismatching local file was declined")]
    ResumeRejected,

    #[error("peer signalled an error")]
    PeerRejected,

    #[error("unexpected sentinel {0:?}")]
    UnexpectedSentinel([u8; 3]),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShareError>;
