//! # QuickDrop Files
//!
//! Filesystem side of a transfer.
//!
//! This crate provides:
//! - Fixed-size chunked reads of outgoing files
//! - Destination files that enforce contiguous, bounded writes
//! - Filename sanitising and collision-free destination paths
//! - MIME and attachment-kind classification

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod kind;
pub mod naming;
pub mod sink;

pub use chunker::FileSource;
pub use kind::{FileKind, classify};
pub use naming::{sanitize_file_name, unique_destination};
pub use sink::IncomingFile;

use thiserror::Error;

/// Default chunk size (512 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// File transfer errors
#[derive(Debug, Error)]
pub enum FileError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk does not start where the previous one ended
    #[error("chunk offset {actual} does not match bytes written {expected}")]
    OffsetMismatch {
        /// Bytes written so far
        expected: u64,
        /// Offset carried by the chunk
        actual: u64,
    },

    /// Chunk would grow the file past its declared size
    #[error("chunk would write {attempted} bytes, declared size is {declared}")]
    SizeExceeded {
        /// Declared size
        declared: u64,
        /// Size after the write
        attempted: u64,
    },

    /// Write attempted before the destination was created
    #[error("destination file not created")]
    NotCreated,

    /// Path has no usable file name
    #[error("path has no file name: {0}")]
    NoFileName(String),
}

/// Result type for file operations
pub type Result<T> = std::result::Result<T, FileError>;
