//! Error types for ramdisk operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while unpacking or repacking a ramdisk.
#[derive(Error, Debug)]
pub enum RamdiskError {
    /// I/O error during read/write operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input is neither gzip framed nor a bare newc archive
    #[error("invalid ramdisk")]
    InvalidRamdisk,

    /// Malformed gzip member header
    #[error("Invalid gzip header: {0}")]
    InvalidGzip(String),

    /// Invalid CPIO archive
    #[error("Invalid CPIO archive: {0}")]
    InvalidCpio(String),

    /// Invalid path (e.g., path traversal attempt)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Malformed line in the archive manifest sidecar
    #[error("Invalid manifest line {line}: {message}")]
    InvalidManifest { line: usize, message: String },

    /// Deflate error while wrapping
    #[error("Compression error: {0}")]
    Compression(String),

    /// Deflate error while unwrapping
    #[error("Decompression error: {0}")]
    Decompression(String),
}

/// Result type alias for ramdisk operations.
pub type Result<T> = std::result::Result<T, RamdiskError>;
