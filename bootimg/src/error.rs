//! Error types for boot image operations

use thiserror::Error;

/// Result type alias for boot image operations
pub type Result<T> = std::result::Result<T, BootImageError>;

/// Errors that can occur while reading or writing boot images
#[derive(Error, Debug)]
pub enum BootImageError {
    /// Header does not start with "ANDROID!"
    #[error("invalid boot image magic: {0:02x?}")]
    InvalidMagic([u8; 8]),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Board name does not fit the 16-byte field
    #[error("board name too large: {0} bytes (max 16)")]
    BoardNameTooLong(usize),

    /// Command line does not fit the 512-byte field
    #[error("kernel commandline too large: {0} bytes (max 512)")]
    CmdlineTooLong(usize),

    /// Page size or padding unit is not a usable power of two
    #[error("invalid alignment {0:#x}: must be a non-zero power of two")]
    InvalidAlignment(u32),

    /// Page size too small to hold the header
    #[error("page size {0:#x} is smaller than the 608-byte header")]
    PageSizeTooSmall(u32),

    /// Component extends past the end of the image
    #[error("truncated image: {component} needs {needed} bytes at offset {offset:#x}, {available} available")]
    Truncated {
        component: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Vendor preamble declares a payload size that does not match the file
    #[error("vendor preamble size mismatch: declared {declared:#x}, actual {actual:#x}")]
    VendorSizeMismatch { declared: u32, actual: u64 },

    /// Malformed line in a key:value sidecar
    #[error("invalid sidecar line {line}: {message}")]
    InvalidSidecar { line: usize, message: String },

    /// Stored image id does not match the components
    #[error("image id mismatch: stored {stored}, computed {computed}")]
    IdMismatch { stored: String, computed: String },
}
