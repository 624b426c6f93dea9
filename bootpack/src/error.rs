use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootpackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("boot image error: {0}")]
    BootImage(#[from] bootimg::BootImageError),

    #[error("ramdisk error: {0}")]
    Ramdisk(#[from] ramdisk::RamdiskError),

    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("directory already exists: {}", .0.display())]
    DirectoryExists(PathBuf),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, BootpackError>;
