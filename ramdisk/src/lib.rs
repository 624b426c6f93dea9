//! # ramdisk
//!
//! A Rust library for unpacking and repacking Android ramdisks.
//!
//! A ramdisk is a newc cpio archive, usually wrapped in a gzip member. This
//! crate turns one into an extracted file tree plus an editable manifest
//! (`cpiolist.txt`), and turns such a manifest back into archive bytes.
//!
//! ## Features
//!
//! - **`extract`** (default): Extract archives to a directory
//! - **`pack`** (default): Build archives from a manifest
//!
//! ## Quick Start
//!
//! ### Unpacking
//!
//! ```no_run
//! let data = std::fs::read("work/ramdisk.gz").unwrap();
//! let manifest = ramdisk::unpack(&data, "work", "initrd").unwrap();
//! std::fs::write("work/cpiolist.txt", manifest.to_text()).unwrap();
//! ```
//!
//! ### Repacking
//!
//! ```no_run
//! use ramdisk::ArchiveManifest;
//!
//! let text = std::fs::read_to_string("work/cpiolist.txt").unwrap();
//! let manifest = ArchiveManifest::parse(&text).unwrap();
//! let packed = ramdisk::pack(&manifest, "work").unwrap();
//! for warning in &packed.warnings {
//!     eprintln!("{}", warning);
//! }
//! std::fs::write("work/ramdisk.cpio.gz", &packed.data).unwrap();
//! ```
//!
//! ## Packing Policies
//!
//! Packing never fails on a bad manifest line that it can skip. Duplicate
//! paths, missing sources and special nodes are dropped, and `su` and
//! `busybox` are forced setuid. See [`writer`] for the full list.

pub mod error;
pub mod format;
pub mod framing;
pub mod manifest;
pub mod reader;
pub mod writer;

// Re-exports for convenience
pub use error::{RamdiskError, Result};
pub use format::NewcHeader;
pub use framing::Framing;
pub use manifest::{ArchiveEntry, ArchiveManifest, EntryKind, SpecialKind};
pub use reader::{ArchiveMember, ArchiveReader, MemberContent};
#[cfg(feature = "pack")]
pub use writer::pack_manifest;
pub use writer::{ArchiveBuilder, PackWarning, PackedArchive};

use std::io::Cursor;
use std::path::Path;

use log::info;

/// Unwrap a ramdisk stream and extract it under `root/directory`.
///
/// The returned manifest records the detected compression level: 6 for a
/// gzip member, 0 for a bare archive.
#[cfg(feature = "extract")]
pub fn unpack<P: AsRef<Path>>(data: &[u8], root: P, directory: &str) -> Result<ArchiveManifest> {
    let (archive, framing) = framing::unwrap(data)?;
    info!("ramdisk framing: {:?}", framing);

    let mut reader = ArchiveReader::new(Cursor::new(archive));
    let mut manifest = reader.extract_into(root, directory)?;
    manifest.compression_level = framing.level().unwrap_or(0);
    Ok(manifest)
}

/// Build the archive for `manifest` and wrap it at the manifest's level.
#[cfg(feature = "pack")]
pub fn pack<P: AsRef<Path>>(manifest: &ArchiveManifest, root: P) -> Result<PackedArchive> {
    let packed = pack_manifest(manifest, root)?;
    info!(
        "packed {} bytes of archive, compression level {}",
        packed.data.len(),
        manifest.compression_level
    );
    Ok(PackedArchive {
        data: framing::wrap(&packed.data, manifest.compression_level)?,
        warnings: packed.warnings,
    })
}
