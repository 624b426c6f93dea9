//! newc archive composition.
//!
//! [`ArchiveBuilder`] assigns inode numbers sequentially from
//! [`INODE_BASE`](crate::format::INODE_BASE) and applies the packaging
//! policies below. Policy hits never fail the archive: they are logged and
//! collected as [`PackWarning`]s.
//!
//! - Duplicate paths: the first entry wins, later ones are dropped.
//! - Setuid basenames: files named `su` or `busybox` are always packed
//!   with mode `0o4555`.
//! - Missing sources: a `file` line whose source does not exist is dropped.
//! - Special nodes: `nod`, `pipe` and `sock` lines are accepted but produce
//!   no entry.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::format::{
    pad_len, NewcHeader, ARCHIVE_ALIGNMENT, ENTRY_ALIGNMENT, INODE_BASE, PERMISSION_MASK, S_IFDIR,
    S_IFLNK, S_IFREG, TRAILER_NAME,
};
#[cfg(feature = "pack")]
use crate::error::Result;
#[cfg(feature = "pack")]
use crate::manifest::{ArchiveManifest, EntryKind};
use crate::manifest::SpecialKind;

/// Basenames that are always packed setuid.
pub const SETUID_BASENAMES: [&str; 2] = ["su", "busybox"];

/// Mode forced onto [`SETUID_BASENAMES`].
pub const SETUID_MODE: u32 = 0o4555;

/// A packaging policy that changed the produced archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackWarning {
    /// A later entry reused an already packed path
    DuplicatePath(String),
    /// The source of a `file` line does not exist
    MissingSource { path: String, source: PathBuf },
    /// A `nod`/`pipe`/`sock` line was skipped
    UnsupportedKind { path: String, kind: SpecialKind },
}

impl fmt::Display for PackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackWarning::DuplicatePath(path) => write!(f, "ignoring duplicate {}", path),
            PackWarning::MissingSource { path, source } => {
                write!(f, "source {} of {} not found, skipping", source.display(), path)
            }
            PackWarning::UnsupportedKind { path, kind } => {
                write!(f, "{} is not implemented, skipping {}", kind.keyword(), path)
            }
        }
    }
}

/// Permission bits actually packed for a regular file.
pub fn forced_mode(path: &str, mode: u32) -> u32 {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if SETUID_BASENAMES.contains(&basename) {
        SETUID_MODE
    } else {
        mode & PERMISSION_MASK
    }
}

/// newc archive builder.
///
/// # Example
///
/// ```
/// use ramdisk::ArchiveBuilder;
///
/// let mut builder = ArchiveBuilder::new();
/// builder.add_directory("sbin", 0o750);
/// builder.add_file("sbin/su", b"#!/bin/sh", 0o755);
/// builder.add_symlink("bin", "/system/bin", 0o777);
///
/// let cpio_data = builder.finish();
/// assert_eq!(cpio_data.len() % 512, 0);
/// ```
pub struct ArchiveBuilder {
    data: Vec<u8>,
    next_inode: u32,
    seen: HashSet<String>,
    warnings: Vec<PackWarning>,
}

impl ArchiveBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            next_inode: INODE_BASE,
            seen: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Reserve an inode for `path`, or record a duplicate.
    fn claim(&mut self, path: &str) -> Option<(String, u32)> {
        let path = path.replace('\\', "/");
        if !self.seen.insert(path.clone()) {
            self.warn(PackWarning::DuplicatePath(path));
            return None;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        Some((path, inode))
    }

    fn warn(&mut self, warning: PackWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Add a regular file. Returns `false` if the path was a duplicate.
    pub fn add_file(&mut self, path: &str, content: &[u8], mode: u32) -> bool {
        let Some((path, inode)) = self.claim(path) else {
            return false;
        };
        let mode = forced_mode(&path, mode);
        self.push_entry(inode, &path, S_IFREG | mode, content);
        true
    }

    /// Add a directory. Returns `false` if the path was a duplicate.
    pub fn add_directory(&mut self, path: &str, mode: u32) -> bool {
        let Some((path, inode)) = self.claim(path) else {
            return false;
        };
        self.push_entry(inode, &path, S_IFDIR | (mode & PERMISSION_MASK), &[]);
        true
    }

    /// Add a symbolic link. Returns `false` if the path was a duplicate.
    pub fn add_symlink(&mut self, path: &str, target: &str, mode: u32) -> bool {
        let Some((path, inode)) = self.claim(path) else {
            return false;
        };
        self.push_entry(inode, &path, S_IFLNK | (mode & PERMISSION_MASK), target.as_bytes());
        true
    }

    /// Account for a special node line: it takes an inode but writes nothing.
    pub fn add_special(&mut self, path: &str, kind: SpecialKind) {
        if let Some((path, _)) = self.claim(path) {
            self.warn(PackWarning::UnsupportedKind { path, kind });
        }
    }

    fn push_entry(&mut self, inode: u32, name: &str, mode: u32, data: &[u8]) {
        let header = NewcHeader::packed(inode, name, mode, data.len() as u32);
        debug!("packing {} (inode {}, mode 0o{:o})", name, inode, mode);
        header.encode_into(&mut self.data);

        self.data.extend_from_slice(data);
        self.data
            .extend(std::iter::repeat_n(0, pad_len(data.len(), ENTRY_ALIGNMENT)));
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[PackWarning] {
        &self.warnings
    }

    /// Current size of the archive data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append the trailer, pad to 512 and return the archive bytes.
    pub fn finish(self) -> Vec<u8> {
        self.finish_with_warnings().0
    }

    /// Like [`finish`](Self::finish), also returning the collected warnings.
    pub fn finish_with_warnings(mut self) -> (Vec<u8>, Vec<PackWarning>) {
        let inode = self.next_inode;
        self.push_entry(inode, TRAILER_NAME, 0, &[]);
        let tail = pad_len(self.data.len(), ARCHIVE_ALIGNMENT);
        self.data.extend(std::iter::repeat_n(0, tail));
        (self.data, self.warnings)
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An uncompressed archive and the policies applied while building it.
#[derive(Debug, Clone)]
pub struct PackedArchive {
    pub data: Vec<u8>,
    pub warnings: Vec<PackWarning>,
}

/// Build an archive from a manifest.
///
/// Relative `file` sources are resolved against `root`.
///
/// # Example
///
/// ```no_run
/// use ramdisk::{pack_manifest, ArchiveManifest};
///
/// let text = std::fs::read_to_string("work/cpiolist.txt").unwrap();
/// let manifest = ArchiveManifest::parse(&text).unwrap();
/// let packed = pack_manifest(&manifest, "work").unwrap();
/// ```
#[cfg(feature = "pack")]
pub fn pack_manifest<P: AsRef<Path>>(manifest: &ArchiveManifest, root: P) -> Result<PackedArchive> {
    let root = root.as_ref();
    let mut builder = ArchiveBuilder::new();

    for entry in &manifest.entries {
        match &entry.kind {
            EntryKind::Directory => {
                builder.add_directory(&entry.path, entry.mode);
            }
            EntryKind::Symlink { target } => {
                builder.add_symlink(&entry.path, target, entry.mode);
            }
            EntryKind::Special(kind) => builder.add_special(&entry.path, *kind),
            EntryKind::File { source } => {
                let source = root.join(source);
                match std::fs::read(&source) {
                    Ok(content) => {
                        builder.add_file(&entry.path, &content, entry.mode);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if let Some((path, _)) = builder.claim(&entry.path) {
                            builder.warn(PackWarning::MissingSource { path, source });
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    let (data, warnings) = builder.finish_with_warnings();
    Ok(PackedArchive { data, warnings })
}
