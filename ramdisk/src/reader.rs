//! newc archive parsing and extraction.
//!
//! # Example
//!
//! ```no_run
//! use ramdisk::ArchiveReader;
//! use std::io::Cursor;
//!
//! let data = std::fs::read("ramdisk.cpio").unwrap();
//! let mut reader = ArchiveReader::new(Cursor::new(data));
//! let manifest = reader.extract_into("work", "initrd").unwrap();
//! std::fs::write("work/cpiolist.txt", manifest.to_text()).unwrap();
//! ```

use std::io::Read;
use std::path::{Component, Path};

use log::debug;

use crate::error::{RamdiskError, Result};
use crate::format::{pad_len, read_sized, NewcHeader, NodeType, ENTRY_ALIGNMENT};
use crate::manifest::{ArchiveEntry, ArchiveManifest};

/// A member read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Normalized path within the archive
    pub path: String,
    /// Permission bits
    pub mode: u32,
    pub content: MemberContent,
}

/// Kind-specific payload of an [`ArchiveMember`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberContent {
    File(Vec<u8>),
    Directory,
    Symlink(String),
    /// Device, fifo or socket; payload discarded
    Other,
}

/// A reader for newc archives.
pub struct ArchiveReader<R> {
    reader: R,
    position: u64,
}

impl<R: Read> ArchiveReader<R> {
    /// Create a new archive reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next header, stopping at the trailer.
    ///
    /// A stream that ends without a trailer is treated as an error.
    fn next_header(&mut self) -> Result<Option<NewcHeader>> {
        let header = NewcHeader::read(&mut self.reader)?.ok_or_else(|| {
            RamdiskError::InvalidCpio(format!("missing trailer at offset {}", self.position))
        })?;
        let name_span = crate::format::HEADER_SIZE + header.namesize as usize;
        self.position += (name_span + pad_len(name_span, ENTRY_ALIGNMENT)) as u64;

        if header.is_trailer() {
            return Ok(None);
        }
        Ok(Some(header))
    }

    /// Read the payload of the current entry and its padding.
    fn read_data(&mut self, size: u32) -> Result<Vec<u8>> {
        let data = read_sized(&mut self.reader, size, "member data")?;

        let padding = pad_len(size as usize, ENTRY_ALIGNMENT);
        let mut pad = [0u8; ENTRY_ALIGNMENT];
        self.reader.read_exact(&mut pad[..padding])?;

        self.position += (size as usize + padding) as u64;
        Ok(data)
    }

    /// Read the next member with its content.
    fn next_member(&mut self) -> Result<Option<ArchiveMember>> {
        let Some(header) = self.next_header()? else {
            return Ok(None);
        };

        let path = sanitize_path(&header.name)?;
        let data = self.read_data(header.filesize)?;
        let content = match header.node_type() {
            NodeType::File => MemberContent::File(data),
            NodeType::Directory => MemberContent::Directory,
            NodeType::Symlink => MemberContent::Symlink(
                String::from_utf8(data)
                    .map_err(|e| RamdiskError::InvalidCpio(format!("Invalid symlink target: {}", e)))?,
            ),
            NodeType::Other => MemberContent::Other,
        };

        Ok(Some(ArchiveMember {
            path,
            mode: header.permissions(),
            content,
        }))
    }

    /// Read every member into memory.
    pub fn members(&mut self) -> Result<Vec<ArchiveMember>> {
        let mut members = Vec::new();
        while let Some(member) = self.next_member()? {
            members.push(member);
        }
        Ok(members)
    }

    /// Extract all members under `root/directory` and return the manifest.
    ///
    /// File sources in the manifest are recorded as `directory/<path>`,
    /// relative to `root`. Symlinks are not created on disk; their target
    /// lives in the manifest only. Devices, fifos and sockets are skipped and
    /// leave no manifest line. The returned manifest carries the default
    /// compression level; callers that know the framing overwrite it.
    #[cfg(feature = "extract")]
    pub fn extract_into<P: AsRef<Path>>(&mut self, root: P, directory: &str) -> Result<ArchiveManifest> {
        let dest = root.as_ref().join(directory);
        std::fs::create_dir_all(&dest)?;

        let mut manifest = ArchiveManifest::new();
        while let Some(member) = self.next_member()? {
            let full_path = dest.join(&member.path);
            let entry = match member.content {
                MemberContent::Directory => {
                    std::fs::create_dir_all(&full_path)?;
                    ArchiveEntry::directory(member.path, member.mode)
                }
                MemberContent::File(data) => {
                    if let Some(parent) = full_path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&full_path, &data)?;
                    let source = format!("{}/{}", directory, member.path);
                    ArchiveEntry::file(member.path, source, member.mode)
                }
                MemberContent::Symlink(target) => ArchiveEntry::symlink(member.path, target, member.mode),
                MemberContent::Other => {
                    debug!("skipping special member {}", member.path);
                    continue;
                }
            };
            debug!("extracted {}", entry);
            manifest.entries.push(entry);
        }

        Ok(manifest)
    }
}

/// Normalize a member name: strip leading `/`, drop `.` components, and
/// reject anything that would escape the extraction root.
fn sanitize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_start_matches('/');

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(RamdiskError::InvalidPath(format!(
                    "Path traversal detected: {}",
                    path
                )));
            }
            _ => {
                return Err(RamdiskError::InvalidPath(format!(
                    "Invalid path component: {}",
                    path
                )));
            }
        }
    }

    if parts.is_empty() {
        return Ok(".".to_string());
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ArchiveBuilder;
    use std::io::Cursor;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("normal/path/file.txt").unwrap(), "normal/path/file.txt");
        assert_eq!(sanitize_path("/absolute/path").unwrap(), "absolute/path");
        assert_eq!(sanitize_path("./sbin//adbd").unwrap(), "sbin/adbd");
        assert_eq!(sanitize_path(".").unwrap(), ".");
        assert!(sanitize_path("../traversal").is_err());
        assert!(sanitize_path("path/../traversal").is_err());
    }

    #[test]
    fn test_members() {
        let mut builder = ArchiveBuilder::new();
        builder.add_directory("sbin", 0o750);
        builder.add_file("sbin/adbd", b"\x7fELF", 0o750);
        builder.add_symlink("init", "/sbin/init", 0o777);
        let data = builder.finish();

        let mut reader = ArchiveReader::new(Cursor::new(&data));
        let members = reader.members().unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].content, MemberContent::Directory);
        assert_eq!(members[1].content, MemberContent::File(b"\x7fELF".to_vec()));
        assert_eq!(members[2].content, MemberContent::Symlink("/sbin/init".to_string()));
        // Trailer and its 512 padding are left unread
        assert!(reader.position() <= data.len() as u64);
    }

    #[test]
    fn test_missing_trailer() {
        let mut builder = ArchiveBuilder::new();
        builder.add_directory("sbin", 0o750);
        let data = builder.finish();
        // Cut right after the first entry (110 + "sbin\0" padded = 116)
        let mut reader = ArchiveReader::new(Cursor::new(&data[..116]));
        assert!(matches!(reader.members(), Err(RamdiskError::InvalidCpio(_))));
    }

    #[test]
    fn test_oversized_member_is_truncated_error() {
        let mut builder = ArchiveBuilder::new();
        builder.add_file("init", b"init", 0o750);
        let mut data = builder.finish();
        // filesize field of the first header
        data[54..62].copy_from_slice(b"ffffffff");

        let mut reader = ArchiveReader::new(Cursor::new(&data));
        let err = reader.members().unwrap_err();
        assert!(matches!(err, RamdiskError::InvalidCpio(ref m) if m.starts_with("truncated member data")));
    }

    #[cfg(feature = "extract")]
    #[test]
    fn test_extract_into() {
        let temp = tempfile::tempdir().unwrap();

        let mut builder = ArchiveBuilder::new();
        builder.add_directory("res", 0o755);
        builder.add_directory("res", 0o700);
        builder.add_file("res/images/charger.png", b"png", 0o644);
        builder.add_symlink("sdcard", "/storage/self/primary", 0o777);
        let data = builder.finish();

        let mut reader = ArchiveReader::new(Cursor::new(&data));
        let manifest = reader.extract_into(temp.path(), "initrd").unwrap();

        let written = std::fs::read(temp.path().join("initrd/res/images/charger.png")).unwrap();
        assert_eq!(written, b"png");
        assert!(!temp.path().join("initrd/sdcard").exists());

        let lines: Vec<String> = manifest.entries.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "dir res 0o755",
                "file res/images/charger.png initrd/res/images/charger.png 0o644",
                "slink sdcard /storage/self/primary 0o777",
            ]
        );
    }
}
