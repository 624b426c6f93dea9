//! newc archive format definitions and constants.
//!
//! # Entry Layout
//!
//! An Android ramdisk is a sequence of SVR4 "newc" entries terminated by an
//! entry named `TRAILER!!!`:
//!
//! ```text
//! +-------------------------------+
//! | "070701" + 13 x 8 hex chars   |  110 bytes
//! +-------------------------------+
//! | name + NUL, padded to 4       |
//! +-------------------------------+
//! | payload, padded to 4          |
//! +-------------------------------+
//! | ... next entry ...            |
//! +-------------------------------+
//! | TRAILER!!! entry              |
//! +-------------------------------+
//! | zero fill to 512              |
//! +-------------------------------+
//! ```
//!
//! Hex fields in order: ino, mode, uid, gid, nlink, mtime, filesize,
//! devmajor, devminor, rdevmajor, rdevminor, namesize, check.
//!
//! Symbolic links store their target as the payload.

use std::io::{Read, Write};

use crate::error::{RamdiskError, Result};

/// newc magic (ASCII, SVR4 with no CRC)
pub const NEWC_MAGIC: &[u8; 6] = b"070701";

/// Size of the fixed newc header, magic included.
pub const HEADER_SIZE: usize = 110;

/// Name of the terminal entry.
pub const TRAILER_NAME: &str = "TRAILER!!!";

/// First inode number handed out when packing.
pub const INODE_BASE: u32 = 300_000;

/// Alignment of header+name and of payloads.
pub const ENTRY_ALIGNMENT: usize = 4;

/// Alignment of the whole stream after the trailer.
pub const ARCHIVE_ALIGNMENT: usize = 512;

/// File type mask.
pub const S_IFMT: u32 = 0o170000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;

/// Permission bits kept from a mode.
pub const PERMISSION_MASK: u32 = 0o7777;

/// Number of zero bytes needed to round `len` up to `unit` (a power of two).
pub fn pad_len(len: usize, unit: usize) -> usize {
    len.wrapping_neg() & (unit - 1)
}

/// Read exactly `len` bytes of `what`, growing the buffer only as data
/// arrives so a bogus header size cannot force a large allocation.
pub fn read_sized<R: Read>(reader: &mut R, len: u32, what: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len as usize {
        return Err(RamdiskError::InvalidCpio(format!(
            "truncated {}: expected {} bytes, got {}",
            what,
            len,
            data.len()
        )));
    }
    Ok(data)
}

/// Kind of archive member, as encoded in the mode's type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    Symlink,
    /// Devices, fifos, sockets; skipped on extract
    Other,
}

/// A newc entry header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewcHeader {
    /// Inode number
    pub ino: u32,
    /// File mode (type + permissions)
    pub mode: u32,
    /// User ID
    pub uid: u32,
    /// Group ID
    pub gid: u32,
    /// Number of hard links
    pub nlink: u32,
    /// Modification time
    pub mtime: u32,
    /// Payload size
    pub filesize: u32,
    pub devmajor: u32,
    pub devminor: u32,
    pub rdevmajor: u32,
    pub rdevminor: u32,
    /// Length of the name including its NUL terminator
    pub namesize: u32,
    /// Checksum (always zero in newc)
    pub check: u32,
    /// Member name
    pub name: String,
}

impl NewcHeader {
    /// Header for a packed entry: ownership, timestamps, devices and
    /// checksum are zero and nlink is always 1.
    pub fn packed(ino: u32, name: &str, mode: u32, filesize: u32) -> Self {
        Self {
            ino,
            mode,
            uid: 0,
            gid: 0,
            nlink: 1,
            mtime: 0,
            filesize,
            devmajor: 0,
            devminor: 0,
            rdevmajor: 0,
            rdevminor: 0,
            namesize: name.len() as u32 + 1,
            check: 0,
            name: name.to_string(),
        }
    }

    /// Classify the entry by its type bits.
    pub fn node_type(&self) -> NodeType {
        match self.mode & S_IFMT {
            S_IFREG => NodeType::File,
            S_IFDIR => NodeType::Directory,
            S_IFLNK => NodeType::Symlink,
            _ => NodeType::Other,
        }
    }

    /// Check if this is the trailer entry.
    pub fn is_trailer(&self) -> bool {
        self.name == TRAILER_NAME
    }

    /// Get the permission bits.
    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    /// Read a header, its name and the name padding.
    ///
    /// Returns `None` on a clean end of stream before the magic.
    pub fn read<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut buf = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut buf[..NEWC_MAGIC.len()]) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        if &buf[..NEWC_MAGIC.len()] != NEWC_MAGIC {
            return Err(RamdiskError::InvalidCpio(format!(
                "bad entry magic {:?}",
                String::from_utf8_lossy(&buf[..NEWC_MAGIC.len()])
            )));
        }
        reader.read_exact(&mut buf[NEWC_MAGIC.len()..])?;

        let field = |index: usize| -> Result<u32> {
            let start = NEWC_MAGIC.len() + index * 8;
            let s = std::str::from_utf8(&buf[start..start + 8])
                .map_err(|e| RamdiskError::InvalidCpio(format!("Invalid UTF-8 in header: {}", e)))?;
            u32::from_str_radix(s, 16)
                .map_err(|e| RamdiskError::InvalidCpio(format!("Invalid hex value '{}': {}", s, e)))
        };

        let namesize = field(11)?;
        if namesize == 0 {
            return Err(RamdiskError::InvalidCpio("zero-length entry name".to_string()));
        }

        let mut name_buf = read_sized(reader, namesize, "entry name")?;
        if name_buf.last() == Some(&0) {
            name_buf.pop();
        }
        let name = String::from_utf8(name_buf)
            .map_err(|e| RamdiskError::InvalidCpio(format!("Invalid filename: {}", e)))?;

        let padding = pad_len(HEADER_SIZE + namesize as usize, ENTRY_ALIGNMENT);
        let mut pad = [0u8; ENTRY_ALIGNMENT];
        reader.read_exact(&mut pad[..padding])?;

        Ok(Some(Self {
            ino: field(0)?,
            mode: field(1)?,
            uid: field(2)?,
            gid: field(3)?,
            nlink: field(4)?,
            mtime: field(5)?,
            filesize: field(6)?,
            devmajor: field(7)?,
            devminor: field(8)?,
            rdevmajor: field(9)?,
            rdevminor: field(10)?,
            namesize,
            check: field(12)?,
            name,
        }))
    }

    /// Append the header, NUL-terminated name and name padding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(NEWC_MAGIC);
        for value in [
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.nlink,
            self.mtime,
            self.filesize,
            self.devmajor,
            self.devminor,
            self.rdevmajor,
            self.rdevminor,
            self.namesize,
            self.check,
        ] {
            out.extend_from_slice(format!("{:08x}", value).as_bytes());
        }
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);

        let padding = pad_len(HEADER_SIZE + self.namesize as usize, ENTRY_ALIGNMENT);
        out.extend_from_slice(&[0u8; ENTRY_ALIGNMENT][..padding]);
    }

    /// Write the header, NUL-terminated name and name padding.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.namesize as usize + ENTRY_ALIGNMENT);
        self.encode_into(&mut buf);
        writer.write_all(&buf)?;
        Ok(())
    }
}
