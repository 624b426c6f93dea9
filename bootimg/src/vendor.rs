//! Vendor preamble
//!
//! Some vendor toolchains prepend a 512-byte block to boot images and
//! ramdisks:
//!
//! ```text
//! offset  size  field
//! 0x000   4     magic 0x58881688 (LE)
//! 0x004   4     payload size = file size - 512 (LE)
//! 0x008   32    name, NUL padded
//! 0x028   472   0xFF filler
//! ```
//!
//! Detection records the mode and name so the preamble can be rebuilt on
//! repack; nothing else from the block is kept.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{info, warn};

use crate::error::{BootImageError, Result};
use crate::format::{field_text, fixed_field};
use crate::sidecar;

/// Preamble magic
pub const VENDOR_MAGIC: u32 = 0x5888_1688;

/// Preamble size; payload starts here
pub const PREAMBLE_SIZE: usize = 512;

/// Name field width
pub const VENDOR_NAME_SIZE: usize = 32;

/// Filler byte after the name
pub const FILLER: u8 = 0xFF;

/// The only mode tag that produces a preamble
pub const VENDOR_MODE: &str = "vendor";

/// Sidecar key for the mode tag
pub const MODE_KEY: &str = "mode";

/// Sidecar key for the preamble name
pub const NAME_KEY: &str = "vendor_name";

/// A detected (or requested) vendor preamble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorHeaderInfo {
    /// Mode tag; only [`VENDOR_MODE`] can be injected
    pub mode: String,
    /// Embedded name without NUL padding
    pub name: String,
}

impl VendorHeaderInfo {
    /// A vendor preamble with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            mode: VENDOR_MODE.to_string(),
            name: name.into(),
        }
    }

    /// Offset at which real content resumes
    pub fn content_offset(&self) -> u64 {
        PREAMBLE_SIZE as u64
    }

    /// Check for a preamble at the current position.
    ///
    /// Without one the stream is rewound to where it was and `None` is
    /// returned. With one the stream is left just past the 512-byte block.
    pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<Option<Self>> {
        let start = reader.stream_position()?;

        let magic = match reader.read_u32::<LittleEndian>() {
            Ok(magic) => magic,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                reader.seek(SeekFrom::Start(start))?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if magic != VENDOR_MAGIC {
            reader.seek(SeekFrom::Start(start))?;
            return Ok(None);
        }

        let declared = reader.read_u32::<LittleEndian>()?;
        let end = reader.seek(SeekFrom::End(0))?;
        let actual = end.saturating_sub(start + PREAMBLE_SIZE as u64);
        if declared as u64 != actual || end < start + PREAMBLE_SIZE as u64 {
            return Err(BootImageError::VendorSizeMismatch { declared, actual });
        }

        reader.seek(SeekFrom::Start(start + 8))?;
        let mut name = [0u8; VENDOR_NAME_SIZE];
        reader.read_exact(&mut name)?;
        reader.seek(SeekFrom::Start(start + PREAMBLE_SIZE as u64))?;

        let info = Self::new(field_text(&name));
        info!("found vendor preamble, name {:?}", info.name);
        Ok(Some(info))
    }

    /// Whether this mode produces a preamble
    pub fn is_supported(&self) -> bool {
        self.mode == VENDOR_MODE
    }

    /// Build the preamble for a payload of `payload_len` bytes.
    ///
    /// Returns `None` (and logs) for an unsupported mode; the caller then
    /// writes the payload without a preamble.
    pub fn inject(&self, payload_len: u64) -> Option<[u8; PREAMBLE_SIZE]> {
        if !self.is_supported() {
            warn!("unsupported vendor preamble mode {:?}, writing none", self.mode);
            return None;
        }

        let mut block = [FILLER; PREAMBLE_SIZE];
        LittleEndian::write_u32(&mut block[0..4], VENDOR_MAGIC);
        LittleEndian::write_u32(&mut block[4..8], payload_len as u32);
        block[8..8 + VENDOR_NAME_SIZE].copy_from_slice(&fixed_field::<VENDOR_NAME_SIZE>(&self.name));
        Some(block)
    }

    /// `key:value` lines recording this preamble
    pub fn to_sidecar(&self) -> String {
        format!("{}:{}\n{}:{}\n", MODE_KEY, self.mode, NAME_KEY, self.name)
    }

    /// Read mode and name from sidecar text; first occurrence of each wins.
    ///
    /// `None` when no mode line is present.
    pub fn from_sidecar(text: &str) -> Option<Self> {
        let mut mode = None;
        let mut name = None;
        for line in sidecar::lines(text) {
            match line.key {
                MODE_KEY if mode.is_none() => mode = Some(line.value.trim().to_string()),
                NAME_KEY if name.is_none() => name = Some(line.value.trim().to_string()),
                _ => {}
            }
        }
        Some(Self {
            mode: mode?,
            name: name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn with_preamble(name: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&VENDOR_MAGIC.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        let mut field = [0u8; VENDOR_NAME_SIZE];
        field[..name.len()].copy_from_slice(name);
        data.extend_from_slice(&field);
        data.extend_from_slice(&[FILLER; 472]);
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_detect_present() {
        let data = with_preamble(b"RECOVERY", b"ANDROID!rest");
        let mut cursor = Cursor::new(&data);
        let info = VendorHeaderInfo::detect(&mut cursor).unwrap().unwrap();
        assert_eq!(info.mode, VENDOR_MODE);
        assert_eq!(info.name, "RECOVERY");
        assert_eq!(cursor.position(), 512);
        assert_eq!(info.content_offset(), 512);
    }

    #[test]
    fn test_detect_absent_leaves_position() {
        let data = b"070701whatever".to_vec();
        let mut cursor = Cursor::new(&data);
        assert!(VendorHeaderInfo::detect(&mut cursor).unwrap().is_none());
        assert_eq!(cursor.position(), 0);

        let mut short = Cursor::new(vec![0x88u8, 0x16]);
        assert!(VendorHeaderInfo::detect(&mut short).unwrap().is_none());
        assert_eq!(short.position(), 0);
    }

    #[test]
    fn test_detect_size_mismatch() {
        let mut data = with_preamble(b"ROOTFS", b"payload");
        data.push(0);
        assert!(matches!(
            VendorHeaderInfo::detect(&mut Cursor::new(&data)),
            Err(BootImageError::VendorSizeMismatch { declared: 7, actual: 8 })
        ));
    }

    #[test]
    fn test_inject_reproduces_preamble() {
        let data = with_preamble(b"ROOTFS", b"some payload");
        let info = VendorHeaderInfo::detect(&mut Cursor::new(&data)).unwrap().unwrap();
        let block = info.inject(12).unwrap();
        assert_eq!(&block[..], &data[..PREAMBLE_SIZE]);
    }

    #[test]
    fn test_inject_truncates_name() {
        let info = VendorHeaderInfo::new("N".repeat(40));
        let block = info.inject(0).unwrap();
        assert_eq!(&block[8..40], "N".repeat(32).as_bytes());
        assert_eq!(block[40], FILLER);
    }

    #[test]
    fn test_unsupported_mode_declines() {
        let info = VendorHeaderInfo {
            mode: "other".to_string(),
            name: "X".to_string(),
        };
        assert!(info.inject(10).is_none());
    }

    #[test]
    fn test_sidecar_first_wins() {
        let text = "mode:vendor\nvendor_name: ROOTFS \nmode:other\nvendor_name:LATER\n";
        let info = VendorHeaderInfo::from_sidecar(text).unwrap();
        assert_eq!(info, VendorHeaderInfo::new("ROOTFS"));
        assert_eq!(VendorHeaderInfo::from_sidecar(&info.to_sidecar()), Some(info));
        assert!(VendorHeaderInfo::from_sidecar("base:0x10000000\n").is_none());
    }
}
