//! Binary format definitions for boot images
//!
//! A boot image has the following structure:
//! 1. Header (608 bytes), zero padded to `page_size`
//! 2. Kernel, zero padded to the padding unit
//! 3. Ramdisk, zero padded to the padding unit
//! 4. Second stage loader (optional), zero padded to the padding unit
//! 5. Device tree image (optional), zero padded to the padding unit
//!
//! The padding unit is usually `page_size`, but some vendors pad components
//! to a different unit; it is not stored in the header.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::checksum::ID_SIZE;
use crate::error::{BootImageError, Result};

/// Boot image magic "ANDROID!"
pub const BOOT_MAGIC: &[u8; 8] = b"ANDROID!";

/// Header size in bytes
pub const HEADER_SIZE: usize = 608;

/// Board name field width
pub const BOARD_NAME_SIZE: usize = 16;

/// Kernel command line field width
pub const CMDLINE_SIZE: usize = 512;

/// Kernel load address relative to base
pub const KERNEL_OFFSET: u32 = 0x0000_8000;
/// Conventional ramdisk address relative to base
pub const RAMDISK_OFFSET: u32 = 0x0100_0000;
/// Conventional second stage address relative to base
pub const SECOND_OFFSET: u32 = 0x00F0_0000;
/// Conventional kernel tags address relative to base
pub const TAGS_OFFSET: u32 = 0x0000_0100;

/// Base address used when none is given
pub const DEFAULT_BASE: u32 = 0x1000_0000;

/// Page size used when none is given
pub const DEFAULT_PAGE_SIZE: u32 = 0x800;

/// Padding unit used when none is given
pub const DEFAULT_PADDING_UNIT: u32 = 0x800;

/// Command line used when none is given
pub const DEFAULT_CMDLINE: &str = "mem=211M console=null androidboot.hardware=qcom";

/// Payload components, in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Kernel,
    Ramdisk,
    Second,
    DeviceTree,
}

impl Component {
    /// All components in on-disk order
    pub const ALL: [Component; 4] = [
        Component::Kernel,
        Component::Ramdisk,
        Component::Second,
        Component::DeviceTree,
    ];

    /// Artifact base name used when unpacking
    pub fn name(self) -> &'static str {
        match self {
            Component::Kernel => "kernel",
            Component::Ramdisk => "ramdisk",
            Component::Second => "second",
            Component::DeviceTree => "dt_image",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A load address that does not follow the base-relative convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWarning {
    /// Header field name
    pub field: &'static str,
    pub expected: u32,
    pub actual: u32,
}

impl fmt::Display for AddressWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found nonstandard {}: {:#x} (expected {:#x})",
            self.field, self.actual, self.expected
        )
    }
}

/// Copy `value` into a NUL padded fixed-width field, truncating if needed
pub fn fixed_field<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let bytes = value.as_bytes();
    let len = bytes.len().min(N);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Text of a NUL padded field, up to the first NUL
pub fn field_text(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Boot image header (608 bytes, little-endian)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImageHeader {
    /// Magic bytes "ANDROID!"
    pub magic: [u8; 8],
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    /// Physical address for kernel tags
    pub tags_addr: u32,
    /// Flash page size; the header is padded to this
    pub page_size: u32,
    /// Device tree image size, 0 if absent
    pub dt_size: u32,
    /// Room for future expansion. This should always be set to 0.
    pub reserved: u32,
    /// Board name, NUL padded
    pub name: [u8; BOARD_NAME_SIZE],
    /// Kernel command line, NUL padded
    pub cmdline: [u8; CMDLINE_SIZE],
    /// SHA-1 image id, zero padded
    pub id: [u8; ID_SIZE],
}

impl BootImageHeader {
    /// Read a header from the current position
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != BOOT_MAGIC {
            return Err(BootImageError::InvalidMagic(magic));
        }

        let kernel_size = reader.read_u32::<LittleEndian>()?;
        let kernel_addr = reader.read_u32::<LittleEndian>()?;
        let ramdisk_size = reader.read_u32::<LittleEndian>()?;
        let ramdisk_addr = reader.read_u32::<LittleEndian>()?;
        let second_size = reader.read_u32::<LittleEndian>()?;
        let second_addr = reader.read_u32::<LittleEndian>()?;
        let tags_addr = reader.read_u32::<LittleEndian>()?;
        let page_size = reader.read_u32::<LittleEndian>()?;
        let dt_size = reader.read_u32::<LittleEndian>()?;
        let reserved = reader.read_u32::<LittleEndian>()?;

        let mut name = [0u8; BOARD_NAME_SIZE];
        reader.read_exact(&mut name)?;

        let mut cmdline = [0u8; CMDLINE_SIZE];
        reader.read_exact(&mut cmdline)?;

        let mut id = [0u8; ID_SIZE];
        reader.read_exact(&mut id)?;

        Ok(BootImageHeader {
            magic,
            kernel_size,
            kernel_addr,
            ramdisk_size,
            ramdisk_addr,
            second_size,
            second_addr,
            tags_addr,
            page_size,
            dt_size,
            reserved,
            name,
            cmdline,
            id,
        })
    }

    /// Write the 608 header bytes (no page padding)
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.kernel_size)?;
        writer.write_u32::<LittleEndian>(self.kernel_addr)?;
        writer.write_u32::<LittleEndian>(self.ramdisk_size)?;
        writer.write_u32::<LittleEndian>(self.ramdisk_addr)?;
        writer.write_u32::<LittleEndian>(self.second_size)?;
        writer.write_u32::<LittleEndian>(self.second_addr)?;
        writer.write_u32::<LittleEndian>(self.tags_addr)?;
        writer.write_u32::<LittleEndian>(self.page_size)?;
        writer.write_u32::<LittleEndian>(self.dt_size)?;
        writer.write_u32::<LittleEndian>(self.reserved)?;
        writer.write_all(&self.name)?;
        writer.write_all(&self.cmdline)?;
        writer.write_all(&self.id)?;
        Ok(())
    }

    /// Base address, derived from the kernel load address
    pub fn base(&self) -> u32 {
        self.kernel_addr.wrapping_sub(KERNEL_OFFSET)
    }

    /// Board name without NUL padding
    pub fn board_name(&self) -> String {
        field_text(&self.name)
    }

    /// Kernel command line without NUL padding
    pub fn cmdline_text(&self) -> String {
        field_text(&self.cmdline)
    }

    /// Declared size of a component
    pub fn size_of(&self, component: Component) -> u32 {
        match component {
            Component::Kernel => self.kernel_size,
            Component::Ramdisk => self.ramdisk_size,
            Component::Second => self.second_size,
            Component::DeviceTree => self.dt_size,
        }
    }

    /// Addresses that deviate from `base + offset`
    pub fn address_warnings(&self) -> Vec<AddressWarning> {
        let base = self.base();
        [
            ("ramdisk_addr", RAMDISK_OFFSET, self.ramdisk_addr),
            ("second_addr", SECOND_OFFSET, self.second_addr),
            ("tags_addr", TAGS_OFFSET, self.tags_addr),
        ]
        .into_iter()
        .filter_map(|(field, offset, actual)| {
            let expected = base.wrapping_add(offset);
            (expected != actual).then_some(AddressWarning {
                field,
                expected,
                actual,
            })
        })
        .collect()
    }
}
