//! Boot image writer implementation
//!
//! Assembles header, checksum and padded components. The header region is
//! padded to `page_size`; every component is padded to the padding unit.
//! The two units are independent.

use std::io::{Read, Write};

use log::{debug, warn};

use crate::align::{check_unit, padding_len};
use crate::bootinfo::BootInfoManifest;
use crate::checksum::{id_field, image_digest};
use crate::error::{BootImageError, Result};
use crate::format::{
    fixed_field, BootImageHeader, BOARD_NAME_SIZE, BOOT_MAGIC, CMDLINE_SIZE, DEFAULT_BASE,
    DEFAULT_CMDLINE, DEFAULT_PADDING_UNIT, DEFAULT_PAGE_SIZE, HEADER_SIZE, KERNEL_OFFSET,
    RAMDISK_OFFSET, SECOND_OFFSET, TAGS_OFFSET,
};

/// Load addresses of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    pub base: u32,
    pub ramdisk_addr: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
}

impl Addressing {
    /// Conventional addresses for `base`
    pub fn from_base(base: u32) -> Self {
        Addressing {
            base,
            ramdisk_addr: base.wrapping_add(RAMDISK_OFFSET),
            second_addr: base.wrapping_add(SECOND_OFFSET),
            tags_addr: base.wrapping_add(TAGS_OFFSET),
        }
    }

    /// Kernel load address, always `base + 0x8000`
    pub fn kernel_addr(&self) -> u32 {
        self.base.wrapping_add(KERNEL_OFFSET)
    }
}

impl Default for Addressing {
    fn default() -> Self {
        Addressing::from_base(DEFAULT_BASE)
    }
}

/// Builder for boot images
///
/// # Example
///
/// ```
/// use bootimg::BootImageBuilder;
///
/// let image = BootImageBuilder::new(vec![0x55; 100])
///     .ramdisk(b"070701".to_vec())
///     .board_name("msm8960")
///     .build()
///     .unwrap();
/// assert_eq!(&image[..8], b"ANDROID!");
/// assert_eq!(image.len(), 0x800 * 3);
/// ```
#[derive(Debug, Clone)]
pub struct BootImageBuilder {
    kernel: Vec<u8>,
    ramdisk: Vec<u8>,
    second: Option<Vec<u8>>,
    device_tree: Option<Vec<u8>>,
    addressing: Addressing,
    board_name: String,
    cmdline: String,
    page_size: u32,
    padding_unit: u32,
}

impl BootImageBuilder {
    /// Create a builder for `kernel` with default addressing and sizes
    pub fn new(kernel: Vec<u8>) -> Self {
        BootImageBuilder {
            kernel,
            ramdisk: Vec::new(),
            second: None,
            device_tree: None,
            addressing: Addressing::default(),
            board_name: String::new(),
            cmdline: DEFAULT_CMDLINE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            padding_unit: DEFAULT_PADDING_UNIT,
        }
    }

    /// Builder seeded from a bootinfo manifest.
    ///
    /// Unset fields fall back to the defaults, and addresses to the
    /// convention for the (possibly defaulted) base.
    pub fn from_boot_info(kernel: Vec<u8>, info: &BootInfoManifest) -> Self {
        fn or_default<T: std::fmt::Debug>(value: Option<T>, field: &str, default: T) -> T {
            value.unwrap_or_else(|| {
                warn!("{} is not set, using default {:?}", field, default);
                default
            })
        }

        let base = or_default(info.base, "base", DEFAULT_BASE);
        let conventional = Addressing::from_base(base);
        let addressing = Addressing {
            base,
            ramdisk_addr: or_default(info.ramdisk_addr, "ramdisk_addr", conventional.ramdisk_addr),
            second_addr: or_default(info.second_addr, "second_addr", conventional.second_addr),
            tags_addr: or_default(info.tags_addr, "tags_addr", conventional.tags_addr),
        };

        BootImageBuilder::new(kernel)
            .addressing(addressing)
            .board_name(info.name.clone().unwrap_or_default())
            .cmdline(info.cmdline.clone().unwrap_or_else(|| DEFAULT_CMDLINE.to_string()))
            .page_size(or_default(info.page_size, "page_size", DEFAULT_PAGE_SIZE))
            .padding_unit(or_default(info.padding_unit, "padding_size", DEFAULT_PADDING_UNIT))
    }

    /// Set the ramdisk bytes
    pub fn ramdisk(mut self, ramdisk: Vec<u8>) -> Self {
        self.ramdisk = ramdisk;
        self
    }

    /// Set the second stage loader
    pub fn second(mut self, second: Vec<u8>) -> Self {
        self.second = Some(second);
        self
    }

    /// Set the device tree image
    pub fn device_tree(mut self, dt: Vec<u8>) -> Self {
        self.device_tree = Some(dt);
        self
    }

    /// Set all load addresses
    pub fn addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    /// Set the board name (max 16 bytes)
    pub fn board_name(mut self, name: impl Into<String>) -> Self {
        self.board_name = name.into();
        self
    }

    /// Set the kernel command line (max 512 bytes)
    pub fn cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = cmdline.into();
        self
    }

    /// Set the page size used for the header region
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the unit each component is padded to
    pub fn padding_unit(mut self, unit: u32) -> Self {
        self.padding_unit = unit;
        self
    }

    /// Build and validate the header, computing the image id
    pub fn header(&self) -> Result<BootImageHeader> {
        if self.board_name.len() > BOARD_NAME_SIZE {
            return Err(BootImageError::BoardNameTooLong(self.board_name.len()));
        }
        if self.cmdline.len() > CMDLINE_SIZE {
            return Err(BootImageError::CmdlineTooLong(self.cmdline.len()));
        }
        check_unit(self.page_size)?;
        check_unit(self.padding_unit)?;
        if (self.page_size as usize) < HEADER_SIZE {
            return Err(BootImageError::PageSizeTooSmall(self.page_size));
        }

        let digest = image_digest(
            &self.kernel,
            &self.ramdisk,
            self.second.as_deref(),
            self.device_tree.as_deref(),
        );

        Ok(BootImageHeader {
            magic: *BOOT_MAGIC,
            kernel_size: self.kernel.len() as u32,
            kernel_addr: self.addressing.kernel_addr(),
            ramdisk_size: self.ramdisk.len() as u32,
            ramdisk_addr: self.addressing.ramdisk_addr,
            second_size: self.second.as_ref().map_or(0, |s| s.len() as u32),
            second_addr: self.addressing.second_addr,
            tags_addr: self.addressing.tags_addr,
            page_size: self.page_size,
            dt_size: self.device_tree.as_ref().map_or(0, |d| d.len() as u32),
            reserved: 0,
            name: fixed_field(&self.board_name),
            cmdline: fixed_field(&self.cmdline),
            id: id_field(&digest),
        })
    }

    /// Write the image, returning the number of bytes written
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let header = self.header()?;
        header.write(writer)?;
        let header_pad = padding_len(HEADER_SIZE as u64, self.page_size);
        write_zeros(writer, header_pad)?;
        let mut written = HEADER_SIZE as u64 + header_pad;

        let components = [
            Some(&self.kernel),
            Some(&self.ramdisk),
            self.second.as_ref(),
            self.device_tree.as_ref(),
        ];
        for data in components.into_iter().flatten() {
            writer.write_all(data)?;
            let pad = padding_len(data.len() as u64, self.padding_unit);
            write_zeros(writer, pad)?;
            written += data.len() as u64 + pad;
        }

        debug!("wrote boot image of {} bytes", written);
        Ok(written)
    }

    /// Build the image in memory
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

fn write_zeros<W: Write>(writer: &mut W, count: u64) -> Result<()> {
    std::io::copy(&mut std::io::repeat(0).take(count), writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::DIGEST_SIZE;
    use crate::format::Component;

    #[test]
    fn test_layout_with_distinct_units() {
        let image = BootImageBuilder::new(vec![1; 10])
            .ramdisk(vec![2; 20])
            .second(vec![3; 30])
            .page_size(0x800)
            .padding_unit(0x1000)
            .build()
            .unwrap();

        // header padded by page size, components by the padding unit
        assert_eq!(image.len(), 0x800 + 3 * 0x1000);
        assert_eq!(image[0x800], 1);
        assert_eq!(image[0x800 + 0x1000], 2);
        assert_eq!(image[0x800 + 0x2000], 3);
        assert!(image[0x800 + 10..0x800 + 0x1000].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_fields() {
        let builder = BootImageBuilder::new(vec![1; 10])
            .addressing(Addressing::from_base(0x8000_0000))
            .device_tree(vec![4; 4]);
        let header = builder.header().unwrap();
        assert_eq!(header.kernel_addr, 0x8000_8000);
        assert_eq!(header.ramdisk_addr, 0x8100_0000);
        assert_eq!(header.second_addr, 0x80F0_0000);
        assert_eq!(header.tags_addr, 0x8000_0100);
        assert_eq!(header.size_of(Component::DeviceTree), 4);
        assert_eq!(header.second_size, 0);
        assert_eq!(header.reserved, 0);
        assert_eq!(header.cmdline_text(), DEFAULT_CMDLINE);
        assert!(header.id[DIGEST_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_name_limits() {
        let ok = BootImageBuilder::new(vec![]).board_name("0123456789abcdef");
        assert!(ok.header().is_ok());

        let long = BootImageBuilder::new(vec![]).board_name("0123456789abcdefg");
        assert!(matches!(long.header(), Err(BootImageError::BoardNameTooLong(17))));

        let cmdline = "x".repeat(513);
        let long = BootImageBuilder::new(vec![]).cmdline(cmdline);
        assert!(matches!(long.header(), Err(BootImageError::CmdlineTooLong(513))));
    }

    #[test]
    fn test_bad_units() {
        let b = BootImageBuilder::new(vec![]).padding_unit(0x900);
        assert!(matches!(b.build(), Err(BootImageError::InvalidAlignment(0x900))));
        let b = BootImageBuilder::new(vec![]).page_size(0x100);
        assert!(matches!(b.build(), Err(BootImageError::PageSizeTooSmall(0x100))));
    }

    #[test]
    fn test_from_boot_info_defaults() {
        let info = BootInfoManifest {
            base: Some(0x0020_0000),
            tags_addr: Some(0x0020_0200),
            ..Default::default()
        };
        let header = BootImageBuilder::from_boot_info(vec![1], &info).header().unwrap();
        assert_eq!(header.kernel_addr, 0x0020_8000);
        assert_eq!(header.ramdisk_addr, 0x0120_0000);
        assert_eq!(header.tags_addr, 0x0020_0200);
        assert_eq!(header.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(header.cmdline_text(), DEFAULT_CMDLINE);
    }
}
