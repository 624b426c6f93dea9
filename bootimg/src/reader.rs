//! Boot image parsing
//!
//! Components start at `page_size`. The padding unit between components is
//! not stored in the header, so it is inferred: starting at `page_size`,
//! whole `page_size` blocks are skipped while they are all zero, and the
//! distance from `page_size` to the first non-zero block gives the unit
//! (reduced to its largest power-of-two divisor). If the first block is
//! already non-zero, or every block up to the end is zero, the unit is
//! `page_size`.
//!
//! This inferred value can differ from the unit an image was written with
//! (for example a kernel whose first page is non-zero written with a unit
//! larger than `page_size`); it is reported as detected, not verified.

use std::io::{Cursor, Write};

use log::{debug, info, warn};

use crate::align::{largest_pow2_divisor, padding_len};
use crate::bootinfo::BootInfoManifest;
use crate::error::{BootImageError, Result};
use crate::format::{AddressWarning, BootImageHeader, Component};
use crate::vendor::VendorHeaderInfo;

/// Location of a component within the image (after any vendor preamble)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRange {
    pub component: Component,
    pub offset: u64,
    pub size: u32,
}

impl ComponentRange {
    /// Byte range for slicing
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }
}

/// Result of parsing an image
#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub header: BootImageHeader,
    /// Padding unit inferred from the zero blocks after the header
    pub padding_unit: u32,
    /// Non-empty components in on-disk order
    pub ranges: Vec<ComponentRange>,
    /// Address convention deviations
    pub warnings: Vec<AddressWarning>,
}

impl ParsedImage {
    /// Range of a component, if present
    pub fn range_of(&self, component: Component) -> Option<&ComponentRange> {
        self.ranges.iter().find(|r| r.component == component)
    }
}

/// Infer the padding unit from the zero blocks following the header region
pub fn detect_padding_unit(data: &[u8], page_size: u32) -> u32 {
    let page = page_size as usize;
    let mut offset = page;
    while offset < data.len() {
        let end = (offset + page).min(data.len());
        if data[offset..end].iter().any(|&b| b != 0) {
            let distance = (offset - page) as u64;
            if distance == 0 {
                return page_size;
            }
            let unit = largest_pow2_divisor(distance) as u32;
            debug!("first non-zero block at {:#x}, padding unit {:#x}", offset, unit);
            return unit;
        }
        offset = end;
    }
    page_size
}

/// Parse an image (without vendor preamble) into header and component ranges
pub fn parse_image(data: &[u8]) -> Result<ParsedImage> {
    let header = BootImageHeader::read(&mut Cursor::new(data))?;
    if !header.page_size.is_power_of_two() {
        return Err(BootImageError::InvalidAlignment(header.page_size));
    }

    let warnings = header.address_warnings();
    for warning in &warnings {
        warn!("{}", warning);
    }
    if header.dt_size != 0 {
        info!("found device tree image");
    }

    let padding_unit = detect_padding_unit(data, header.page_size);
    info!(
        "base {:#x}, page size {:#x}, padding unit {:#x}",
        header.base(),
        header.page_size,
        padding_unit
    );

    let mut ranges = Vec::new();
    let mut offset = header.page_size as u64;
    for component in Component::ALL {
        let size = header.size_of(component);
        if size == 0 {
            continue;
        }
        let available = (data.len() as u64).saturating_sub(offset);
        if available < size as u64 {
            return Err(BootImageError::Truncated {
                component: component.name(),
                offset,
                needed: size as u64,
                available,
            });
        }
        ranges.push(ComponentRange {
            component,
            offset,
            size,
        });
        offset += size as u64 + padding_len(size as u64, padding_unit);
    }

    Ok(ParsedImage {
        header,
        padding_unit,
        ranges,
        warnings,
    })
}

/// Parse an image and write its bootinfo report to `report`
pub fn parse_with_report<W: Write>(
    data: &[u8],
    vendor: Option<&VendorHeaderInfo>,
    report: &mut W,
) -> Result<ParsedImage> {
    let parsed = parse_image(data)?;
    BootInfoManifest::from_header(&parsed.header, parsed.padding_unit, vendor).write_to(report)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BootImageBuilder;

    #[test]
    fn test_padding_unit_from_nonzero_kernel() {
        let image = BootImageBuilder::new(vec![0xAA; 100]).build().unwrap();
        assert_eq!(detect_padding_unit(&image, 0x800), 0x800);
    }

    #[test]
    fn test_padding_unit_larger_than_page() {
        // Zero kernel written with a 0x4000 unit: first data at 0x800 + 0x4000
        let image = BootImageBuilder::new(vec![0; 0x3000])
            .ramdisk(vec![1; 16])
            .padding_unit(0x4000)
            .build()
            .unwrap();
        assert_eq!(detect_padding_unit(&image, 0x800), 0x4000);
        assert_eq!(parse_image(&image).unwrap().range_of(Component::Ramdisk).unwrap().offset, 0x4800);

        let image = BootImageBuilder::new(vec![0; 0x3000])
            .ramdisk(vec![1; 16])
            .page_size(0x1000)
            .padding_unit(0x4000)
            .build()
            .unwrap();
        assert_eq!(detect_padding_unit(&image, 0x1000), 0x4000);
    }

    #[test]
    fn test_kernel_with_zero_first_page() {
        let mut kernel = vec![0u8; 0x800];
        kernel.extend_from_slice(&[0x5a; 0x900]);
        let image = BootImageBuilder::new(kernel.clone())
            .ramdisk(vec![0x11; 16])
            .build()
            .unwrap();
        assert_eq!(image.len(), 0x2800);
        assert_eq!(detect_padding_unit(&image, 0x800), 0x800);

        let parsed = parse_image(&image).unwrap();
        let kernel_range = parsed.range_of(Component::Kernel).unwrap();
        assert_eq!(&image[kernel_range.range()], &kernel[..]);
        let ramdisk = parsed.range_of(Component::Ramdisk).unwrap();
        assert_eq!(ramdisk.offset, 0x2000);
        assert_eq!(&image[ramdisk.range()], &[0x11u8; 16]);
    }

    #[test]
    fn test_padding_unit_all_zero() {
        let mut image = BootImageBuilder::new(vec![0; 10]).build().unwrap();
        image.truncate(0x900);
        assert_eq!(detect_padding_unit(&image, 0x800), 0x800);
    }

    #[test]
    fn test_parse_all_components() {
        let image = BootImageBuilder::new(vec![1; 3000])
            .ramdisk(vec![2; 50])
            .second(vec![3; 0x900])
            .device_tree(vec![4; 7])
            .build()
            .unwrap();

        let parsed = parse_image(&image).unwrap();
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.ranges.len(), 4);
        let offsets: Vec<u64> = parsed.ranges.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0x800, 0x800 + 0x1000, 0x800 + 0x1800, 0x800 + 0x2800]);

        let dt = parsed.range_of(Component::DeviceTree).unwrap();
        assert_eq!(&image[dt.range()], &[4u8; 7]);
    }

    #[test]
    fn test_parse_skips_empty_second() {
        let image = BootImageBuilder::new(vec![1; 10])
            .ramdisk(vec![2; 10])
            .device_tree(vec![4; 10])
            .build()
            .unwrap();
        let parsed = parse_image(&image).unwrap();
        assert!(parsed.range_of(Component::Second).is_none());
        assert_eq!(parsed.range_of(Component::DeviceTree).unwrap().offset, 0x800 * 3);
    }

    #[test]
    fn test_truncated() {
        let mut image = BootImageBuilder::new(vec![1; 0x1000]).build().unwrap();
        image.truncate(0x1000);
        assert!(matches!(
            parse_image(&image),
            Err(BootImageError::Truncated { component: "kernel", .. })
        ));
    }

    #[test]
    fn test_report() {
        let image = BootImageBuilder::new(vec![1; 10])
            .board_name("board")
            .cmdline("console=null")
            .build()
            .unwrap();
        let mut report = Vec::new();
        let vendor = VendorHeaderInfo::new("BOOT");
        parse_with_report(&image, Some(&vendor), &mut report).unwrap();

        let text = String::from_utf8(report).unwrap();
        assert_eq!(
            text,
            "mode:vendor\nvendor_name:BOOT\nbase:0x10000000\nramdisk_addr:0x11000000\n\
             second_addr:0x10f00000\ntags_addr:0x10000100\npage_size:0x800\n\
             name:board\ncmdline:console=null\npadding_size:0x800\n"
        );
    }
}
