//! # bootimg
//!
//! Read and write Android boot images (`ANDROID!` header, version 0 layout).
//!
//! - Parse the 608-byte header and slice kernel, ramdisk, second stage and
//!   device tree out of an image
//! - Infer the component padding unit from the image contents
//! - Build images from components with the SHA-1 image id
//! - Detect, strip and re-add the 512-byte vendor preamble
//! - Read and write the `bootinfo.txt` sidecar used to rebuild a header
//!
//! ## Quick Start
//!
//! ```no_run
//! use bootimg::{BootImage, BootImageBuilder, Component};
//!
//! let image = BootImage::open("boot.img").unwrap();
//! let kernel = image.component(Component::Kernel).unwrap().to_vec();
//! let ramdisk = image.component(Component::Ramdisk).unwrap_or_default().to_vec();
//!
//! let rebuilt = BootImageBuilder::from_boot_info(kernel, &image.boot_info())
//!     .ramdisk(ramdisk)
//!     .build()
//!     .unwrap();
//! ```

pub mod align;
pub mod bootinfo;
pub mod checksum;
pub mod error;
pub mod format;
pub mod reader;
pub mod sidecar;
pub mod vendor;
pub mod writer;

pub use bootinfo::BootInfoManifest;
pub use error::{BootImageError, Result};
pub use format::{AddressWarning, BootImageHeader, Component};
pub use reader::{parse_image, parse_with_report, ComponentRange, ParsedImage};
pub use vendor::VendorHeaderInfo;
pub use writer::{Addressing, BootImageBuilder};

use std::io::{Cursor, Write};
use std::path::Path;

/// A parsed boot image held in memory
///
/// # Example
///
/// ```no_run
/// use bootimg::BootImage;
///
/// let image = BootImage::open("boot.img").unwrap();
/// println!("base {:#x}", image.header().base());
/// image.verify_id().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct BootImage {
    data: Vec<u8>,
    payload_offset: usize,
    vendor: Option<VendorHeaderInfo>,
    parsed: ParsedImage,
}

impl BootImage {
    /// Open and parse an image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Parse an image, stripping a vendor preamble if present
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::parse(data, &mut std::io::sink())
    }

    /// Parse an image and write its bootinfo report to `report`
    pub fn parse_with_report<W: Write>(data: Vec<u8>, report: &mut W) -> Result<Self> {
        Self::parse(data, report)
    }

    fn parse<W: Write>(data: Vec<u8>, report: &mut W) -> Result<Self> {
        let mut cursor = Cursor::new(&data);
        let vendor = VendorHeaderInfo::detect(&mut cursor)?;
        let payload_offset = cursor.position() as usize;

        let parsed = parse_with_report(&data[payload_offset..], vendor.as_ref(), report)?;
        Ok(BootImage {
            data,
            payload_offset,
            vendor,
            parsed,
        })
    }

    /// The image header
    pub fn header(&self) -> &BootImageHeader {
        &self.parsed.header
    }

    /// Padding unit inferred while parsing
    pub fn padding_unit(&self) -> u32 {
        self.parsed.padding_unit
    }

    /// Vendor preamble, if the image carried one
    pub fn vendor(&self) -> Option<&VendorHeaderInfo> {
        self.vendor.as_ref()
    }

    /// Address convention deviations found while parsing
    pub fn address_warnings(&self) -> &[AddressWarning] {
        &self.parsed.warnings
    }

    /// Bytes of a component; `None` when its size is zero
    pub fn component(&self, component: Component) -> Option<&[u8]> {
        let range = self.parsed.range_of(component)?;
        Some(&self.payload()[range.range()])
    }

    /// Image bytes after any vendor preamble
    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_offset..]
    }

    /// Header scalars in sidecar form
    pub fn boot_info(&self) -> BootInfoManifest {
        BootInfoManifest::from_header(self.header(), self.padding_unit(), self.vendor())
    }

    /// Check the stored image id against the components
    pub fn verify_id(&self) -> Result<()> {
        // An empty device tree is left out of the digest entirely
        let computed = checksum::image_digest(
            self.component(Component::Kernel).unwrap_or_default(),
            self.component(Component::Ramdisk).unwrap_or_default(),
            self.component(Component::Second),
            self.component(Component::DeviceTree),
        );
        checksum::verify_id(&self.header().id, &computed).map_err(|(stored, computed)| {
            BootImageError::IdMismatch {
                stored: checksum::to_hex(&stored),
                computed: checksum::to_hex(&computed),
            }
        })
    }
}
