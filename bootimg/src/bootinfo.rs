//! `bootinfo.txt`: header fields needed to rebuild an image.
//!
//! ```text
//! base:0x10000000
//! ramdisk_addr:0x11000000
//! second_addr:0x10f00000
//! tags_addr:0x10000100
//! page_size:0x800
//! name:
//! cmdline:console=ttyHSL0,115200,n8 androidboot.hardware=qcom
//! padding_size:0x800
//! ```
//!
//! Numbers are hex. A vendor preamble adds `mode:` and `vendor_name:` lines.
//!
//! # Merge rule
//!
//! Every field is set by its *first* occurrence. Merging a sidecar into a
//! manifest that already holds a value leaves that value alone, which is how
//! callers seed overrides before reading a (possibly partial) sidecar:
//!
//! ```
//! use bootimg::BootInfoManifest;
//!
//! let mut info = BootInfoManifest::default();
//! info.base = Some(0x8000_0000);
//! info.merge("base:0x10000000\npage_size:0x800\n").unwrap();
//! assert_eq!(info.base, Some(0x8000_0000));
//! assert_eq!(info.page_size, Some(0x800));
//! ```

use std::io::Write;

use crate::error::Result;
use crate::format::BootImageHeader;
use crate::sidecar;
use crate::vendor::{VendorHeaderInfo, MODE_KEY, NAME_KEY};

/// Header scalars restored from a sidecar, each optional until merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootInfoManifest {
    pub base: Option<u32>,
    pub ramdisk_addr: Option<u32>,
    pub second_addr: Option<u32>,
    pub tags_addr: Option<u32>,
    pub page_size: Option<u32>,
    /// Component padding unit (`padding_size` key)
    pub padding_unit: Option<u32>,
    pub name: Option<String>,
    pub cmdline: Option<String>,
    /// Vendor preamble mode tag (`mode` key)
    pub vendor_mode: Option<String>,
    /// Vendor preamble name (`vendor_name` key)
    pub vendor_name: Option<String>,
}

fn set_once<T>(slot: &mut Option<T>, value: impl FnOnce() -> Result<T>) -> Result<()> {
    if slot.is_none() {
        *slot = Some(value()?);
    }
    Ok(())
}

impl BootInfoManifest {
    /// Parse a sidecar into a fresh manifest
    pub fn parse(text: &str) -> Result<Self> {
        let mut info = Self::default();
        info.merge(text)?;
        Ok(info)
    }

    /// Fill still-unset fields from sidecar text; first occurrence wins.
    ///
    /// Unknown keys are ignored. A malformed hex value for a field that is
    /// still unset is an error.
    pub fn merge(&mut self, text: &str) -> Result<()> {
        for line in sidecar::lines(text) {
            match line.key {
                "base" => set_once(&mut self.base, || line.hex())?,
                "ramdisk_addr" => set_once(&mut self.ramdisk_addr, || line.hex())?,
                "second_addr" => set_once(&mut self.second_addr, || line.hex())?,
                "tags_addr" => set_once(&mut self.tags_addr, || line.hex())?,
                "page_size" => set_once(&mut self.page_size, || line.hex())?,
                "padding_size" => set_once(&mut self.padding_unit, || line.hex())?,
                "name" => set_once(&mut self.name, || Ok(line.value.trim().to_string()))?,
                "cmdline" => set_once(&mut self.cmdline, || Ok(line.value.trim().to_string()))?,
                MODE_KEY => set_once(&mut self.vendor_mode, || Ok(line.value.trim().to_string()))?,
                NAME_KEY => set_once(&mut self.vendor_name, || Ok(line.value.trim().to_string()))?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Report for a parsed header and its detected padding unit
    pub fn from_header(
        header: &BootImageHeader,
        padding_unit: u32,
        vendor: Option<&VendorHeaderInfo>,
    ) -> Self {
        Self {
            base: Some(header.base()),
            ramdisk_addr: Some(header.ramdisk_addr),
            second_addr: Some(header.second_addr),
            tags_addr: Some(header.tags_addr),
            page_size: Some(header.page_size),
            padding_unit: Some(padding_unit),
            name: Some(header.board_name()),
            cmdline: Some(header.cmdline_text()),
            vendor_mode: vendor.map(|v| v.mode.clone()),
            vendor_name: vendor.map(|v| v.name.clone()),
        }
    }

    /// Vendor preamble recorded in the manifest, if any
    pub fn vendor(&self) -> Option<VendorHeaderInfo> {
        Some(VendorHeaderInfo {
            mode: self.vendor_mode.clone()?,
            name: self.vendor_name.clone().unwrap_or_default(),
        })
    }

    /// Sidecar text for the set fields, vendor lines first
    pub fn to_text(&self) -> String {
        let mut text = self.vendor().map(|v| v.to_sidecar()).unwrap_or_default();
        let numbers = [
            ("base", self.base),
            ("ramdisk_addr", self.ramdisk_addr),
            ("second_addr", self.second_addr),
            ("tags_addr", self.tags_addr),
            ("page_size", self.page_size),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                text.push_str(&format!("{}:{:#x}\n", key, value));
            }
        }
        if let Some(name) = &self.name {
            text.push_str(&format!("name:{}\n", name));
        }
        if let Some(cmdline) = &self.cmdline {
            text.push_str(&format!("cmdline:{}\n", cmdline));
        }
        if let Some(unit) = self.padding_unit {
            text.push_str(&format!("padding_size:{:#x}\n", unit));
        }
        text
    }

    /// Write [`to_text`](Self::to_text) to `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.to_text().as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootImageError;

    const SAMPLE: &str = "\
base:0x10000000
ramdisk_addr:0x11000000
second_addr:0x10f00000
tags_addr:0x10000100
page_size:0x800
name:
cmdline: console=ttyHSL0,115200,n8 androidboot.hardware=qcom
padding_size:0x1000
";

    #[test]
    fn test_parse() {
        let info = BootInfoManifest::parse(SAMPLE).unwrap();
        assert_eq!(info.base, Some(0x1000_0000));
        assert_eq!(info.second_addr, Some(0x10F0_0000));
        assert_eq!(info.padding_unit, Some(0x1000));
        assert_eq!(info.name.as_deref(), Some(""));
        assert_eq!(
            info.cmdline.as_deref(),
            Some("console=ttyHSL0,115200,n8 androidboot.hardware=qcom")
        );
        assert!(info.vendor().is_none());
    }

    // Intentional contract: the first occurrence of a key wins.
    #[test]
    fn test_first_occurrence_wins() {
        let info = BootInfoManifest::parse("page_size:0x800\npage_size:0x1000\n").unwrap();
        assert_eq!(info.page_size, Some(0x800));
    }

    #[test]
    fn test_seeded_fields_survive_merge() {
        let mut info = BootInfoManifest {
            cmdline: Some("console=null".to_string()),
            padding_unit: Some(0x20000),
            ..Default::default()
        };
        info.merge(SAMPLE).unwrap();
        assert_eq!(info.cmdline.as_deref(), Some("console=null"));
        assert_eq!(info.padding_unit, Some(0x20000));
        assert_eq!(info.base, Some(0x1000_0000));
    }

    #[test]
    fn test_seeded_field_skips_bad_value() {
        let mut info = BootInfoManifest {
            base: Some(0x8000_0000),
            ..Default::default()
        };
        info.merge("base:nothex\n").unwrap();
        assert_eq!(info.base, Some(0x8000_0000));
    }

    #[test]
    fn test_bad_hex() {
        let err = BootInfoManifest::parse("# c\npage_size:two\n").unwrap_err();
        assert!(matches!(err, BootImageError::InvalidSidecar { line: 2, .. }));
    }

    #[test]
    fn test_write_parses_back() {
        let mut info = BootInfoManifest::parse(SAMPLE).unwrap();
        info.vendor_mode = Some("vendor".to_string());
        info.vendor_name = Some("ROOTFS".to_string());

        let text = info.to_text();
        assert!(text.starts_with("mode:vendor\nvendor_name:ROOTFS\nbase:0x10000000\n"));
        assert!(text.ends_with("padding_size:0x1000\n"));
        assert_eq!(BootInfoManifest::parse(&text).unwrap(), info);

        let mut written = Vec::new();
        info.write_to(&mut written).unwrap();
        assert_eq!(written, text.as_bytes());
    }
}
