//! `key:value` sidecar lines.
//!
//! Keys are trimmed and values are kept verbatim (callers trim as needed).
//! Blank lines, `#` comments and lines without a `:` are skipped.

use crate::error::{BootImageError, Result};

/// One `key:value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarLine<'a> {
    /// 1-based line number
    pub number: usize,
    pub key: &'a str,
    pub value: &'a str,
}

impl SidecarLine<'_> {
    /// Value as a hex number, with or without `0x`.
    pub fn hex(&self) -> Result<u32> {
        let text = self.value.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u32::from_str_radix(digits, 16).map_err(|e| BootImageError::InvalidSidecar {
            line: self.number,
            message: format!("{}: bad hex value '{}': {}", self.key, text, e),
        })
    }
}

/// Iterate over the `key:value` lines of `text`.
pub fn lines(text: &str) -> impl Iterator<Item = SidecarLine<'_>> {
    text.lines().enumerate().filter_map(|(index, line)| {
        if line.trim_start().starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once(':')?;
        Some(SidecarLine {
            number: index + 1,
            key: key.trim(),
            value,
        })
    })
}
