//! Padding and alignment helpers.
//!
//! All alignment units are powers of two, so the pad after `size` bytes is
//! `(-size) & (unit - 1)`.

use crate::error::{BootImageError, Result};

/// Zero bytes needed to round `size` up to a multiple of `unit`.
pub fn padding_len(size: u64, unit: u32) -> u64 {
    size.wrapping_neg() & (unit as u64 - 1)
}

/// Round `size` up to a multiple of `unit`.
pub fn align_up(size: u64, unit: u32) -> u64 {
    size + padding_len(size, unit)
}

/// Reject units that are zero or not a power of two.
pub fn check_unit(unit: u32) -> Result<u32> {
    if unit.is_power_of_two() {
        Ok(unit)
    } else {
        Err(BootImageError::InvalidAlignment(unit))
    }
}

/// Largest power of two dividing `offset`; `offset` must be non-zero.
pub fn largest_pow2_divisor(offset: u64) -> u64 {
    offset & offset.wrapping_neg()
}
