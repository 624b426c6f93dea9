//! Gzip framing around the archive stream.
//!
//! Written members always carry the same 10-byte header: no flags, zero
//! mtime, no extra flags, OS byte 3. The trailer is CRC32 + ISIZE as usual,
//! but it is never checked on read: decoding stops at the end of the deflate
//! stream and whatever follows is ignored.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{RamdiskError, Result};
use crate::format::NEWC_MAGIC;

/// Gzip magic plus the deflate method byte.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Fixed member header written by [`wrap`].
pub const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];

/// Bytes needed by [`Framing::sniff`].
pub const SNIFF_LEN: usize = 6;

/// Highest deflate level.
pub const MAX_LEVEL: u32 = 9;

/// Level reported for wrapped input; the real level is not recoverable.
pub const WRAPPED_LEVEL: u32 = 6;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

/// How a ramdisk stream is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Gzip member around a newc archive
    Wrapped,
    /// Bare newc archive
    Raw,
    Invalid,
}

impl Framing {
    /// Classify a stream from its first [`SNIFF_LEN`] bytes.
    pub fn sniff(head: &[u8]) -> Framing {
        if head.starts_with(&GZIP_MAGIC) {
            Framing::Wrapped
        } else if head.starts_with(NEWC_MAGIC) {
            Framing::Raw
        } else {
            Framing::Invalid
        }
    }

    /// Compression level to record for this framing.
    pub fn level(self) -> Option<u32> {
        match self {
            Framing::Wrapped => Some(WRAPPED_LEVEL),
            Framing::Raw => Some(0),
            Framing::Invalid => None,
        }
    }
}

/// Wrap `data` in a gzip member at `level`.
///
/// Level 0 returns the data unchanged; levels above 9 are clamped.
pub fn wrap(data: &[u8], level: u32) -> Result<Vec<u8>> {
    if level == 0 {
        return Ok(data.to_vec());
    }
    let level = level.min(MAX_LEVEL);

    let mut out = Vec::with_capacity(data.len() / 2 + GZIP_HEADER.len() + 8);
    out.extend_from_slice(&GZIP_HEADER);

    let mut encoder = DeflateEncoder::new(out, Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| RamdiskError::Compression(format!("Failed to deflate archive: {}", e)))?;
    let mut out = encoder
        .finish()
        .map_err(|e| RamdiskError::Compression(format!("Failed to finish deflate stream: {}", e)))?;

    out.write_u32::<LittleEndian>(crc32fast::hash(data))?;
    out.write_u32::<LittleEndian>(data.len() as u32)?;
    Ok(out)
}

/// Skip a gzip member header, tolerating optional fields.
fn skip_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut header = [0u8; 10];
    reader
        .read_exact(&mut header)
        .map_err(|_| RamdiskError::InvalidGzip("truncated header".to_string()))?;
    if header[..3] != GZIP_MAGIC {
        return Err(RamdiskError::InvalidGzip(format!("bad magic {:02x?}", &header[..3])));
    }

    let flags = header[3];
    if flags & FEXTRA != 0 {
        let len = reader.read_u16::<LittleEndian>()?;
        std::io::copy(&mut reader.by_ref().take(len as u64), &mut std::io::sink())?;
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            loop {
                if reader.read_u8()? == 0 {
                    break;
                }
            }
        }
    }
    if flags & FHCRC != 0 {
        reader.read_u16::<LittleEndian>()?;
    }
    Ok(())
}

/// Decode a gzip member, ignoring its trailer.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(data);
    skip_header(&mut cursor)?;

    let mut decoder = DeflateDecoder::new(cursor);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| RamdiskError::Decompression(format!("Failed to inflate ramdisk: {}", e)))?;
    Ok(out)
}

/// Return the bare archive bytes of a ramdisk stream and its framing.
pub fn unwrap(data: &[u8]) -> Result<(Vec<u8>, Framing)> {
    let head = &data[..data.len().min(SNIFF_LEN)];
    match Framing::sniff(head) {
        Framing::Wrapped => Ok((decode(data)?, Framing::Wrapped)),
        Framing::Raw => Ok((data.to_vec(), Framing::Raw)),
        Framing::Invalid => Err(RamdiskError::InvalidRamdisk),
    }
}
