//! Image id computation
//!
//! The header's 32-byte id field holds a SHA-1 digest, zero padded:
//! - kernel bytes, kernel size (LE u32)
//! - ramdisk bytes, ramdisk size (LE u32)
//! - second bytes, second size (LE u32); an absent second hashes as empty
//! - dt bytes, dt size (LE u32), only when a device tree is present

use byteorder::{ByteOrder, LittleEndian};
use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};

/// Length of the SHA-1 digest
pub const DIGEST_SIZE: usize = 20;

/// Length of the header id field
pub const ID_SIZE: usize = 32;

fn update_sized(ctx: &mut Context, data: &[u8]) {
    let mut size = [0u8; 4];
    LittleEndian::write_u32(&mut size, data.len() as u32);
    ctx.update(data);
    ctx.update(&size);
}

/// Compute the SHA-1 image digest over the components
pub fn image_digest(
    kernel: &[u8],
    ramdisk: &[u8],
    second: Option<&[u8]>,
    dt: Option<&[u8]>,
) -> [u8; DIGEST_SIZE] {
    let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    update_sized(&mut ctx, kernel);
    update_sized(&mut ctx, ramdisk);
    update_sized(&mut ctx, second.unwrap_or(&[]));
    if let Some(dt) = dt {
        update_sized(&mut ctx, dt);
    }

    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(ctx.finish().as_ref());
    digest
}

/// Zero-pad a digest into the 32-byte header field
pub fn id_field(digest: &[u8; DIGEST_SIZE]) -> [u8; ID_SIZE] {
    let mut id = [0u8; ID_SIZE];
    id[..DIGEST_SIZE].copy_from_slice(digest);
    id
}

/// Lowercase hex rendering of a digest, for logs and errors
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compare a stored id field with a freshly computed digest
/// Returns Err with (stored, computed) digests on mismatch
pub fn verify_id(
    stored: &[u8; ID_SIZE],
    computed: &[u8; DIGEST_SIZE],
) -> Result<(), ([u8; DIGEST_SIZE], [u8; DIGEST_SIZE])> {
    if stored[..DIGEST_SIZE] == computed[..] {
        Ok(())
    } else {
        let mut expected = [0u8; DIGEST_SIZE];
        expected.copy_from_slice(&stored[..DIGEST_SIZE]);
        Err((expected, *computed))
    }
}
