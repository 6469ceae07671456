//! GSC verification data (GVD), the signed blob describing which AP flash
//! ranges are protected.
//!
//! On flash the blob is laid out as the fixed header, `range_count` ranges,
//! the signature body, and the root key body. The key block follows
//! immediately after.
use core::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use super::vb2::{Vb2PackedKey, Vb2Signature};
use crate::api::{RoRange, APRO_MAX_NUM_RANGES, RO_RANGE_SIZE};
use crate::error::FormatError;

/// Little endian "5afe".
pub const GSC_VD_MAGIC: u32 = 0x6566_6135;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GvdHeader {
    pub magic: u32,
    /// Header, ranges, signature body, and root key body.
    pub size: u16,
    pub major_version: u16,
    pub minor_version: u16,
    pub rollback_counter: u16,
    /// Binds the blob to a board ID type.
    pub board_id: u32,
    pub flags: u32,
    /// Offset of the FMAP that points at this blob.
    pub fmap_location: u32,
    pub hash_alg: u32,
    pub sig_header: Vb2Signature,
    pub root_key_header: Vb2PackedKey,
    /// Room for the largest digest; SHA-256 uses the first 32 bytes.
    pub ranges_digest: [u8; 64],
    pub range_count: u32,
}
pub const GVD_HEADER_SIZE: usize = size_of::<GvdHeader>();
pub const GVD_SIG_HEADER_OFFSET: u32 = offset_of!(GvdHeader, sig_header) as u32;
pub const GVD_ROOT_KEY_HEADER_OFFSET: u32 = offset_of!(GvdHeader, root_key_header) as u32;

impl GvdHeader {
    /// The size the blob must declare given its own counts and sizes.
    pub fn expected_size(&self) -> u64 {
        GVD_HEADER_SIZE as u64
            + RO_RANGE_SIZE as u64 * self.range_count as u64
            + self.sig_header.sig_size as u64
            + self.root_key_header.key_size as u64
    }

    /// Structural checks that need nothing but the header itself.
    pub fn check(&self) -> Result<(), FormatError> {
        if self.magic != GSC_VD_MAGIC {
            return Err(FormatError::BadMagic);
        }
        if self.size as u64 != self.expected_size() {
            return Err(FormatError::SizeMismatch);
        }
        if self.range_count as usize > APRO_MAX_NUM_RANGES {
            return Err(FormatError::TooManyRanges(self.range_count));
        }
        Ok(())
    }

    pub fn sha256_digest(&self) -> &[u8] { &self.ranges_digest[..crate::api::SHA256_DIGEST_SIZE] }

    /// Bytes of the ranges array that follows the header on flash.
    pub fn ranges_len(&self) -> usize { RO_RANGE_SIZE * self.range_count as usize }
}

/// Decodes the range array that follows a header.
pub fn parse_ranges(raw: &[u8]) -> Result<alloc::vec::Vec<RoRange>, FormatError> {
    if raw.len() % RO_RANGE_SIZE != 0 {
        return Err(FormatError::ShortBuffer);
    }
    if raw.len() / RO_RANGE_SIZE > APRO_MAX_NUM_RANGES {
        return Err(FormatError::TooManyRanges((raw.len() / RO_RANGE_SIZE) as u32));
    }
    Ok(raw.chunks_exact(RO_RANGE_SIZE).map(bytemuck::pod_read_unaligned).collect())
}
