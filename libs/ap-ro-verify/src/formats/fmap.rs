//! Flash map (FMAP) header and area table.
//!
//! Both structures are packed on flash, so they are decoded field by field
//! rather than cast.
use super::{le_u16, le_u32, le_u64};
use crate::api::MAX_SUPPORTED_FLASH_SIZE;

pub const FMAP_SIGNATURE: [u8; 8] = *b"__FMAP__";
pub const FMAP_MAJOR_VERSION: u8 = 1;
pub const FMAP_MINOR_VERSION: u8 = 1;
pub const FMAP_NAMELEN: usize = 32;
pub const FMAP_HEADER_SIZE: usize = 56;
pub const FMAP_AREA_SIZE: usize = 42;
/// Larger area tables are not searched.
pub const FMAP_MAX_AREAS: u16 = 64;
/// Name of the area holding the GVD, matched including the terminating NUL.
pub const GSCVD_AREA_NAME: &[u8] = b"RO_GSCVD\0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmapHeader {
    pub signature: [u8; 8],
    pub ver_major: u8,
    pub ver_minor: u8,
    pub base: u64,
    pub size: u32,
    pub name: [u8; FMAP_NAMELEN],
    pub nareas: u16,
}

impl FmapHeader {
    pub fn parse(raw: &[u8; FMAP_HEADER_SIZE]) -> Self {
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&raw[0..8]);
        let mut name = [0u8; FMAP_NAMELEN];
        name.copy_from_slice(&raw[22..22 + FMAP_NAMELEN]);
        FmapHeader {
            signature,
            ver_major: raw[8],
            ver_minor: raw[9],
            base: le_u64(raw, 10),
            size: le_u32(raw, 18),
            name,
            nareas: le_u16(raw, 54),
        }
    }

    /// Signature, version, and declared size are all acceptable.
    pub fn is_valid(&self) -> bool {
        self.signature == FMAP_SIGNATURE
            && self.ver_major == FMAP_MAJOR_VERSION
            && self.ver_minor == FMAP_MINOR_VERSION
            && self.size <= MAX_SUPPORTED_FLASH_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmapArea {
    pub offset: u32,
    pub size: u32,
    pub name: [u8; FMAP_NAMELEN],
    pub flags: u16,
}

impl FmapArea {
    pub fn parse(raw: &[u8; FMAP_AREA_SIZE]) -> Self {
        let mut name = [0u8; FMAP_NAMELEN];
        name.copy_from_slice(&raw[8..8 + FMAP_NAMELEN]);
        FmapArea { offset: le_u32(raw, 0), size: le_u32(raw, 4), name, flags: le_u16(raw, 40) }
    }

    /// `name` must include its NUL terminator so that prefixes do not match.
    pub fn is_named(&self, name: &[u8]) -> bool { self.name.starts_with(name) }
}
