//! Verified boot key block, packed key, and signature containers.
use alloc::vec::Vec;
use core::mem::{offset_of, size_of};
use core::ops::Range;

use bytemuck::{Pod, Zeroable};
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest as _, Sha256};

use super::{element_fits, le_u32, read_pod};
use crate::error::FormatError;

pub const KEYBLOCK_MAGIC: [u8; 8] = *b"CHROMEOS";
pub const KEYBLOCK_MAJOR_VERSION: u32 = 2;
pub const KEYBLOCK_MINOR_VERSION: u32 = 1;
/// Key blocks claiming more than this are not read.
pub const MAX_KEYBLOCK_SIZE: u32 = 16 * 1024;

pub const VB2_ALG_RSA4096_SHA256: u32 = 7;
pub const RSA4096_SIG_SIZE: usize = 512;
/// `arrsize || n0inv || n || rr`
pub const RSA4096_KEY_SIZE: usize = RSA4096_SIG_SIZE * 2 + 8;
const RSA_EXPONENT: u32 = 65537;

/// Describes a signature body located `sig_offset` bytes past this header.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable)]
pub struct Vb2Signature {
    pub sig_offset: u32,
    pub reserved0: u32,
    pub sig_size: u32,
    pub reserved1: u32,
    /// Number of bytes the signature covers.
    pub data_size: u32,
    pub reserved2: u32,
}

/// Describes a public key body located `key_offset` bytes past this header.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable)]
pub struct Vb2PackedKey {
    pub key_offset: u32,
    pub reserved0: u32,
    pub key_size: u32,
    pub reserved1: u32,
    pub algorithm: u32,
    pub reserved2: u32,
    pub key_version: u32,
    pub reserved3: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable)]
pub struct Vb2KeyblockHeader {
    pub magic: [u8; 8],
    pub header_version_major: u32,
    pub header_version_minor: u32,
    /// Size of the whole key block including every body it refers to.
    pub keyblock_size: u32,
    pub reserved0: u32,
    /// Covers the header and the data key body.
    pub keyblock_signature: Vb2Signature,
    pub keyblock_hash: Vb2Signature,
    pub keyblock_flags: u32,
    pub reserved1: u32,
    pub data_key: Vb2PackedKey,
}
pub const KEYBLOCK_HEADER_SIZE: usize = size_of::<Vb2KeyblockHeader>();

impl Vb2KeyblockHeader {
    /// Checks the fields needed to decide whether the rest of the block is
    /// worth reading.
    pub fn check_magic_and_size(&self) -> Result<(), FormatError> {
        if self.magic != KEYBLOCK_MAGIC {
            return Err(FormatError::BadMagic);
        }
        if (self.keyblock_size as usize) < KEYBLOCK_HEADER_SIZE || self.keyblock_size > MAX_KEYBLOCK_SIZE {
            return Err(FormatError::SizeMismatch);
        }
        Ok(())
    }
}

/// A key block whose sub-structures have been checked to lie inside it.
pub struct Keyblock {
    header: Vb2KeyblockHeader,
    raw: Vec<u8>,
    signed: Range<usize>,
    signature: Range<usize>,
    data_key: Range<usize>,
}

impl Keyblock {
    /// Takes ownership of the complete key block as read from flash.
    pub fn parse(raw: Vec<u8>) -> Result<Self, FormatError> {
        let header: Vb2KeyblockHeader = read_pod(&raw, 0)?;
        header.check_magic_and_size()?;
        if header.keyblock_size as usize != raw.len() {
            return Err(FormatError::SizeMismatch);
        }
        if header.header_version_major != KEYBLOCK_MAJOR_VERSION
            || header.header_version_minor != KEYBLOCK_MINOR_VERSION
        {
            return Err(FormatError::BadVersion);
        }
        let total = raw.len();
        let sig = header.keyblock_signature;
        let hash = header.keyblock_hash;
        let signature = element_fits(
            total,
            offset_of!(Vb2KeyblockHeader, keyblock_signature),
            sig.sig_offset,
            sig.sig_size,
        )?;
        element_fits(total, offset_of!(Vb2KeyblockHeader, keyblock_hash), hash.sig_offset, hash.sig_size)?;
        let data_key = element_fits(
            total,
            offset_of!(Vb2KeyblockHeader, data_key),
            header.data_key.key_offset,
            header.data_key.key_size,
        )?;
        if sig.data_size as usize > total {
            return Err(FormatError::ElementDoesNotFit);
        }
        Ok(Keyblock { header, signed: 0..sig.data_size as usize, signature, data_key, raw })
    }

    pub fn header(&self) -> &Vb2KeyblockHeader { &self.header }

    /// Bytes covered by the key block signature.
    pub fn signed_data(&self) -> &[u8] { &self.raw[self.signed.clone()] }

    pub fn signature(&self) -> &[u8] { &self.raw[self.signature.clone()] }

    pub fn data_key_body(&self) -> &[u8] { &self.raw[self.data_key.clone()] }
}

/// An RSA public key unpacked from its verified boot representation.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Only RSA-4096 with SHA-256 is supported. The modulus is stored as a
    /// little-endian word array following the array size and `n0inv` words;
    /// the Montgomery constant after it is not needed here.
    pub fn unpack(header: &Vb2PackedKey, body: &[u8]) -> Result<Self, FormatError> {
        let sig_size = match header.algorithm {
            VB2_ALG_RSA4096_SHA256 => RSA4096_SIG_SIZE,
            other => return Err(FormatError::UnsupportedAlgorithm(other)),
        };
        let key_size = sig_size * 2 + 8;
        if header.key_size as usize != key_size || body.len() != key_size {
            return Err(FormatError::KeySizeMismatch);
        }
        let arr_size = le_u32(body, 0);
        if arr_size as usize != sig_size / size_of::<u32>() {
            return Err(FormatError::BadKeyArraySize(arr_size));
        }
        let n = BigUint::from_bytes_le(&body[8..8 + sig_size]);
        let key = RsaPublicKey::new(n, BigUint::from(RSA_EXPONENT)).map_err(|_| FormatError::BadKey)?;
        Ok(PublicKey { key })
    }

    /// Checks a PKCS#1 v1.5 SHA-256 signature over the concatenation of
    /// `parts`.
    pub fn verify(&self, parts: &[&[u8]], signature: &[u8]) -> bool {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();
        self.key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_keyblock, dev_keys, PLATFORM_VBPUBK, ROOT_VBPUBK};

    #[test]
    fn layout_sizes() {
        assert_eq!(size_of::<Vb2Signature>(), 24);
        assert_eq!(size_of::<Vb2PackedKey>(), 32);
        assert_eq!(KEYBLOCK_HEADER_SIZE, 112);
        assert_eq!(offset_of!(Vb2KeyblockHeader, keyblock_signature), 24);
        assert_eq!(offset_of!(Vb2KeyblockHeader, keyblock_hash), 48);
        assert_eq!(offset_of!(Vb2KeyblockHeader, data_key), 80);
    }

    #[test]
    fn unpack_dev_keys() {
        let (hdr, body) = ROOT_VBPUBK.split_at(32);
        let packed: Vb2PackedKey = read_pod(hdr, 0).unwrap();
        assert!(PublicKey::unpack(&packed, body).is_ok());

        let mut wrong_alg = packed;
        wrong_alg.algorithm = 4;
        assert_eq!(PublicKey::unpack(&wrong_alg, body).err(), Some(FormatError::UnsupportedAlgorithm(4)));

        let mut bad_array = body.to_vec();
        bad_array[0] = 64;
        assert_eq!(PublicKey::unpack(&packed, &bad_array).err(), Some(FormatError::BadKeyArraySize(64)));

        assert_eq!(PublicKey::unpack(&packed, &body[..1000]).err(), Some(FormatError::KeySizeMismatch));
    }

    #[test]
    fn keyblock_verifies_under_root() {
        let keys = dev_keys();
        let kb = Keyblock::parse(build_keyblock(&keys.root, &PLATFORM_VBPUBK[32..])).unwrap();
        let (hdr, body) = ROOT_VBPUBK.split_at(32);
        let root = PublicKey::unpack(&read_pod(hdr, 0).unwrap(), body).unwrap();
        assert!(root.verify(&[kb.signed_data()], kb.signature()));
        assert_eq!(kb.data_key_body(), &PLATFORM_VBPUBK[32..]);

        // signed by the wrong key
        let kb = Keyblock::parse(build_keyblock(&keys.platform, &PLATFORM_VBPUBK[32..])).unwrap();
        assert!(!root.verify(&[kb.signed_data()], kb.signature()));
    }

    #[test]
    fn keyblock_elements_must_fit() {
        let keys = dev_keys();
        let good = build_keyblock(&keys.root, &PLATFORM_VBPUBK[32..]);

        // signature body reaching one byte past the end
        let mut raw = good.clone();
        let mut hdr: Vb2KeyblockHeader = read_pod(&raw, 0).unwrap();
        hdr.keyblock_signature.sig_size += 1 + (hdr.keyblock_size - 24 - hdr.keyblock_signature.sig_offset
            - hdr.keyblock_signature.sig_size);
        raw[..KEYBLOCK_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&hdr));
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::ElementDoesNotFit));

        // hash body offset outside the block
        let mut raw = good.clone();
        let mut hdr: Vb2KeyblockHeader = read_pod(&raw, 0).unwrap();
        hdr.keyblock_hash.sig_offset = hdr.keyblock_size;
        raw[..KEYBLOCK_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&hdr));
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::ElementDoesNotFit));

        // data key with a wrapping size
        let mut raw = good.clone();
        let mut hdr: Vb2KeyblockHeader = read_pod(&raw, 0).unwrap();
        hdr.data_key.key_size = u32::MAX;
        raw[..KEYBLOCK_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&hdr));
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::ElementDoesNotFit));

        // signed region larger than the block
        let mut raw = good.clone();
        let mut hdr: Vb2KeyblockHeader = read_pod(&raw, 0).unwrap();
        hdr.keyblock_signature.data_size = hdr.keyblock_size + 1;
        raw[..KEYBLOCK_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&hdr));
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::ElementDoesNotFit));
    }

    #[test]
    fn keyblock_header_checks() {
        let keys = dev_keys();
        let good = build_keyblock(&keys.root, &PLATFORM_VBPUBK[32..]);

        let mut raw = good.clone();
        raw[0] = b'X';
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::BadMagic));

        let mut raw = good.clone();
        raw[12] = 0;
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::BadVersion));

        let mut raw = good.clone();
        raw.push(0);
        assert_eq!(Keyblock::parse(raw).err(), Some(FormatError::SizeMismatch));

        let mut hdr: Vb2KeyblockHeader = read_pod(&good, 0).unwrap();
        hdr.keyblock_size = MAX_KEYBLOCK_SIZE + 1;
        assert_eq!(hdr.check_magic_and_size(), Err(FormatError::SizeMismatch));
        hdr.keyblock_size = 100;
        assert_eq!(hdr.check_magic_and_size(), Err(FormatError::SizeMismatch));
    }
}
