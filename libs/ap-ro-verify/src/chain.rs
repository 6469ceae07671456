//! V2 verification: locating and authenticating the GVD in AP flash.
//!
//! The trust chain runs from the pinned root key hash, through the key block
//! signed by the root key, to the platform key carried in the key block, which
//! signs the GVD header and ranges. The GVD in turn carries the digest of the
//! protected ranges.
use alloc::vec;
use alloc::vec::Vec;

use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

use crate::api::*;
use crate::cache;
use crate::config::VerifierConfig;
use crate::error::{ChainError, FlashError};
use crate::formats::fmap::*;
use crate::formats::gvd::*;
use crate::formats::read_pod;
use crate::formats::vb2::{Keyblock, PublicKey, Vb2KeyblockHeader, KEYBLOCK_HEADER_SIZE};
use crate::hal::{ApFlash, BoardIdentity, Platform};
use crate::hasher::validate_ranges;
use crate::record::{check_is_required, require_future_checks};

fn at(base: u32, offset: u32) -> Result<u32, FlashError> { base.checked_add(offset).ok_or(FlashError::OutOfRange) }

/// A GVD header and its ranges, copied out of AP flash.
#[derive(Debug, Clone)]
pub struct GvdContainer {
    /// AP flash offset of the header.
    pub offset: u32,
    pub header: GvdHeader,
    pub ranges: Vec<RoRange>,
}

impl GvdContainer {
    /// Reads the header at `gvd_offset` and checks it was reached through the
    /// FMAP at `fmap_offset` on a board it was issued for.
    pub fn read_header<P: ApFlash + BoardIdentity + ?Sized>(
        p: &mut P,
        fmap_offset: u32,
        gvd_offset: u32,
    ) -> Result<GvdHeader, ChainError> {
        let mut raw = [0u8; GVD_HEADER_SIZE];
        p.ap_read(gvd_offset, &mut raw)?;
        let header: GvdHeader = read_pod(&raw, 0)?;
        header.check()?;
        if header.fmap_location != fmap_offset {
            return Err(ChainError::LocationMismatch { fmap: fmap_offset, claimed: header.fmap_location });
        }
        let fused = p.board_id_type()?;
        if fused != header.board_id {
            return Err(ChainError::BoardIdMismatch { fused, claimed: header.board_id });
        }
        Ok(header)
    }

    pub fn read_ranges<A: ApFlash + ?Sized>(
        flash: &mut A,
        gvd_offset: u32,
        header: GvdHeader,
    ) -> Result<Self, ChainError> {
        let mut raw = vec![0u8; header.ranges_len()];
        flash.ap_read(at(gvd_offset, GVD_HEADER_SIZE as u32)?, &mut raw)?;
        Ok(GvdContainer { offset: gvd_offset, header, ranges: parse_ranges(&raw)? })
    }

    pub fn read<P: ApFlash + BoardIdentity + ?Sized>(
        p: &mut P,
        fmap_offset: u32,
        gvd_offset: u32,
    ) -> Result<Self, ChainError> {
        let header = Self::read_header(p, fmap_offset, gvd_offset)?;
        Self::read_ranges(p, gvd_offset, header)
    }

    /// SHA-256 over the header and ranges, as cached in the record page.
    pub fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(bytemuck::bytes_of(&self.header));
        hasher.update(bytemuck::cast_slice::<RoRange, u8>(&self.ranges));
        hasher.finalize().into()
    }

    /// The key block immediately follows the blob.
    pub fn keyblock_offset(&self) -> Result<u32, FlashError> { at(self.offset, self.header.size as u32) }
}

fn read_keyblock<A: ApFlash + ?Sized>(flash: &mut A, offset: u32) -> Result<Keyblock, ChainError> {
    let mut raw = vec![0u8; KEYBLOCK_HEADER_SIZE];
    flash.ap_read(offset, &mut raw)?;
    let header: Vb2KeyblockHeader = read_pod(&raw, 0)?;
    header.check_magic_and_size()?;
    raw.resize(header.keyblock_size as usize, 0);
    flash.ap_read(at(offset, KEYBLOCK_HEADER_SIZE as u32)?, &mut raw[KEYBLOCK_HEADER_SIZE..])?;
    Ok(Keyblock::parse(raw)?)
}

/// Reads the root key body the GVD points at and accepts it only if it hashes
/// to the pinned value.
fn read_root_key<A: ApFlash + ?Sized>(
    flash: &mut A,
    gvdc: &GvdContainer,
    root_key_hash: &Digest,
) -> Result<PublicKey, ChainError> {
    let key = gvdc.header.root_key_header;
    let mut body = vec![0u8; key.key_size as usize];
    flash.ap_read(at(at(gvdc.offset, GVD_ROOT_KEY_HEADER_OFFSET)?, key.key_offset)?, &mut body)?;
    if !bool::from(Sha256::digest(&body).as_slice().ct_eq(root_key_hash)) {
        return Err(ChainError::RootKeyHashMismatch);
    }
    Ok(PublicKey::unpack(&key, &body)?)
}

fn read_gvd_signature<A: ApFlash + ?Sized>(flash: &mut A, gvdc: &GvdContainer) -> Result<Vec<u8>, ChainError> {
    let sig = gvdc.header.sig_header;
    let mut body = vec![0u8; sig.sig_size as usize];
    flash.ap_read(at(at(gvdc.offset, GVD_SIG_HEADER_OFFSET)?, sig.sig_offset)?, &mut body)?;
    Ok(body)
}

/// Walks the signature chain for a GVD whose header and ranges are already
/// in hand, finishing with the digest of the protected ranges.
fn verify_chain<A: ApFlash + ?Sized>(
    flash: &mut A,
    config: &VerifierConfig,
    gvdc: &GvdContainer,
) -> Result<(), ChainError> {
    let keyblock = read_keyblock(flash, gvdc.keyblock_offset()?)?;
    let data_key = PublicKey::unpack(&keyblock.header().data_key, keyblock.data_key_body())?;

    let root_key = read_root_key(flash, gvdc, &config.root_key_hash)?;
    if !root_key.verify(&[keyblock.signed_data()], keyblock.signature()) {
        return Err(ChainError::KeyblockSignature);
    }
    log::info!("keyblock OK");

    let signature = read_gvd_signature(flash, gvdc)?;
    let signed: [&[u8]; 2] = [bytemuck::bytes_of(&gvdc.header), bytemuck::cast_slice(&gvdc.ranges)];
    if !data_key.verify(&signed, &signature) {
        return Err(ChainError::GvdSignature);
    }
    log::info!("GVD OK");

    match validate_ranges(flash, &gvdc.ranges, gvdc.header.sha256_digest()) {
        Verdict::Succeeded => Ok(()),
        _ => Err(ChainError::RangesDigest),
    }
}

/// Fully verifies the GVD at `gvd_offset` found through the FMAP at
/// `fmap_offset`, and on success caches it for the next boot.
///
/// Returns `NotFound` if the header does not describe a GVD for this board at
/// this location.
pub fn check_gscvd<P: Platform + ?Sized>(
    p: &mut P,
    config: &VerifierConfig,
    fmap_offset: u32,
    gvd_offset: u32,
) -> Verdict {
    let header = match GvdContainer::read_header(p, fmap_offset, gvd_offset) {
        Ok(header) => header,
        Err(e) => {
            log::warn!("inconsistent GSCVD at {:x}: {}", gvd_offset, e);
            return Verdict::NotFound;
        }
    };
    let verified = match GvdContainer::read_ranges(p, gvd_offset, header) {
        Ok(gvdc) => verify_chain(p, config, &gvdc).map(|_| gvdc),
        Err(e) => Err(e),
    };
    let gvdc = match verified {
        Ok(gvdc) => gvdc,
        Err(e) => {
            log::error!("GSCVD at {:x} rejected: {}", gvd_offset, e);
            return Verdict::Failed;
        }
    };

    let rollback = gvdc.header.rollback_counter as u32;
    if rollback < LOWEST_ACCEPTABLE_ROLLBACK {
        log::error!("{}", ChainError::Rollback(rollback));
        return Verdict::Failed;
    }

    if !check_is_required(p) {
        // from now on only signed images are allowed
        match require_future_checks(p) {
            Ok(()) => log::info!("AP RO verification is now required"),
            Err(e) => log::error!("{}", ChainError::Storage(e)),
        }
    }

    match cache::save(p, &gvdc) {
        Ok(()) => log::info!("GVD hash saved"),
        Err(e) => log::error!("GVD hash not saved: {}", e),
    }
    Verdict::Succeeded
}

/// Looks for the RO_GSCVD area in the table of `nareas` entries at `offset`.
fn find_gscvd<A: ApFlash + ?Sized>(flash: &mut A, mut offset: u32, nareas: u16) -> Option<FmapArea> {
    if nareas > FMAP_MAX_AREAS {
        log::warn!("too many areas: {}", nareas);
        return None;
    }
    for _ in 0..nareas {
        let mut raw = [0u8; FMAP_AREA_SIZE];
        if let Err(e) = flash.ap_read(offset, &mut raw) {
            log::error!("FMAP area read at {:x} failed: {}", offset, e);
            return None;
        }
        let area = FmapArea::parse(&raw);
        if area.is_named(GSCVD_AREA_NAME) {
            return Some(area);
        }
        offset += FMAP_AREA_SIZE as u32;
    }
    log::warn!("could not find RO_GSCVD area");
    None
}

/// Scans AP flash for FMAPs and tries every RO_GSCVD area they name until one
/// verifies.
///
/// `NotFound` means no FMAP named such an area, so V2 is not provisioned.
/// `Failed` means at least one area was found but none verified.
pub fn scan_and_verify<P: Platform + ?Sized>(p: &mut P, config: &VerifierConfig) -> Verdict {
    let mut gscvd_found = false;

    for offset in (0..MAX_SUPPORTED_FLASH_SIZE).step_by(LOWEST_FMAP_ALIGNMENT as usize) {
        let mut raw = [0u8; FMAP_HEADER_SIZE];
        let (signature, rest) = raw.split_at_mut(FMAP_SIGNATURE.len());
        if let Err(e) = p.ap_read(offset, signature) {
            log::error!("AP flash read at {:x} failed: {}", offset, e);
            return Verdict::Failed;
        }
        if *signature != FMAP_SIGNATURE {
            continue;
        }
        if let Err(e) = p.ap_read(offset + FMAP_SIGNATURE.len() as u32, rest) {
            log::error!("AP flash read at {:x} failed: {}", offset, e);
            return Verdict::Failed;
        }

        let fmap = FmapHeader::parse(&raw);
        if !fmap.is_valid() {
            log::warn!("invalid FMAP contents at {:x}", offset);
            continue;
        }
        let area = match find_gscvd(p, offset + FMAP_HEADER_SIZE as u32, fmap.nareas) {
            Some(area) => area,
            None => continue,
        };
        gscvd_found = true;

        if check_gscvd(p, config, offset, area.offset) == Verdict::Succeeded {
            return Verdict::Succeeded;
        }
    }

    if gscvd_found { Verdict::Failed } else { Verdict::NotFound }
}
