//! The check record kept in the controller's own flash.
//!
//! One fixed page holds a header followed by either the factory (V1) payload
//! or the GVD cache descriptor (V2):
//!
//! ```text
//! | version u8 | type u8 | num_ranges u16 | checksum u32 |
//! | V1: digest[32] || ranges[num_ranges]                 |
//! | V2: fmap_offset u32 | gvd_offset u32 | rollback u32 | digest[32] |
//! ```
//!
//! An unprogrammed page reads as all ones. The record is never patched in
//! place: it is erased and then written as a whole.
use alloc::vec::Vec;
use core::mem::size_of;

use bytemuck::{Pod, Zeroable};
use sha2::{Digest as _, Sha256};

use crate::api::*;
use crate::error::FlashError;
use crate::formats::read_pod;
use crate::hal::RecordFlash;

pub const LAYOUT_VERSION_0: u8 = 0;
pub const LAYOUT_VERSION_1: u8 = 1;
pub const TYPE_FACTORY: u8 = 0;
pub const TYPE_GSCVD: u8 = 1;
const UNPROGRAMMED_RANGES: u16 = 0xffff;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct RecordHeader {
    pub version: u8,
    pub scheme: u8,
    /// Unused for V2 records.
    pub num_ranges: u16,
    pub checksum: u32,
}
pub const RECORD_HEADER_SIZE: usize = size_of::<RecordHeader>();

/// Cached result of a successful full GVD verification.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct GvdDescriptor {
    pub fmap_offset: u32,
    pub gvd_offset: u32,
    pub rollback: u32,
    /// SHA-256 over the GVD header and ranges array.
    pub digest: Digest,
}
pub const DESCRIPTOR_SIZE: usize = size_of::<GvdDescriptor>();

/// Largest body the page is ever asked to hold.
pub const MAX_BODY_SIZE: usize = SHA256_DIGEST_SIZE + RO_RANGE_SIZE * APRO_MAX_NUM_RANGES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryRecord {
    pub digest: Digest,
    pub ranges: Vec<RoRange>,
}

impl FactoryRecord {
    /// `digest || ranges`, as sent by the seeding command and stored on flash.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(SHA256_DIGEST_SIZE + RO_RANGE_SIZE * self.ranges.len());
        payload.extend_from_slice(&self.digest);
        payload.extend_from_slice(bytemuck::cast_slice(&self.ranges));
        payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRecord {
    Factory(FactoryRecord),
    Gscvd(GvdDescriptor),
}

impl CheckRecord {
    fn header_and_body(&self) -> (RecordHeader, Vec<u8>) {
        let (scheme, num_ranges, body) = match self {
            CheckRecord::Factory(f) => (TYPE_FACTORY, f.ranges.len() as u16, f.payload()),
            CheckRecord::Gscvd(d) => (TYPE_GSCVD, 0, bytemuck::bytes_of(d).to_vec()),
        };
        let mut header = RecordHeader { version: LAYOUT_VERSION_1, scheme, num_ranges, checksum: 0 };
        header.checksum = checksum(&header, &body);
        (header, body)
    }

    /// The exact bytes written to the page.
    pub fn encode(&self) -> Vec<u8> {
        let (header, body) = self.header_and_body();
        let mut raw = bytemuck::bytes_of(&header).to_vec();
        raw.extend_from_slice(&body);
        raw
    }
}

/// Truncated SHA-256 over the header fields preceding the checksum and the
/// record body.
pub fn checksum(header: &RecordHeader, body: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update([header.version, header.scheme]);
    hasher.update(header.num_ranges.to_le_bytes());
    hasher.update(body);
    let digest = hasher.finalize();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Why a programmed page does not hold a usable factory record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordError {
    WrongScheme,
    BogusRangeCount(u16),
    Checksum,
}

/// Snapshot of the record page.
#[derive(Clone)]
pub struct StoredRecord {
    header: RecordHeader,
    body: [u8; MAX_BODY_SIZE],
}

impl StoredRecord {
    pub fn header(&self) -> &RecordHeader { &self.header }

    pub fn is_programmed(&self) -> bool { self.header.num_ranges != UNPROGRAMMED_RANGES }

    /// The V2 descriptor, if the page holds an intact one.
    pub fn v2_entry(&self) -> Option<GvdDescriptor> {
        if self.header.version < LAYOUT_VERSION_1 || self.header.scheme != TYPE_GSCVD {
            return None;
        }
        let body = &self.body[..DESCRIPTOR_SIZE];
        if checksum(&self.header, body) != self.header.checksum {
            log::warn!("descriptor checksum mismatch");
            return None;
        }
        read_pod(body, 0).ok()
    }

    /// The V1 record, checked against its stored checksum.
    pub fn factory(&self) -> Result<FactoryRecord, RecordError> {
        if self.header.scheme != TYPE_FACTORY {
            return Err(RecordError::WrongScheme);
        }
        let count = self.header.num_ranges as usize;
        if count > APRO_MAX_NUM_RANGES {
            log::warn!("bogus number of ranges {}", count);
            return Err(RecordError::BogusRangeCount(self.header.num_ranges));
        }
        let body = &self.body[..SHA256_DIGEST_SIZE + RO_RANGE_SIZE * count];
        if checksum(&self.header, body) != self.header.checksum {
            log::warn!("AP RO checksum corrupted");
            return Err(RecordError::Checksum);
        }
        let mut digest = [0u8; SHA256_DIGEST_SIZE];
        digest.copy_from_slice(&body[..SHA256_DIGEST_SIZE]);
        let ranges = body[SHA256_DIGEST_SIZE..].chunks_exact(RO_RANGE_SIZE).map(bytemuck::pod_read_unaligned).collect();
        Ok(FactoryRecord { digest, ranges })
    }

    /// Whichever record the page holds, if intact.
    pub fn decode(&self) -> Option<CheckRecord> {
        if let Some(descriptor) = self.v2_entry() {
            return Some(CheckRecord::Gscvd(descriptor));
        }
        self.factory().ok().map(CheckRecord::Factory)
    }
}

/// Access to the record page through the controller flash driver.
pub struct RecordStore<'a, F: RecordFlash + ?Sized> {
    flash: &'a mut F,
}

impl<'a, F: RecordFlash + ?Sized> RecordStore<'a, F> {
    pub fn new(flash: &'a mut F) -> Self { RecordStore { flash } }

    pub fn load(&mut self) -> Result<StoredRecord, FlashError> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.flash.record_read(0, &mut header)?;
        let mut body = [0u8; MAX_BODY_SIZE];
        self.flash.record_read(RECORD_HEADER_SIZE, &mut body)?;
        Ok(StoredRecord { header: bytemuck::pod_read_unaligned(&header), body })
    }

    /// True if the first `len` bytes of the page are still erased.
    pub fn is_blank(&mut self, len: usize) -> Result<bool, FlashError> {
        let mut raw = alloc::vec![0u8; len.min(RECORD_SPACE_SIZE)];
        self.flash.record_read(0, &mut raw)?;
        Ok(len <= RECORD_SPACE_SIZE && raw.iter().all(|&b| b == 0xff))
    }

    pub fn erase(&mut self) -> Result<(), FlashError> {
        self.flash.open_window(RECORD_SPACE_SIZE);
        let rv = self.flash.record_erase();
        self.flash.close_window();
        rv
    }

    /// Programs the header and then the body inside a single write window.
    /// The page must already be erased.
    pub fn write(&mut self, record: &CheckRecord) -> Result<(), FlashError> {
        let (header, body) = record.header_and_body();
        self.flash.open_window(RECORD_HEADER_SIZE + body.len());
        let rv = self
            .flash
            .record_write(0, bytemuck::bytes_of(&header))
            .and_then(|_| self.flash.record_write(RECORD_HEADER_SIZE, &body));
        self.flash.close_window();
        rv
    }
}

/// Verification becomes mandatory once the info word is cleared. A word that
/// can't be read counts as cleared.
pub fn check_is_required<F: RecordFlash + ?Sized>(flash: &mut F) -> bool {
    !matches!(flash.aprv_read(), Ok(value) if value != 0)
}

/// Clears the info word. There is no way back short of reprovisioning.
pub fn require_future_checks<F: RecordFlash + ?Sized>(flash: &mut F) -> Result<(), FlashError> {
    flash.aprv_write(0)
}
