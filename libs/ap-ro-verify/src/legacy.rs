//! V1 verification: a factory-seeded digest over a list of ranges.
use alloc::vec::Vec;

use crate::api::*;
use crate::config::VerifierConfig;
use crate::hal::{ApFlash, BoardIdentity, RecordFlash, BOARD_ID_TYPE_BLANK};
use crate::hasher::validate_ranges;
use crate::record::{CheckRecord, FactoryRecord, RecordError, RecordStore, StoredRecord, RECORD_HEADER_SIZE};

/// Checks AP flash against a V1 record.
///
/// `NotFound` means the page is blank or holds a V2 descriptor, so the other
/// scheme should be tried.
pub fn verify<A: ApFlash + ?Sized>(flash: &mut A, record: &StoredRecord) -> Verdict {
    if !record.is_programmed() {
        return Verdict::NotFound;
    }
    match record.factory() {
        Ok(factory) => validate_ranges(flash, &factory.ranges, &factory.digest),
        Err(RecordError::WrongScheme) => Verdict::NotFound,
        Err(e) => {
            log::error!("V1 record unusable: {:?}", e);
            Verdict::Failed
        }
    }
}

impl FactoryRecord {
    /// Decodes a seeding payload of `digest || ranges`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Arcve> {
        if payload.len() < SHA256_DIGEST_SIZE + RO_RANGE_SIZE {
            return Err(Arcve::TooShort);
        }
        let (digest, ranges) = payload.split_at(SHA256_DIGEST_SIZE);
        if ranges.len() % RO_RANGE_SIZE != 0 {
            return Err(Arcve::BadPayloadSize);
        }
        if ranges.len() / RO_RANGE_SIZE > APRO_MAX_NUM_RANGES {
            return Err(Arcve::TooManyRanges);
        }
        let ranges: Vec<RoRange> = ranges.chunks_exact(RO_RANGE_SIZE).map(bytemuck::pod_read_unaligned).collect();
        for range in &ranges {
            if range.size > MAX_SUPPORTED_RANGE_SIZE {
                return Err(Arcve::BadRangeSize);
            }
            if !range.end().map(|end| end <= MAX_SUPPORTED_FLASH_SIZE).unwrap_or(false) {
                return Err(Arcve::BadOffset);
            }
        }
        let mut record = FactoryRecord { digest: [0u8; SHA256_DIGEST_SIZE], ranges };
        record.digest.copy_from_slice(digest);
        Ok(record)
    }
}

/// Once the board ID type is written the unit has left the factory and the
/// record can no longer be changed. Development builds skip the lockout.
fn seeding_allowed<B: BoardIdentity + ?Sized>(board: &mut B) -> bool {
    if VerifierConfig::dev_build() {
        return true;
    }
    match board.board_id_type() {
        Ok(id_type) => id_type == BOARD_ID_TYPE_BLANK,
        Err(e) => {
            log::error!("can't read board ID: {}", e);
            false
        }
    }
}

/// Programs the V1 record from a seeding payload. An empty payload erases the
/// record instead.
pub fn seed<P: BoardIdentity + RecordFlash + ?Sized>(platform: &mut P, payload: &[u8]) -> Result<(), Arcve> {
    if !seeding_allowed(platform) {
        return Err(Arcve::BidProgrammed);
    }

    if payload.is_empty() {
        return RecordStore::new(platform).erase().map_err(|e| {
            log::error!("erasing AP RO record: {}", e);
            Arcve::FlashEraseFailed
        });
    }

    let record = FactoryRecord::from_payload(payload)?;

    let mut store = RecordStore::new(platform);
    match store.is_blank(RECORD_HEADER_SIZE + payload.len()) {
        Ok(true) => {}
        Ok(false) => return Err(Arcve::AlreadyProgrammed),
        Err(e) => {
            log::error!("reading AP RO record: {}", e);
            return Err(Arcve::AlreadyProgrammed);
        }
    }
    store.write(&CheckRecord::Factory(record)).map_err(|e| {
        log::error!("programming AP RO record: {}", e);
        Arcve::FlashWriteFailed
    })?;
    log::info!("AP RO record seeded with {} ranges", (payload.len() - SHA256_DIGEST_SIZE) / RO_RANGE_SIZE);
    Ok(())
}
