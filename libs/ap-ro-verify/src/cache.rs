//! Fast-path verification against a GVD verified on a previous boot.
//!
//! After a full chain verification succeeds, the location of the GVD and a
//! digest of its header and ranges are stored in the record page. On later
//! boots an unchanged GVD only needs its ranges rehashed; no signature is
//! checked.
use subtle::ConstantTimeEq;

use crate::api::*;
use crate::chain::GvdContainer;
use crate::error::ChainError;
use crate::hal::{ApFlash, BoardIdentity, RecordFlash};
use crate::hasher::validate_ranges;
use crate::record::{CheckRecord, GvdDescriptor, RecordStore};

/// Checks AP flash against a cached descriptor.
///
/// `NotFound` means the cached location no longer holds a GVD and a full scan
/// is needed. A GVD that is present but differs from the cached one is
/// `Failed`, which the caller also answers with a full scan.
pub fn check_cache<P: ApFlash + BoardIdentity + ?Sized>(p: &mut P, descriptor: &GvdDescriptor) -> Verdict {
    if descriptor.rollback < LOWEST_ACCEPTABLE_ROLLBACK {
        log::error!("cached rollback counter {} too low", descriptor.rollback);
        return Verdict::Failed;
    }
    let gvdc = match GvdContainer::read(p, descriptor.fmap_offset, descriptor.gvd_offset) {
        Ok(gvdc) => gvdc,
        Err(e) => {
            log::warn!("cached GVD at {:x} unavailable: {}", descriptor.gvd_offset, e);
            return Verdict::NotFound;
        }
    };
    if !bool::from(gvdc.digest().as_slice().ct_eq(&descriptor.digest)) {
        log::warn!("{}", ChainError::CacheMismatch);
        return Verdict::Failed;
    }
    validate_ranges(p, &gvdc.ranges, gvdc.header.sha256_digest())
}

/// Replaces the record page with a descriptor of `gvdc`.
pub fn save<F: RecordFlash + ?Sized>(flash: &mut F, gvdc: &GvdContainer) -> Result<(), ChainError> {
    let rollback = gvdc.header.rollback_counter as u32;
    if rollback < LOWEST_ACCEPTABLE_ROLLBACK {
        return Err(ChainError::Rollback(rollback));
    }
    let descriptor = GvdDescriptor {
        fmap_offset: gvdc.header.fmap_location,
        gvd_offset: gvdc.offset,
        rollback,
        digest: gvdc.digest(),
    };

    let mut store = RecordStore::new(flash);
    let current = store.load().map_err(ChainError::Storage)?;
    if current.v2_entry() == Some(descriptor) {
        return Ok(());
    }
    if current.is_programmed() {
        store.erase().map_err(ChainError::Storage)?;
    }
    store.write(&CheckRecord::Gscvd(descriptor)).map_err(ChainError::Storage)
}
