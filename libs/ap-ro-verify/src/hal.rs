//! Interfaces to the hardware and firmware services the verifier depends on.
//!
//! A platform implements every trait here; [`Platform`] is the bundle the
//! verifier is generic over. The reset line is also handed separately to the
//! reset hold task, so implementations of [`ResetLine`] are expected to be
//! cheap handles onto the same GPIO.
use sha2::{Digest as _, Sha256};

use crate::api::{ApRoEvent, FLASH_READ_CHUNK, MAX_SUPPORTED_RANGE_SIZE};
use crate::error::FlashError;

/// Read-only access to AP flash through the controller's SPI passthrough.
pub trait ApFlash {
    /// Fills `buf` from AP flash starting at `offset`. Requests longer than
    /// `MAX_SUPPORTED_RANGE_SIZE` are refused.
    fn ap_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Feeds `len` bytes of AP flash at `offset` into `hasher`.
    ///
    /// The default streams the range one chunk at a time through `ap_read`;
    /// transports with a hashing shortcut can override it.
    fn ap_hash_update(&mut self, hasher: &mut Sha256, offset: u32, len: u32) -> Result<(), FlashError> {
        if len > MAX_SUPPORTED_RANGE_SIZE {
            return Err(FlashError::OutOfRange);
        }
        let end = offset.checked_add(len).ok_or(FlashError::OutOfRange)?;
        let mut buf = [0u8; FLASH_READ_CHUNK];
        for chunk in (offset..end).step_by(FLASH_READ_CHUNK) {
            let valid_length =
                if chunk as usize + FLASH_READ_CHUNK < end as usize { FLASH_READ_CHUNK } else { (end - chunk) as usize };
            self.ap_read(chunk, &mut buf[..valid_length])?;
            hasher.update(&buf[..valid_length]);
        }
        Ok(())
    }
}

/// The controller's own flash: the fixed record page, and the info-flash word
/// that makes verification mandatory.
pub trait RecordFlash {
    fn record_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;
    /// Opens the write window over the first `len` bytes of the record page.
    fn open_window(&mut self, len: usize);
    fn close_window(&mut self);
    /// Erases the whole record page back to all ones.
    fn record_erase(&mut self) -> Result<(), FlashError>;
    fn record_write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError>;
    /// Reads the "AP RO verification required" info word. Zero means required.
    fn aprv_read(&mut self) -> Result<u32, FlashError>;
    fn aprv_write(&mut self, value: u32) -> Result<(), FlashError>;
}

/// Value of a board ID type that has never been written.
pub const BOARD_ID_TYPE_BLANK: u32 = 0xFFFF_FFFF;

pub trait BoardIdentity {
    /// The fused board ID type.
    fn board_id_type(&mut self) -> Result<u32, FlashError>;
    /// Board policy disabling AP RO verification for this unit.
    fn ap_ro_blocked(&mut self) -> bool;
}

/// Append-only audit log that survives the controller rebooting.
pub trait EventLog {
    fn add_event(&mut self, event: ApRoEvent);
}

pub trait ResetLine {
    fn assert_reset(&mut self);
    fn deassert_reset(&mut self);
    /// Keeps the controller from sleeping while the reset is being held.
    fn inhibit_sleep(&mut self, inhibit: bool);
}

/// Case-closed debugging capability gate.
pub trait CcdPolicy {
    fn ap_ro_check_allowed(&mut self) -> bool;
}

pub trait Platform: ApFlash + RecordFlash + BoardIdentity + EventLog + ResetLine + CcdPolicy {}
impl<T: ApFlash + RecordFlash + BoardIdentity + EventLog + ResetLine + CcdPolicy> Platform for T {}
