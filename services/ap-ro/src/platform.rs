//! Emulated hardware for the verifier.
//!
//! AP flash is an image file and the record page plus the "verification
//! required" word live in a second file, so state persists across runs the way
//! the controller's flash would. On a Xous target without those files both
//! start out erased.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ap_ro_verify::hal::*;
use ap_ro_verify::{ApRoEvent, FlashError, MAX_SUPPORTED_RANGE_SIZE, RECORD_SPACE_SIZE};

pub const FLASH_IMAGE_VAR: &str = "AP_RO_FLASH_IMAGE";
pub const RECORD_FILE_VAR: &str = "AP_RO_RECORD_FILE";
pub const BOARD_ID_VAR: &str = "AP_RO_BOARD_ID";
#[cfg(not(target_os = "xous"))]
const DEFAULT_FLASH_IMAGE: &str = "ap_flash.bin";
#[cfg(not(target_os = "xous"))]
const DEFAULT_RECORD_FILE: &str = "ap_ro_record.bin";

/// The AP reset and sleep inhibit, shared between the verifier and the reset
/// hold thread.
#[derive(Clone, Default)]
pub struct EmuResetLine {
    asserted: Arc<AtomicBool>,
    sleep_inhibited: Arc<AtomicBool>,
}

impl ResetLine for EmuResetLine {
    fn assert_reset(&mut self) {
        if !self.asserted.swap(true, Ordering::SeqCst) {
            log::warn!("AP held in reset");
        }
    }

    fn deassert_reset(&mut self) {
        if self.asserted.swap(false, Ordering::SeqCst) {
            log::info!("AP released from reset");
        }
    }

    fn inhibit_sleep(&mut self, inhibit: bool) { self.sleep_inhibited.store(inhibit, Ordering::SeqCst); }
}

pub struct EmuPlatform {
    ap: Vec<u8>,
    record: Vec<u8>,
    aprv: u32,
    record_path: Option<String>,
    window: Option<usize>,
    board_id_type: u32,
    line: EmuResetLine,
}

impl EmuPlatform {
    #[allow(unused_mut)]
    pub fn new() -> Self {
        let mut platform = EmuPlatform {
            ap: Vec::new(),
            record: vec![0xff; RECORD_SPACE_SIZE],
            aprv: 0xffff_ffff,
            record_path: None,
            window: None,
            board_id_type: BOARD_ID_TYPE_BLANK,
            line: EmuResetLine::default(),
        };
        #[cfg(not(target_os = "xous"))]
        platform.load_files();
        platform
    }

    #[cfg(not(target_os = "xous"))]
    fn load_files(&mut self) {
        let image = std::env::var(FLASH_IMAGE_VAR).unwrap_or_else(|_| DEFAULT_FLASH_IMAGE.to_owned());
        match std::fs::read(&image) {
            Ok(ap) => {
                log::info!("AP flash image {} ({} bytes)", image, ap.len());
                self.ap = ap;
            }
            Err(e) => log::warn!("no AP flash image at {}: {:?}", image, e),
        }

        let record = std::env::var(RECORD_FILE_VAR).unwrap_or_else(|_| DEFAULT_RECORD_FILE.to_owned());
        if let Ok(raw) = std::fs::read(&record) {
            if raw.len() == RECORD_SPACE_SIZE + 4 {
                let (page, aprv) = raw.split_at(RECORD_SPACE_SIZE);
                self.record.copy_from_slice(page);
                self.aprv = u32::from_le_bytes([aprv[0], aprv[1], aprv[2], aprv[3]]);
            } else {
                log::warn!("ignoring {}: unexpected size {}", record, raw.len());
            }
        }
        self.record_path = Some(record);

        if let Ok(id) = std::env::var(BOARD_ID_VAR) {
            match u32::from_str_radix(id.trim_start_matches("0x"), 16) {
                Ok(id) => self.board_id_type = id,
                Err(_) => log::warn!("{} is not a hex board ID: {}", BOARD_ID_VAR, id),
            }
        }
    }

    /// A handle onto the same reset line, for the reset hold thread.
    pub fn reset_line(&self) -> EmuResetLine { self.line.clone() }

    fn persist(&self) -> Result<(), FlashError> {
        let path = match &self.record_path {
            Some(path) => path,
            None => return Ok(()),
        };
        let mut raw = self.record.clone();
        raw.extend_from_slice(&self.aprv.to_le_bytes());
        std::fs::write(path, raw).map_err(|e| {
            log::error!("can't write {}: {:?}", path, e);
            FlashError::WriteFailed
        })
    }
}

impl ApFlash for EmuPlatform {
    fn ap_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if buf.len() > MAX_SUPPORTED_RANGE_SIZE as usize {
            return Err(FlashError::OutOfRange);
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.ap.get(offset as usize + i).copied().unwrap_or(0xff);
        }
        Ok(())
    }
}

impl RecordFlash for EmuPlatform {
    fn record_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        let end = offset.checked_add(buf.len()).ok_or(FlashError::OutOfRange)?;
        buf.copy_from_slice(self.record.get(offset..end).ok_or(FlashError::OutOfRange)?);
        Ok(())
    }

    fn open_window(&mut self, len: usize) { self.window = Some(len); }

    fn close_window(&mut self) { self.window = None; }

    fn record_erase(&mut self) -> Result<(), FlashError> {
        if self.window.is_none() {
            return Err(FlashError::WindowClosed);
        }
        self.record.iter_mut().for_each(|b| *b = 0xff);
        self.persist().map_err(|_| FlashError::EraseFailed)
    }

    fn record_write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError> {
        match self.window {
            Some(len) if offset + data.len() <= len => {}
            _ => return Err(FlashError::WindowClosed),
        }
        for (dst, src) in self.record[offset..offset + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        self.persist()
    }

    fn aprv_read(&mut self) -> Result<u32, FlashError> { Ok(self.aprv) }

    fn aprv_write(&mut self, value: u32) -> Result<(), FlashError> {
        self.aprv &= value;
        self.persist()
    }
}

impl BoardIdentity for EmuPlatform {
    fn board_id_type(&mut self) -> Result<u32, FlashError> { Ok(self.board_id_type) }

    fn ap_ro_blocked(&mut self) -> bool { false }
}

impl EventLog for EmuPlatform {
    fn add_event(&mut self, event: ApRoEvent) { log::info!("event: {:?}", event); }
}

impl ResetLine for EmuPlatform {
    fn assert_reset(&mut self) { self.line.assert_reset(); }

    fn deassert_reset(&mut self) { self.line.deassert_reset(); }

    fn inhibit_sleep(&mut self, inhibit: bool) { self.line.inhibit_sleep(inhibit); }
}

impl CcdPolicy for EmuPlatform {
    fn ap_ro_check_allowed(&mut self) -> bool { true }
}
