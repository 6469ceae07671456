//! The `ap_ro_info` console command.
use alloc::string::String;
use core::fmt::Write;

use crate::api::*;
use crate::config::VerifierConfig;
use crate::error::FlashError;
use crate::hal::Platform;
use crate::record::{CheckRecord, RecordStore};
use crate::verifier::ApRoVerifier;

pub const HELP: &str = "ap_ro_info [erase]";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    ParamCount,
    Param1,
    /// The record page is unreadable or fails its integrity check.
    Crc,
    Flash(FlashError),
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConsoleError::ParamCount => write!(f, "wrong number of params, usage: {}", HELP),
            ConsoleError::Param1 => write!(f, "parameter 1 invalid, usage: {}", HELP),
            ConsoleError::Crc => write!(f, "AP RO record corrupted"),
            ConsoleError::Flash(e) => write!(f, "{}", e),
        }
    }
}

impl<P: Platform> ApRoVerifier<P> {
    /// Prints the latched result and the contents of the record. Development
    /// builds also take `erase`, which clears the record.
    pub fn ap_ro_info(&mut self, args: &str, out: &mut String) -> Result<(), ConsoleError> {
        let args: alloc::vec::Vec<&str> = args.split_whitespace().collect();
        match args.len() {
            0 => {}
            1 if VerifierConfig::dev_build() => {
                if !args[0].eq_ignore_ascii_case("erase") {
                    return Err(ConsoleError::Param1);
                }
                RecordStore::new(self.platform_mut()).erase().map_err(ConsoleError::Flash)?;
                log::info!("AP RO record erased");
                return Ok(());
            }
            _ => return Err(ConsoleError::ParamCount),
        }

        let support = self.check_unsupported(false);
        writeln!(out, "result    : {}", self.status() as u8).ok();
        writeln!(out, "supported : {}", if support == Arcve::Ok { "yes" } else { "no" }).ok();
        match support {
            Arcve::Ok => {}
            Arcve::FlashReadFailed => return Err(ConsoleError::Crc),
            _ => return Ok(()),
        }

        let record = RecordStore::new(self.platform_mut()).load().map_err(ConsoleError::Flash)?;
        match record.decode() {
            Some(CheckRecord::Factory(factory)) => {
                writeln!(out, "sha256 hash {}", hex::encode(factory.digest)).ok();
                writeln!(out, "Covered ranges:").ok();
                for range in &factory.ranges {
                    let last = range.offset.wrapping_add(range.size).wrapping_sub(1);
                    writeln!(out, "{:08x}...{:08x}", range.offset, last).ok();
                }
            }
            Some(CheckRecord::Gscvd(descriptor)) => {
                writeln!(out, "gvd digest  {}", hex::encode(descriptor.digest)).ok();
                writeln!(out, "fmap offset : {:08x}", descriptor.fmap_offset).ok();
                writeln!(out, "gvd offset  : {:08x}", descriptor.gvd_offset).ok();
                writeln!(out, "rollback    : {}", descriptor.rollback).ok();
            }
            None => return Err(ConsoleError::Crc),
        }
        Ok(())
    }
}
