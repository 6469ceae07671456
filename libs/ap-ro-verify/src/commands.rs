//! Vendor command handlers: seed, validate, get hash, get status.
use alloc::vec;
use alloc::vec::Vec;

use crate::api::*;
use crate::hal::Platform;
use crate::legacy;
use crate::record::{CheckRecord, RecordStore};
use crate::verifier::ApRoVerifier;

/// Where a command came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandSource {
    /// The host through the TPM transport, subject to the CCD policy.
    Host,
    /// The trusted alternate interface, always allowed.
    AltInterface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub rc: VendorRc,
    pub data: Vec<u8>,
}

impl Response {
    fn ok(data: Vec<u8>) -> Self { Response { rc: VendorRc::Success, data } }

    fn err(rc: VendorRc) -> Self { Response { rc, data: Vec::new() } }

    /// An error return carrying the detailed code as its only byte.
    fn arcve(rc: VendorRc, code: Arcve) -> Self { Response { rc, data: vec![code as u8] } }
}

fn seed_rc(code: Arcve) -> VendorRc {
    match code {
        Arcve::BidProgrammed | Arcve::AlreadyProgrammed => VendorRc::NotAllowed,
        Arcve::TooShort
        | Arcve::BadPayloadSize
        | Arcve::TooManyRanges
        | Arcve::BadRangeSize
        | Arcve::BadOffset => VendorRc::BogusArgs,
        Arcve::FlashWriteFailed => VendorRc::WriteFlashFail,
        _ => VendorRc::InternalError,
    }
}

impl<P: Platform> ApRoVerifier<P> {
    /// Programs (or, given an empty payload, erases) the factory record.
    pub fn seed(&mut self, payload: &[u8]) -> Response {
        match legacy::seed(self.platform_mut(), payload) {
            Ok(()) => Response::ok(Vec::new()),
            Err(code) => {
                log::warn!("AP RO seed rejected: {:?}", code);
                Response::arcve(seed_rc(code), code)
            }
        }
    }

    /// Runs verification on request. The single response byte is the
    /// [`CheckOutcome`].
    pub fn validate(&mut self, source: CommandSource) -> Response {
        if source != CommandSource::AltInterface && !self.platform_mut().ap_ro_check_allowed() {
            log::warn!("AP RO check not allowed");
            return Response::err(VendorRc::NotAllowed);
        }
        self.platform_mut().add_event(ApRoEvent::CheckTriggered);
        let outcome = self.run_check();
        Response::ok(vec![outcome as u8])
    }

    /// Returns the digest the unit is checked against.
    pub fn get_hash(&mut self, input: &[u8]) -> Response {
        if !input.is_empty() {
            return Response::err(VendorRc::BogusArgs);
        }
        let support = self.check_unsupported(false);
        if support != Arcve::Ok {
            return Response::arcve(VendorRc::InternalError, support);
        }
        let record = match RecordStore::new(self.platform_mut()).load() {
            Ok(record) => record,
            Err(e) => {
                log::error!("can't read AP RO record: {}", e);
                return Response::arcve(VendorRc::InternalError, Arcve::FlashReadFailed);
            }
        };
        match record.decode() {
            Some(CheckRecord::Factory(factory)) => Response::ok(factory.digest.to_vec()),
            Some(CheckRecord::Gscvd(descriptor)) => Response::ok(descriptor.digest.to_vec()),
            None => Response::arcve(VendorRc::InternalError, Arcve::FlashReadFailed),
        }
    }

    /// The latched status byte.
    pub fn get_status(&mut self, input: &[u8]) -> Response {
        if !input.is_empty() {
            return Response::err(VendorRc::BogusArgs);
        }
        let mut status = self.status();
        if status != ApRoStatus::UnsupportedTriggered && self.check_unsupported(false) != Arcve::Ok {
            status = ApRoStatus::UnsupportedNotTriggered;
        }
        Response::ok(vec![status as u8])
    }
}
