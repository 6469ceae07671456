//! The result and enforcement state machine.
//!
//! [`ApRoVerifier`] decides which schemes to run, latches the outcome in its
//! [`StatusHandle`] and drives the AP reset line and the audit log from it.
use crate::api::*;
use crate::cache::check_cache;
use crate::chain::scan_and_verify;
use crate::config::VerifierConfig;
use crate::hal::Platform;
use crate::legacy;
use crate::record::{check_is_required, RecordStore, StoredRecord};
use crate::status::StatusHandle;

pub struct ApRoVerifier<P: Platform> {
    platform: P,
    config: VerifierConfig,
    status: StatusHandle,
}

impl<P: Platform> ApRoVerifier<P> {
    pub fn new(platform: P, config: VerifierConfig) -> Self {
        ApRoVerifier { platform, config, status: StatusHandle::new() }
    }

    /// A handle for readers of the latched result, such as the reset hold.
    pub fn status_handle(&self) -> StatusHandle { self.status.clone() }

    pub fn status(&self) -> ApRoStatus { self.status.get() }

    pub fn config(&self) -> &VerifierConfig { &self.config }

    pub fn platform_mut(&mut self) -> &mut P { &mut self.platform }

    /// True while a failed verification is holding the AP in reset.
    pub fn ec_rst_override(&self) -> bool { self.status.is_fail_latched() }

    fn load_record(&mut self) -> Option<StoredRecord> {
        match RecordStore::new(&mut self.platform).load() {
            Ok(record) => Some(record),
            Err(e) => {
                log::error!("can't read AP RO record: {}", e);
                None
            }
        }
    }

    fn event(&mut self, add_event: bool, event: ApRoEvent) {
        if add_event {
            self.platform.add_event(event);
        }
    }

    /// Reports whether verification is configured on this unit, and why not.
    pub fn check_unsupported(&mut self, add_event: bool) -> Arcve {
        if self.platform.ap_ro_blocked() {
            log::info!("AP RO verification blocked by board ID");
            return Arcve::BoardIdBlocked;
        }
        let record = match self.load_record() {
            Some(record) => record,
            None => {
                self.event(add_event, ApRoEvent::SpaceInvalid);
                return Arcve::FlashReadFailed;
            }
        };
        if !record.is_programmed() {
            self.event(add_event, ApRoEvent::SpaceNotProgrammed);
            return Arcve::NotProgrammed;
        }
        if record.v2_entry().is_none() && record.factory().is_err() {
            self.event(add_event, ApRoEvent::SpaceInvalid);
            return Arcve::FlashReadFailed;
        }
        Arcve::Ok
    }

    fn check_v2(&mut self, record: Option<&StoredRecord>) -> Verdict {
        let cached = match record.and_then(StoredRecord::v2_entry) {
            Some(descriptor) => check_cache(&mut self.platform, &descriptor),
            None => Verdict::NotFound,
        };
        if cached == Verdict::Succeeded {
            log::info!("AP RO verified against cached GVD");
            return cached;
        }
        scan_and_verify(&mut self.platform, &self.config)
    }

    /// Runs verification and latches the result.
    ///
    /// A failure, or any non-success once checks are mandatory, asserts the AP
    /// reset and keeps it asserted until the controller reboots. Otherwise an
    /// unprovisioned unit is reported as unsupported and allowed to boot.
    pub fn run_check(&mut self) -> CheckOutcome {
        let support = self.check_unsupported(true);
        if matches!(support, Arcve::BoardIdBlocked | Arcve::FlashReadFailed) {
            self.status.set(ApRoStatus::UnsupportedTriggered);
            self.platform.add_event(ApRoEvent::CheckUnsupported);
            return CheckOutcome::Unimplemented;
        }

        let record = self.load_record();
        let mut verdict = Verdict::NotFound;
        if support == Arcve::Ok {
            if let Some(record) = &record {
                verdict = legacy::verify(&mut self.platform, record);
            }
        }
        if verdict != Verdict::Succeeded {
            let v2 = self.check_v2(record.as_ref());
            if v2 != Verdict::NotFound {
                verdict = v2;
            }
        }

        if verdict != Verdict::Succeeded {
            if verdict == Verdict::Failed || check_is_required(&mut self.platform) {
                log::error!("AP RO verification failed ({:?}), holding AP in reset", verdict);
                self.status.set(ApRoStatus::Fail);
                self.platform.add_event(ApRoEvent::CheckFailed);
                self.platform.inhibit_sleep(true);
                self.platform.assert_reset();
                return CheckOutcome::Crc;
            }
            log::info!("AP RO verification not provisioned");
            self.status.set(ApRoStatus::UnsupportedTriggered);
            self.platform.add_event(ApRoEvent::CheckUnsupported);
            return CheckOutcome::Unimplemented;
        }

        log::info!("AP RO verification passed");
        self.status.set(ApRoStatus::Pass);
        self.platform.add_event(ApRoEvent::CheckSucceeded);
        self.platform.deassert_reset();
        self.platform.inhibit_sleep(false);
        CheckOutcome::Success
    }

    /// Called when the AP power domain resets. A latched failure survives.
    pub fn device_reset(&mut self) {
        if self.status.get() == ApRoStatus::NotRun || self.ec_rst_override() {
            return;
        }
        log::info!("clearing AP RO result");
        self.status.set(ApRoStatus::NotRun);
    }
}
