use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, Ordering};

use num_traits::FromPrimitive;

use crate::api::ApRoStatus;

/// Shared view of the latched verification result.
///
/// Only the verifier writes it; the reset hold task and the command handlers
/// read it through clones.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<AtomicU8>);

impl Default for StatusHandle {
    fn default() -> Self { Self::new() }
}

impl StatusHandle {
    pub fn new() -> Self { StatusHandle(Arc::new(AtomicU8::new(ApRoStatus::NotRun as u8))) }

    pub fn get(&self) -> ApRoStatus {
        ApRoStatus::from_u8(self.0.load(Ordering::SeqCst)).unwrap_or(ApRoStatus::UnsupportedUnknown)
    }

    pub(crate) fn set(&self, status: ApRoStatus) { self.0.store(status as u8, Ordering::SeqCst); }

    /// True while a failed verification holds the AP in reset.
    pub fn is_fail_latched(&self) -> bool { self.get() == ApRoStatus::Fail }
}
