use crate::api::RESET_HOLD_PERIOD_MS;
use crate::hal::ResetLine;
use crate::status::StatusHandle;

/// Keeps the AP in reset for as long as the latched status is `Fail`.
///
/// Other firmware may release the reset line at any point, for example on a
/// power button press, so a single assertion is not enough: the hold re-asserts
/// periodically until the latch is cleared.
pub struct ResetHold<R: ResetLine> {
    status: StatusHandle,
    line: R,
}

impl<R: ResetLine> ResetHold<R> {
    pub fn new(status: StatusHandle, line: R) -> Self { ResetHold { status, line } }

    /// One pass of the hold. Returns true if the reset was asserted.
    pub fn tick(&mut self) -> bool {
        if !self.status.is_fail_latched() {
            return false;
        }
        self.line.inhibit_sleep(true);
        self.line.assert_reset();
        true
    }

    /// Runs the hold forever, calling `sleep_ms` between passes.
    pub fn run(mut self, mut sleep_ms: impl FnMut(usize)) -> ! {
        loop {
            self.tick();
            sleep_ms(RESET_HOLD_PERIOD_MS);
        }
    }

    pub fn line_mut(&mut self) -> &mut R { &mut self.line }
}
