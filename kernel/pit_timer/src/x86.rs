//! Interrupt masking on x86, for [`TimerPlatform`](crate::TimerPlatform)
//! implementations running on real hardware.

use x86_64::instructions::interrupts;

/// A handle for frozen interrupts.
/// Interrupts are re-enabled when this is dropped, but only if they were enabled when it was created.
#[derive(Default)]
pub struct HeldInterrupts(bool);

/// Prevent interrupts from firing until the return value is dropped (goes out of scope).
/// After it is dropped, the interrupts are returned to their prior state, not blindly re-enabled.
pub fn hold_interrupts() -> HeldInterrupts {
    let enabled = interrupts::are_enabled();
    let held = HeldInterrupts(enabled);
    interrupts::disable();
    held
}

impl Drop for HeldInterrupts {
    fn drop(&mut self) {
        if self.0 {
            interrupts::enable();
        }
    }
}
