use alloc::sync::Arc;
use tsc::TscTicks;

/// An interrupt service routine as registered with the interrupt manager.
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// Everything the timer subsystem needs from the rest of the kernel,
/// apart from the PIT registers themselves.
pub trait TimerPlatform: Send + Sync {
    /// A guard that keeps interrupts disabled on this CPU until it is dropped,
    /// then restores whatever state they were in before.
    type HeldInterrupts;

    /// Disables interrupts on this CPU until the returned guard is dropped.
    fn hold_interrupts(&self) -> Self::HeldInterrupts;

    /// Installs `handler` as the routine for `irq`, or removes the current one if `None`.
    /// Returns the routine that was installed before.
    fn set_handler(&self, irq: u8, handler: Option<IrqHandler>) -> Option<IrqHandler>;

    /// Unmasks `irq` at the interrupt controller.
    fn enable_irq(&self, irq: u8);

    /// Acknowledges `irq`. Until this is sent, no further interrupts arrive on that line.
    fn eoi(&self, irq: u8);

    /// Reads the CPU's cycle counter.
    fn cycles(&self) -> TscTicks;

    /// Called in each iteration of a busy-wait loop.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}
