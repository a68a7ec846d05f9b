use core::time::Duration;

/// The fixed input clock of the 8254 PIT, in Hertz (~1.19 MHz).
pub const PIT_DIVIDEND_HZ: u32 = 1_193_182;

/// The lowest rate the PIT can be programmed to, because the divider is 16 bits wide.
pub const PIT_MINIMUM_FREQUENCY_HZ: u32 = 19;

/// The IRQ line wired to PIT channel 0.
pub const PIT_IRQ: u8 = 0;

/// The divider that makes channel 0 tick once per millisecond.
///
/// The tick counter only advances while this divider is programmed.
pub const CONFIG_PIT_TICK_DIVIDER: u16 = (PIT_DIVIDEND_HZ / 1000) as u16;

/// The nominal duration of one tick at [`CONFIG_PIT_TICK_DIVIDER`].
pub const CONFIG_PIT_TICK_PERIOD: Duration = Duration::from_millis(1);

/// The divider used in one-shot mode to quiesce the chip.
pub const CONFIG_PIT_QUIESCE_DIVIDER: u16 = 1;

/// The divider programmed while calibrating the CPU frequency, about 10 ms per tick.
pub const CONFIG_CALIBRATION_DIVIDER: u16 = CONFIG_PIT_TICK_DIVIDER * 10;

/// How many sampling interrupts get timestamped during calibration.
/// The measured window spans one fewer PIT periods than this.
pub const CONFIG_CALIBRATION_SAMPLES: usize = 20;
