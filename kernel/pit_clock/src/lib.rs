//! Support for the Programmable Interval Timer (PIT) system clock,
//! which configures the mode and frequency of the timer interrupts on channel 0.
//!
//! [`PitClock`] mirrors what is currently programmed into the chip,
//! so that requests which would not change anything skip the register writes.
//! The registers themselves are reached through the [`PitPorts`] trait;
//! on x86 this is [`X86PitPorts`], which uses real port I/O.
//! The kernel creates exactly one `X86PitPorts` and hands it to whichever component
//! owns the PIT; everything else goes through that owner.

#![no_std]

#[cfg(target_arch = "x86_64")]
mod x86;
#[cfg(target_arch = "x86_64")]
pub use self::x86::X86PitPorts;

use core::fmt;
use kernel_config::time::PIT_DIVIDEND_HZ;
use log::debug;

/// Port for Channel 0, whose output drives the timer IRQ.
pub const CHANNEL0: u16 = 0x40;
/// Port for the PIT mode/command register.
pub const COMMAND_REGISTER: u16 = 0x43;

/// Access mode: the count is transferred low byte first, then high byte.
const ACCESS_LO_HI: u8 = 0b0011_0000;
/// Channel select bits (7:6) for channel 0.
const SELECT_CHANNEL0: u8 = 0b0000_0000;
/// Read-back command that latches the status byte, but not the count, of channel 0.
const READ_BACK_STATUS_CHANNEL0: u8 = 0b1110_0010;


/// The operating modes of a PIT channel, already shifted into bits 3:1 of a control word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PitMode {
    /// Mode 0, interrupt on terminal count: fires once when the count reaches zero.
    OneShot         = 0b000 << 1,
    /// Mode 1, a one-shot retriggered by the gate input.
    HardwareOneShot = 0b001 << 1,
    /// Mode 2, a free-running periodic interrupt.
    RateGenerator   = 0b010 << 1,
    /// Mode 3, a periodic square wave.
    SquareWave      = 0b011 << 1,
    /// Mode 4, a single strobe started by writing the count.
    SoftwareStrobe  = 0b100 << 1,
    /// Mode 5, a single strobe started by the gate input.
    HardwareStrobe  = 0b101 << 1,
}

impl PitMode {
    /// The bits this mode contributes to a control word.
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Decodes the mode field (bits 3:1) of a control word or status byte.
    ///
    /// The chip treats the unused encodings 6 and 7 as modes 2 and 3.
    pub const fn from_bits(bits: u8) -> PitMode {
        match (bits >> 1) & 0b111 {
            0     => PitMode::OneShot,
            1     => PitMode::HardwareOneShot,
            2 | 6 => PitMode::RateGenerator,
            3 | 7 => PitMode::SquareWave,
            4     => PitMode::SoftwareStrobe,
            _     => PitMode::HardwareStrobe,
        }
    }

    /// Returns `true` if this mode keeps generating interrupts without being reloaded.
    pub const fn is_periodic(self) -> bool {
        matches!(self, PitMode::RateGenerator | PitMode::SquareWave)
    }
}


/// The status byte of channel 0, as returned by a read-back command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PitStatus(u8);

impl PitStatus {
    pub const fn from_raw(raw: u8) -> PitStatus {
        PitStatus(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The current level of the channel's output pin.
    pub const fn output_high(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// `true` if a newly written count has not yet been loaded into the counter.
    pub const fn null_count(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// The two access-mode bits; `0b11` means low byte then high byte.
    pub const fn access_mode(self) -> u8 {
        (self.0 >> 4) & 0b11
    }

    pub const fn mode(self) -> PitMode {
        PitMode::from_bits(self.0)
    }

    /// `true` if the channel counts in BCD rather than binary.
    pub const fn is_bcd(self) -> bool {
        self.0 & 0x01 != 0
    }
}

impl fmt::Debug for PitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PitStatus")
            .field("raw", &format_args!("{:#04x}", self.0))
            .field("output_high", &self.output_high())
            .field("null_count", &self.null_count())
            .field("access_mode", &self.access_mode())
            .field("mode", &self.mode())
            .field("bcd", &self.is_bcd())
            .finish()
    }
}


/// Raw access to the two PIT registers used for channel 0.
pub trait PitPorts {
    /// Writes a control word to the mode/command register.
    fn write_command(&mut self, value: u8);

    /// Writes one byte of a count to the channel 0 data register.
    fn write_channel0(&mut self, value: u8);

    /// Reads one byte (a latched status or count) from the channel 0 data register.
    fn read_channel0(&mut self) -> u8;
}


/// Returns the interrupt frequency produced by the given `divider`.
///
/// A divider of zero is how the chip encodes 65536.
pub const fn divider_to_frequency_hz(divider: u16) -> u32 {
    let divisor = if divider == 0 { 1 << 16 } else { divider as u32 };
    PIT_DIVIDEND_HZ / divisor
}


/// Channel 0 of the PIT, plus a mirror of its last-programmed mode and divider.
///
/// This must be the only path through which the chip is reprogrammed,
/// otherwise the mirror goes stale and writes get skipped wrongly.
pub struct PitClock<R: PitPorts> {
    ports: R,
    mode: Option<PitMode>,
    divider: Option<u16>,
}

impl<R: PitPorts> PitClock<R> {
    /// Wraps the given registers. Nothing is written until the first mode is set.
    pub const fn new(ports: R) -> PitClock<R> {
        PitClock { ports, mode: None, divider: None }
    }

    /// The mode last written to the chip, if any.
    pub fn mode(&self) -> Option<PitMode> {
        self.mode
    }

    /// The divider currently loaded in the chip.
    ///
    /// This is `None` before the first divider is written and right after a mode change,
    /// because writing a control word makes the chip discard its count.
    pub fn divider(&self) -> Option<u16> {
        self.divider
    }

    /// The interrupt frequency implied by the current divider.
    pub fn frequency_hz(&self) -> Option<u32> {
        self.divider.map(divider_to_frequency_hz)
    }

    /// Programs channel 0 into the given `mode`, with lobyte/hibyte access.
    ///
    /// Returns `false` without touching the chip if it is already in that mode.
    pub fn set_mode(&mut self, mode: PitMode) -> bool {
        if self.mode == Some(mode) {
            return false;
        }
        let config = SELECT_CHANNEL0 | ACCESS_LO_HI | mode.bits();
        debug!("PIT: setting mode {:?}, config {:#04x}", mode, config);
        self.ports.write_command(config);
        self.mode = Some(mode);
        self.divider = None;
        true
    }

    /// Loads a new `divider` into channel 0.
    ///
    /// Returns `false` without touching the chip if that divider is already loaded.
    pub fn set_divider(&mut self, divider: u16) -> bool {
        if self.divider == Some(divider) {
            return false;
        }
        // must write the low byte and then the high byte
        self.ports.write_channel0(divider as u8);
        self.ports.write_channel0((divider >> 8) as u8);
        self.divider = Some(divider);
        true
    }

    /// Sets both the mode and the divider, skipping whatever already matches.
    pub fn program(&mut self, mode: PitMode, divider: u16) {
        self.set_mode(mode);
        self.set_divider(divider);
    }

    /// Switches to one-shot mode with the given `divider`.
    ///
    /// With a divider of `1` this fires a single terminal interrupt almost immediately
    /// and then stays silent, which is how regular interrupts get disabled.
    pub fn oneshot(&mut self, divider: u16) {
        self.program(PitMode::OneShot, divider);
    }

    /// Latches and reads the status byte of channel 0. The mirrored state is unchanged.
    pub fn read_back(&mut self) -> PitStatus {
        self.ports.write_command(READ_BACK_STATUS_CHANNEL0);
        let status = PitStatus(self.ports.read_channel0());
        debug!("PIT: read back {:?}", status);
        status
    }
}

impl<R: PitPorts> fmt::Debug for PitClock<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PitClock")
            .field("mode", &self.mode)
            .field("divider", &self.divider)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod test;
