//! Port I/O backend for the PIT registers on x86.

use crate::{PitPorts, CHANNEL0, COMMAND_REGISTER};
use x86_64::instructions::port::{Port, PortWriteOnly};

/// The real channel 0 and command registers of the PIT.
pub struct X86PitPorts {
    command: PortWriteOnly<u8>,
    channel0: Port<u8>,
}

impl X86PitPorts {
    /// # Safety
    /// The caller must guarantee that nothing else in the system accesses
    /// the PIT command register or channel 0 while the returned value exists.
    pub const unsafe fn new() -> X86PitPorts {
        X86PitPorts {
            command: PortWriteOnly::new(COMMAND_REGISTER),
            channel0: Port::new(CHANNEL0),
        }
    }
}

impl PitPorts for X86PitPorts {
    fn write_command(&mut self, value: u8) {
        // SAFETY: `new()` requires exclusive ownership of the PIT registers.
        unsafe { self.command.write(value) }
    }

    fn write_channel0(&mut self, value: u8) {
        // SAFETY: see `write_command()`.
        unsafe { self.channel0.write(value) }
    }

    fn read_channel0(&mut self) -> u8 {
        // SAFETY: see `write_command()`.
        unsafe { self.channel0.read() }
    }
}
