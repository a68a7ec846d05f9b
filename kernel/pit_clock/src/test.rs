//! Tests for `PitClock`'s write elision and status decoding.

extern crate std;

use self::std::vec::Vec;
use super::*;

/// Records every register access instead of touching hardware.
#[derive(Default)]
struct RecordingPorts {
    writes: Vec<(u16, u8)>,
    status: u8,
}

impl PitPorts for RecordingPorts {
    fn write_command(&mut self, value: u8) {
        self.writes.push((COMMAND_REGISTER, value));
    }
    fn write_channel0(&mut self, value: u8) {
        self.writes.push((CHANNEL0, value));
    }
    fn read_channel0(&mut self) -> u8 {
        self.status
    }
}

fn take_writes(clock: &mut PitClock<RecordingPorts>) -> Vec<(u16, u8)> {
    core::mem::take(&mut clock.ports.writes)
}

#[test]
fn rate_generator_is_lohi_mode_2_on_channel_0() {
    let mut clock = PitClock::new(RecordingPorts::default());
    clock.program(PitMode::RateGenerator, 1193);
    assert_eq!(take_writes(&mut clock), [
        (COMMAND_REGISTER, 0x34),
        (CHANNEL0, 0xA9),
        (CHANNEL0, 0x04),
    ]);
    assert_eq!(clock.mode(), Some(PitMode::RateGenerator));
    assert_eq!(clock.divider(), Some(1193));
}

#[test]
fn redundant_writes_are_skipped() {
    let mut clock = PitClock::new(RecordingPorts::default());
    clock.oneshot(1);
    assert_eq!(take_writes(&mut clock), [
        (COMMAND_REGISTER, 0x30),
        (CHANNEL0, 0x01),
        (CHANNEL0, 0x00),
    ]);

    assert!(!clock.set_mode(PitMode::OneShot));
    assert!(!clock.set_divider(1));
    clock.oneshot(1);
    assert!(take_writes(&mut clock).is_empty());

    // only the divider differs
    assert!(clock.set_divider(0x1234));
    assert_eq!(take_writes(&mut clock), [(CHANNEL0, 0x34), (CHANNEL0, 0x12)]);
}

#[test]
fn mode_change_forces_divider_reload() {
    let mut clock = PitClock::new(RecordingPorts::default());
    clock.program(PitMode::RateGenerator, 1193);
    take_writes(&mut clock);

    // the chip drops its count on every control word, so the same divider is written again
    clock.program(PitMode::SquareWave, 1193);
    assert_eq!(take_writes(&mut clock), [
        (COMMAND_REGISTER, 0x36),
        (CHANNEL0, 0xA9),
        (CHANNEL0, 0x04),
    ]);
}

#[test]
fn divider_is_unknown_between_mode_and_count() {
    let mut clock = PitClock::new(RecordingPorts::default());
    assert_eq!(clock.mode(), None);
    assert_eq!(clock.divider(), None);
    clock.set_divider(1193);
    assert_eq!(clock.frequency_hz(), Some(1000));
    clock.set_mode(PitMode::OneShot);
    assert_eq!(clock.divider(), None);
    assert_eq!(clock.frequency_hz(), None);
}

#[test]
fn read_back_decodes_status_without_changing_state() {
    let mut clock = PitClock::new(RecordingPorts { status: 0b1011_0100, ..Default::default() });
    clock.program(PitMode::RateGenerator, 1193);
    take_writes(&mut clock);

    let status = clock.read_back();
    assert_eq!(take_writes(&mut clock), [(COMMAND_REGISTER, 0xE2)]);
    assert!(status.output_high());
    assert!(!status.null_count());
    assert_eq!(status.access_mode(), 0b11);
    assert_eq!(status.mode(), PitMode::RateGenerator);
    assert!(!status.is_bcd());
    assert_eq!(clock.mode(), Some(PitMode::RateGenerator));
    assert_eq!(clock.divider(), Some(1193));
}

#[test]
fn mode_decoding_aliases_6_and_7() {
    assert_eq!(PitMode::from_bits(6 << 1), PitMode::RateGenerator);
    assert_eq!(PitMode::from_bits(7 << 1), PitMode::SquareWave);
    assert_eq!(PitMode::from_bits(PitMode::HardwareStrobe.bits()), PitMode::HardwareStrobe);
    assert!(PitMode::RateGenerator.is_periodic());
    assert!(!PitMode::OneShot.is_periodic());
}

#[test]
fn zero_divider_means_65536() {
    assert_eq!(divider_to_frequency_hz(0), 18);
    assert_eq!(divider_to_frequency_hz(1), PIT_DIVIDEND_HZ);
}
