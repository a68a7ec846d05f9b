//! Tests for the frequency math and the calibration sample recorder.

extern crate std;

use super::*;
use kernel_config::time::CONFIG_CALIBRATION_DIVIDER;

/// Feeds `samples` timestamps spaced as a CPU running at `cpu_hz` would see them.
fn sample_at(cpu_hz: u64, divider: u16, samples: usize) -> CalibrationSamples {
    let recorder = CalibrationSamples::new();
    let per_period = cpu_hz as u128 * divider as u128 / PIT_DIVIDEND_HZ as u128;
    for i in 0..samples {
        recorder.record(TscTicks::new(5_000 + (i as u128 * per_period) as u64));
    }
    recorder
}

#[test]
fn calibration_recovers_cpu_frequency() {
    let cpu_hz = 2_400_000_000;
    let recorder = sample_at(cpu_hz, CONFIG_CALIBRATION_DIVIDER, CONFIG_CALIBRATION_SAMPLES);
    assert!(recorder.is_complete());
    let freq = recorder.frequency(CONFIG_CALIBRATION_DIVIDER).unwrap();
    // integer rounding of the per-period cycle count costs at most a few hundred Hz
    assert!(cpu_hz.abs_diff(freq.hz()) < 1_000, "measured {}", freq);
    assert_eq!(freq.mhz(), 2399);
}

#[test]
fn samples_beyond_capacity_are_ignored() {
    let recorder = sample_at(1_000_000_000, CONFIG_CALIBRATION_DIVIDER, CONFIG_CALIBRATION_SAMPLES + 5);
    assert_eq!(recorder.recorded(), CONFIG_CALIBRATION_SAMPLES);
}

#[test]
fn too_few_samples_is_an_error() {
    let recorder = sample_at(1_000_000_000, CONFIG_CALIBRATION_DIVIDER, 1);
    assert!(!recorder.is_complete());
    assert!(recorder.frequency(CONFIG_CALIBRATION_DIVIDER).is_err());
}

#[test]
fn stalled_counter_is_an_error() {
    let recorder = CalibrationSamples::new();
    recorder.record(TscTicks::new(42));
    recorder.record(TscTicks::new(42));
    assert!(recorder.frequency(CONFIG_CALIBRATION_DIVIDER).is_err());
}

#[test]
fn frequency_units_and_display() {
    let freq = TscFrequency::from_hz(2_399_928_000);
    assert_eq!(freq.khz(), 2_399_928);
    assert_eq!(freq.mhz(), 2_399);
    assert_eq!(freq.cycles_per_ms(), 2_399_928);
    assert_eq!(freq.cycles_in(Duration::from_millis(5)).into(), 11_999_640);
    assert_eq!(std::format!("{}", freq), "2399.928 MHz");
}

#[test]
fn tick_arithmetic_is_checked() {
    let a = TscTicks::new(10);
    let b = TscTicks::new(3);
    assert_eq!(a.sub(&b), Some(TscTicks::new(7)));
    assert_eq!(b.sub(&a), None);
    assert_eq!(TscTicks::new(u64::MAX).add(&b), None);
    assert_eq!(TscTicks::new(2_000).to_ns(TscFrequency::from_hz(1_000_000_000)), Some(2_000));
    assert_eq!(a.to_ns(TscFrequency::default()), None);
}
