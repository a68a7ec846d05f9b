//! Support for reading the CPU's cycle counter (the TSC on x86)
//! and deriving its frequency from a known PIT tick rate.

#![no_std]

use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use kernel_config::time::{CONFIG_CALIBRATION_SAMPLES, PIT_DIVIDEND_HZ};
use log::info;


/// A raw reading of the cycle counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TscTicks(u64);

impl TscTicks {
    pub const fn new(ticks: u64) -> TscTicks {
        TscTicks(ticks)
    }

    /// Converts ticks to nanoseconds at the given frequency.
    /// Returns `None` if the frequency is unknown (zero).
    pub fn to_ns(&self, freq: TscFrequency) -> Option<u64> {
        if freq.hz() == 0 {
            return None;
        }
        Some((self.0 as u128 * 1_000_000_000 / freq.hz() as u128) as u64)
    }

    /// Checked subtraction. Computes `self - other`,
    /// returning `None` if underflow occurred.
    pub fn sub(&self, other: &TscTicks) -> Option<TscTicks> {
        self.0.checked_sub(other.0).map(TscTicks)
    }

    /// Checked addition. Computes `self + other`,
    /// returning `None` if overflow occurred.
    pub fn add(&self, other: &TscTicks) -> Option<TscTicks> {
        self.0.checked_add(other.0).map(TscTicks)
    }

    /// Get the inner value, the number of ticks.
    pub const fn into(self) -> u64 {
        self.0
    }
}


/// Returns the current number of ticks from the TSC, i.e., `rdtsc`.
#[cfg(target_arch = "x86_64")]
pub fn tsc_ticks() -> TscTicks {
    // SAFE: rdtsc is available on every x86_64 CPU;
    // lfence keeps earlier instructions from being reordered past the read.
    unsafe {
        core::arch::x86_64::_mm_lfence();
        TscTicks(core::arch::x86_64::_rdtsc())
    }
}


/// The rate at which the cycle counter advances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TscFrequency(u64);

impl TscFrequency {
    pub const fn from_hz(hz: u64) -> TscFrequency {
        TscFrequency(hz)
    }

    pub const fn hz(&self) -> u64 {
        self.0
    }

    pub const fn khz(&self) -> u64 {
        self.0 / 1_000
    }

    pub const fn mhz(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// The number of cycles that elapse in one millisecond.
    pub const fn cycles_per_ms(&self) -> u64 {
        self.khz()
    }

    /// The number of cycles that elapse over `duration`.
    pub fn cycles_in(&self, duration: Duration) -> TscTicks {
        TscTicks((self.0 as u128 * duration.as_nanos() / 1_000_000_000) as u64)
    }
}

impl fmt::Display for TscFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03} MHz", self.mhz(), self.khz() % 1_000)
    }
}


/// Timestamps taken at consecutive PIT interrupts while calibrating.
///
/// [`record()`](Self::record) is meant to be called from the sampling interrupt handler,
/// while the calibrating context spins on [`is_complete()`](Self::is_complete).
pub struct CalibrationSamples {
    stamps: [AtomicU64; CONFIG_CALIBRATION_SAMPLES],
    recorded: AtomicUsize,
}

impl CalibrationSamples {
    pub fn new() -> CalibrationSamples {
        CalibrationSamples {
            stamps: core::array::from_fn(|_| AtomicU64::new(0)),
            recorded: AtomicUsize::new(0),
        }
    }

    /// Stores the cycle count observed at one sampling interrupt.
    /// Samples beyond the capacity are ignored.
    pub fn record(&self, now: TscTicks) {
        let idx = self.recorded.load(Ordering::Acquire);
        if idx < CONFIG_CALIBRATION_SAMPLES {
            self.stamps[idx].store(now.into(), Ordering::Relaxed);
            self.recorded.store(idx + 1, Ordering::Release);
        }
    }

    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.recorded() >= CONFIG_CALIBRATION_SAMPLES
    }

    /// Derives the cycle counter's frequency from the samples,
    /// given that consecutive samples are one PIT period at `divider` apart.
    pub fn frequency(&self, divider: u16) -> Result<TscFrequency, &'static str> {
        let recorded = self.recorded();
        if recorded < 2 {
            return Err("at least two calibration samples are needed");
        }
        let first = TscTicks(self.stamps[0].load(Ordering::Relaxed));
        let last = TscTicks(self.stamps[recorded - 1].load(Ordering::Relaxed));
        let cycles = last.sub(&first).ok_or("cycle counter went backwards during calibration")?;
        if cycles.into() == 0 {
            return Err("cycle counter did not advance during calibration");
        }

        // elapsed seconds = periods * divider / PIT_DIVIDEND_HZ
        let periods = (recorded - 1) as u128;
        let divider = if divider == 0 { 1 << 16 } else { divider as u128 };
        let hz = cycles.into() as u128 * PIT_DIVIDEND_HZ as u128 / (periods * divider);
        let freq = TscFrequency(hz as u64);
        info!("TSC frequency calculated by PIT is: {} ({} cycles over {} periods)", freq, cycles.into(), periods);
        Ok(freq)
    }
}

impl Default for CalibrationSamples {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod test;
