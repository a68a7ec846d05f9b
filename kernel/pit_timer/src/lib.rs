//! The PIT-driven timer subsystem: a monotonic millisecond tick counter,
//! one-shot and repeating timers, and a one-time CPU frequency calibration.
//!
//! A single [`PitTimer`] owns the PIT, the queue of pending timers and the tick counter.
//! It is created once at boot with [`PitTimer::new()`] and hooked up to the timer IRQ with
//! [`PitTimer::init()`]; from then on, nothing else may reprogram the PIT.
//!
//! While no timer is pending, the PIT is left in one-shot mode so that it stops interrupting.
//! Scheduling a timer switches it to a 1 kHz rate generator, and each of its interrupts
//! advances the tick counter and runs whichever timers have expired.
//!
//! # Interrupt context
//! Timer handlers and repeat conditions run in interrupt context. They must be short,
//! must not block, and must not call [`PitTimer::cpu_frequency()`] before calibration is done.
//! They may schedule and cancel timers, including their own.
//!
//! # Hardware
//! The kernel supplies the hardware through two seams. For the PIT registers it passes
//! [`pit_clock::X86PitPorts`], and its [`TimerPlatform`] implementation returns
//! [`x86::hold_interrupts()`] from [`TimerPlatform::hold_interrupts()`], forwards IRQ
//! registration and EOI to its interrupt manager, and reads cycles with [`tsc::tsc_ticks()`].
//!
//! # Drift
//! A repeating timer is re-armed relative to the tick at which it was processed,
//! not the tick at which it was due. Late delivery therefore shifts all later firings;
//! there is no catch-up.

#![no_std]

extern crate alloc;

mod platform;
#[cfg(target_arch = "x86_64")]
pub mod x86;

pub use platform::*;
pub use pit_clock::{PitMode, PitPorts, PitStatus};
pub use timer_queue::{forever, Timer, TimerHandle, TimerId, TimerKind};
pub use tsc::{TscFrequency, TscTicks};

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::time::Duration;
use kernel_config::time::{
    CONFIG_CALIBRATION_DIVIDER, CONFIG_PIT_QUIESCE_DIVIDER, CONFIG_PIT_TICK_DIVIDER,
    CONFIG_PIT_TICK_PERIOD, PIT_IRQ,
};
use log::{debug, error, info, trace, warn};
use pit_clock::PitClock;
use spin::{Mutex, Once};
use timer_queue::{Expired, TimerQueue};
use tsc::CalibrationSamples;


/// Converts a delay into a number of PIT ticks, rounding up.
///
/// # Panics
/// Panics if `delay` is shorter than one tick, which the PIT cannot resolve.
pub fn delay_to_ticks(delay: Duration) -> u64 {
    if delay < CONFIG_PIT_TICK_PERIOD {
        panic!("Can't wait less than one PIT tick ({:?}), requested {:?}", CONFIG_PIT_TICK_PERIOD, delay);
    }
    let period = CONFIG_PIT_TICK_PERIOD.as_nanos();
    let ticks = (delay.as_nanos() + period - 1) / period;
    u64::try_from(ticks).unwrap_or(u64::MAX)
}


/// The mutable state shared between normal and interrupt context.
struct TimerState<R: PitPorts> {
    pit: PitClock<R>,
    queue: TimerQueue,
    /// Advances once per PIT interrupt, but only while the millisecond divider is programmed.
    ticks: u64,
    /// Advances on every PIT interrupt.
    irq_count: u64,
}


/// The timer subsystem. See the [crate-level docs](crate) for an overview.
pub struct PitTimer<P, R>
    where P: TimerPlatform,
          R: PitPorts,
{
    platform: P,
    state: Mutex<TimerState<R>>,
    cpu_frequency: Once<TscFrequency>,
    samples: CalibrationSamples,
    /// Lets interrupt handlers reach this instance without keeping it alive.
    this: Weak<PitTimer<P, R>>,
}

impl<P, R> PitTimer<P, R>
    where P: TimerPlatform + 'static,
          R: PitPorts + Send + 'static,
{
    /// Creates the timer subsystem around the given platform and PIT registers.
    ///
    /// Nothing is written to the hardware until [`init()`](Self::init).
    pub fn new(platform: P, ports: R) -> Arc<PitTimer<P, R>> {
        Arc::new_cyclic(|this| PitTimer {
            platform,
            state: Mutex::new(TimerState {
                pit: PitClock::new(ports),
                queue: TimerQueue::new(),
                ticks: 0,
                irq_count: 0,
            }),
            cpu_frequency: Once::new(),
            samples: CalibrationSamples::new(),
            this: this.clone(),
        })
    }

    /// Subscribes to the timer IRQ and quiesces the PIT until the first timer is scheduled.
    ///
    /// Calibration is not done here, because it needs interrupts to be enabled;
    /// call [`cpu_frequency()`](Self::cpu_frequency) once they are.
    pub fn init(&self) {
        info!("PIT: initializing, subscribing to IRQ {}", PIT_IRQ);
        let this = self.this.clone();
        let handler: IrqHandler = Arc::new(move || {
            if let Some(timer) = this.upgrade() {
                timer.handle_timer_interrupt();
            }
        });
        if self.platform.set_handler(PIT_IRQ, Some(handler)).is_some() {
            warn!("PIT: replaced an existing handler for IRQ {}", PIT_IRQ);
        }
        self.disable_regular_interrupts();
        self.platform.enable_irq(PIT_IRQ);
    }

    /// Runs `f` on the shared state with interrupts held, so an interrupt
    /// can never observe a half-finished update.
    fn with_state<T>(&self, f: impl FnOnce(&mut TimerState<R>) -> T) -> T {
        let _held = self.platform.hold_interrupts();
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Puts the PIT into one-shot mode with the smallest divider,
    /// which stops regular timer interrupts until a timer is scheduled.
    pub fn disable_regular_interrupts(&self) {
        self.with_state(|state| state.pit.oneshot(CONFIG_PIT_QUIESCE_DIVIDER));
    }

    /// Returns the CPU's core clock frequency, calibrating it first if that hasn't happened yet.
    ///
    /// Calibration busy-waits for about 200 ms and needs PIT interrupts to be delivered,
    /// so the first call must come from normal context with interrupts enabled.
    /// Later calls return the cached value.
    pub fn cpu_frequency(&self) -> TscFrequency {
        *self.cpu_frequency.call_once(|| self.estimate_cpu_frequency())
    }

    /// Returns `true` once the CPU frequency has been calibrated.
    pub fn is_calibrated(&self) -> bool {
        self.cpu_frequency.is_completed()
    }

    /// Measures the CPU frequency by counting cycles across a fixed number of PIT interrupts.
    /// This blocks until all samples have arrived.
    fn estimate_cpu_frequency(&self) -> TscFrequency {
        let (saved_mode, saved_divider) = self.with_state(|state| (state.pit.mode(), state.pit.divider()));
        debug!("PIT: calibrating CPU frequency, saved mode {:?} divider {:?}", saved_mode, saved_divider);

        let this = self.this.clone();
        let sampler: IrqHandler = Arc::new(move || {
            if let Some(timer) = this.upgrade() {
                timer.handle_sampling_interrupt();
            }
        });
        // no interrupt may reach the sampler before the sampling divider is loaded
        let previous_handler = {
            let _held = self.platform.hold_interrupts();
            let previous = self.platform.set_handler(PIT_IRQ, Some(sampler));
            self.with_state(|state| state.pit.program(PitMode::RateGenerator, CONFIG_CALIBRATION_DIVIDER));
            previous
        };

        while !self.samples.is_complete() {
            self.platform.relax();
        }

        {
            let _held = self.platform.hold_interrupts();
            self.with_state(|state| match (saved_mode, saved_divider) {
                (Some(mode), Some(divider)) => state.pit.program(mode, divider),
                _ => state.pit.oneshot(CONFIG_PIT_QUIESCE_DIVIDER),
            });
            self.platform.set_handler(PIT_IRQ, previous_handler);
        }

        match self.samples.frequency(CONFIG_CALIBRATION_DIVIDER) {
            Ok(freq) => {
                info!("PIT: CPU frequency is {}", freq);
                freq
            }
            Err(e) => {
                error!("PIT: CPU frequency calibration failed: {}", e);
                TscFrequency::default()
            }
        }
    }

    /// Schedules `timer` to expire after `delay`.
    ///
    /// # Panics
    /// Panics if `delay`, or the interval of a repeating `timer`, is shorter than one tick (1 ms).
    pub fn start_timer(&self, mut timer: Timer, delay: Duration) -> TimerHandle {
        let ticks = delay_to_ticks(delay);
        if !matches!(timer.kind(), TimerKind::OneShot) {
            delay_to_ticks(timer.interval());
        }
        self.with_state(|state| {
            let expiry = self.prepare(state, &mut timer, ticks);
            let id = timer.id();
            let handle = state.queue.insert(expiry, timer);
            debug!("PIT: timer {} expires at tick {}, {} timers pending", id, expiry, state.queue.len());
            handle
        })
    }

    /// Makes sure the PIT is ticking every millisecond, stamps `timer`
    /// and returns the tick at which it should expire.
    fn prepare(&self, state: &mut TimerState<R>, timer: &mut Timer, ticks: u64) -> u64 {
        state.pit.program(PitMode::RateGenerator, CONFIG_PIT_TICK_DIVIDER);

        let start = self.platform.cycles();
        let end = match self.cpu_frequency.get() {
            Some(freq) => start.add(&freq.cycles_in(timer.interval())).unwrap_or(start),
            None => start,
        };
        timer.set_cycle_stamps(start, end);

        state.ticks.saturating_add(ticks)
    }

    /// Runs `handler` once, after `delay`.
    pub fn on_timeout<F>(&self, delay: Duration, handler: F) -> TimerHandle
        where F: FnMut() + Send + 'static
    {
        let timer = Timer::one_shot(delay, handler);
        debug!("PIT: setting a {:?} one-shot timer, id {}", delay, timer.id());
        self.start_timer(timer, delay)
    }

    /// Runs `handler` every `interval` for as long as `condition` holds.
    /// The condition is checked after each run of the handler;
    /// the run after which it first returns `false` is the last.
    pub fn on_repeated_timeout<F, C>(&self, interval: Duration, handler: F, condition: C) -> TimerHandle
        where F: FnMut() + Send + 'static,
              C: FnMut() -> bool + Send + 'static,
    {
        let timer = Timer::repeat_while(interval, handler, condition);
        debug!("PIT: setting a {:?} repeating timer, id {}", interval, timer.id());
        self.start_timer(timer, interval)
    }

    /// Runs `handler` every `interval` until the timer is stopped.
    pub fn on_interval<F>(&self, interval: Duration, handler: F) -> TimerHandle
        where F: FnMut() + Send + 'static
    {
        let timer = Timer::repeat(interval, handler);
        debug!("PIT: setting a {:?} interval timer, id {}", interval, timer.id());
        self.start_timer(timer, interval)
    }

    /// Cancels the timer behind `handle`.
    ///
    /// A timer cancelled before it expires never runs. A timer whose handler is running right now
    /// finishes that run but is not re-armed.
    /// Returns an error if the timer has already fired for the last time or was already cancelled.
    pub fn stop_timer(&self, handle: TimerHandle) -> Result<(), &'static str> {
        // the timer is dropped only after the lock is released
        let removed = self.with_state(|state| state.queue.remove(handle)).map_err(|e| {
            warn!("PIT: stop_timer({:?}) failed: {}", handle, e);
            e
        })?;
        if let Some(timer) = removed {
            debug!("PIT: stopped timer {}", timer.id());
        }
        Ok(())
    }

    /// Returns `true` if the timer behind `handle` is still pending or currently running.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.with_state(|state| state.queue.contains(handle))
    }

    /// The cycle counter values recorded when the timer behind `handle` was last armed:
    /// the reading at that moment, and that reading plus its interval in cycles.
    ///
    /// Both are equal if the CPU frequency was not calibrated yet.
    /// Returns `None` unless the timer is waiting to expire.
    pub fn cycle_stamps(&self, handle: TimerHandle) -> Option<(TscTicks, TscTicks)> {
        self.with_state(|state| state.queue.get(handle).map(|timer| (timer.start(), timer.end())))
    }

    /// The interrupt service routine for the timer IRQ.
    pub fn handle_timer_interrupt(&self) {
        // All IRQ handlers have to send EOI, or the next tick never arrives
        self.platform.eoi(PIT_IRQ);

        let (now, expired) = self.with_state(|state| {
            state.irq_count += 1;
            // interrupts at any other rate, e.g., while calibrating, are not milliseconds
            if state.pit.divider() == Some(CONFIG_PIT_TICK_DIVIDER) {
                state.ticks += 1;
            }
            (state.ticks, state.queue.drain_expired(state.ticks))
        });

        let mut fired = Vec::with_capacity(expired.len());
        for Expired { handle, expiry, mut timer } in expired {
            // an earlier handler in this batch may have cancelled it
            if !self.with_state(|state| state.queue.is_firing(handle)) {
                trace!("PIT: timer {} was cancelled before it could fire", timer.id());
                continue;
            }
            trace!("PIT: timer {} ({:?}, due at tick {}) expired at tick {}", timer.id(), timer.kind(), expiry, now);
            let rearm = timer.fire();
            fired.push((handle, timer, rearm));
        }

        // dropped outside the lock
        let _finished = self.with_state(|state| {
            let mut finished = Vec::new();
            for (handle, mut timer, rearm) in fired {
                if rearm {
                    let ticks = delay_to_ticks(timer.interval());
                    let expiry = self.prepare(state, &mut timer, ticks);
                    if let Err(timer) = state.queue.rearm(handle, expiry, timer) {
                        warn!("PIT: timer {} was cancelled while firing, not re-arming it", timer.id());
                        finished.push(timer);
                    }
                } else {
                    state.queue.release(handle);
                    finished.push(timer);
                }
            }
            if state.queue.is_empty() {
                state.pit.oneshot(CONFIG_PIT_QUIESCE_DIVIDER);
            }
            finished
        });
    }

    /// The interrupt service routine installed on the timer IRQ while calibrating.
    fn handle_sampling_interrupt(&self) {
        self.platform.eoi(PIT_IRQ);
        self.samples.record(self.platform.cycles());
    }

    /// The number of millisecond ticks counted so far.
    pub fn ticks(&self) -> u64 {
        self.with_state(|state| state.ticks)
    }

    /// The time covered by the ticks counted so far.
    /// This only advances while at least one timer is pending.
    pub fn uptime(&self) -> Duration {
        let nanos = CONFIG_PIT_TICK_PERIOD.as_nanos() * self.ticks() as u128;
        Duration::new((nanos / 1_000_000_000) as u64, (nanos % 1_000_000_000) as u32)
    }

    /// The number of timer interrupts received, at any rate.
    pub fn irq_count(&self) -> u64 {
        self.with_state(|state| state.irq_count)
    }

    /// The number of timers waiting to expire.
    pub fn pending_timers(&self) -> usize {
        self.with_state(|state| state.queue.len())
    }

    pub fn current_mode(&self) -> Option<PitMode> {
        self.with_state(|state| state.pit.mode())
    }

    pub fn current_divider(&self) -> Option<u16> {
        self.with_state(|state| state.pit.divider())
    }

    /// The PIT's current interrupt rate.
    pub fn current_frequency_hz(&self) -> Option<u32> {
        self.with_state(|state| state.pit.frequency_hz())
    }

    /// Reads back the PIT's status byte, for diagnostics.
    pub fn read_back(&self) -> PitStatus {
        self.with_state(|state| state.pit.read_back())
    }
}
