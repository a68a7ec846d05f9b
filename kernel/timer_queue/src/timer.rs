use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use tsc::TscTicks;

/// The callback run when a timer expires.
pub type TimeoutHandler = Box<dyn FnMut() + Send>;

/// Decides, after each firing, whether a [`TimerKind::RepeatWhile`] timer runs again.
pub type RepeatCondition = Box<dyn FnMut() -> bool + Send>;

/// Used to assign a unique ID to every timer. Starts at 1.
static TIMER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The identity of a timer, unique for the lifetime of the kernel and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> TimerId {
        TimerId(TIMER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repeat condition that always holds.
pub fn forever() -> RepeatCondition {
    Box::new(|| true)
}

/// What happens to a timer after its handler has run.
pub enum TimerKind {
    /// Fires once and is then dropped.
    OneShot,
    /// Re-armed after every firing until cancelled.
    Repeat,
    /// Re-armed after a firing only if the condition, checked right after the handler, holds.
    RepeatWhile(RepeatCondition),
}

impl fmt::Debug for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimerKind::OneShot => f.write_str("OneShot"),
            TimerKind::Repeat => f.write_str("Repeat"),
            TimerKind::RepeatWhile(_) => f.write_str("RepeatWhile(..)"),
        }
    }
}

/// One scheduled callback.
pub struct Timer {
    id: TimerId,
    kind: TimerKind,
    handler: TimeoutHandler,
    interval: Duration,
    /// Cycle count when this timer was last armed. Informational only.
    start: TscTicks,
    /// Cycle count at which this timer is expected to expire. Informational only.
    end: TscTicks,
}

impl Timer {
    /// Creates a timer with a fresh [`TimerId`].
    pub fn new<F>(kind: TimerKind, interval: Duration, handler: F) -> Timer
        where F: FnMut() + Send + 'static
    {
        Timer {
            id: TimerId::next(),
            kind,
            handler: Box::new(handler),
            interval,
            start: TscTicks::default(),
            end: TscTicks::default(),
        }
    }

    pub fn one_shot<F>(delay: Duration, handler: F) -> Timer
        where F: FnMut() + Send + 'static
    {
        Timer::new(TimerKind::OneShot, delay, handler)
    }

    pub fn repeat<F>(interval: Duration, handler: F) -> Timer
        where F: FnMut() + Send + 'static
    {
        Timer::new(TimerKind::Repeat, interval, handler)
    }

    pub fn repeat_while<F, C>(interval: Duration, handler: F, condition: C) -> Timer
        where F: FnMut() + Send + 'static,
              C: FnMut() -> bool + Send + 'static,
    {
        Timer::new(TimerKind::RepeatWhile(Box::new(condition)), interval, handler)
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn kind(&self) -> &TimerKind {
        &self.kind
    }

    /// The requested delay, or the period for repeating timers.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&self) -> TscTicks {
        self.start
    }

    pub fn end(&self) -> TscTicks {
        self.end
    }

    /// Records the cycle counts at which this timer was armed and is expected to expire.
    pub fn set_cycle_stamps(&mut self, start: TscTicks, end: TscTicks) {
        self.start = start;
        self.end = end;
    }

    /// Runs the handler, then returns whether this timer should be re-armed.
    ///
    /// The repeat condition of a [`TimerKind::RepeatWhile`] timer is evaluated
    /// after the handler, so it observes whatever the handler changed.
    pub fn fire(&mut self) -> bool {
        (self.handler)();
        match &mut self.kind {
            TimerKind::OneShot => false,
            TimerKind::Repeat => true,
            TimerKind::RepeatWhile(condition) => condition(),
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("interval", &self.interval)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}
