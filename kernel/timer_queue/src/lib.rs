//! A queue of pending timers, ordered by the tick at which they expire.
//!
//! Timers with the same expiry tick are processed in the order they were queued.
//! Each queued timer is addressed by a [`TimerHandle`], an index into an internal slot table
//! plus the generation of that slot. A slot's generation is bumped every time its timer
//! is dropped, so a handle to a timer that has already fired or been cancelled
//! can never reach whichever timer reuses the slot later.
//!
//! Expiry is processed in two steps so that handlers can run without the queue being borrowed:
//! [`TimerQueue::drain_expired()`] hands out every due timer and leaves its slot marked as firing,
//! then each one is either put back with [`TimerQueue::rearm()`] or dropped with [`TimerQueue::release()`].

#![no_std]

extern crate alloc;

mod timer;

pub use timer::*;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::mem;
use log::warn;


/// Identifies one queued timer. Copying a handle does not copy the timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: u32,
    generation: u32,
}

/// The ordering key: expiry tick first, then insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    expiry: u64,
    seq: u64,
}

enum Slot {
    Vacant,
    Pending { key: QueueKey, timer: Timer },
    /// Handed out by `drain_expired()` and not yet re-armed or released.
    Firing,
}

struct Entry {
    generation: u32,
    slot: Slot,
}

/// A timer that `drain_expired()` found to be due.
#[derive(Debug)]
pub struct Expired {
    pub handle: TimerHandle,
    /// The tick at which the timer was scheduled to expire.
    pub expiry: u64,
    pub timer: Timer,
}


/// Pending timers, sorted ascending by expiry tick.
pub struct TimerQueue {
    entries: Vec<Entry>,
    /// Indices of vacant entries, available for reuse.
    free: Vec<u32>,
    pending: BTreeMap<QueueKey, TimerHandle>,
    next_seq: u64,
}

impl TimerQueue {
    pub const fn new() -> TimerQueue {
        TimerQueue {
            entries: Vec::new(),
            free: Vec::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// The number of timers waiting to expire. Timers that are currently firing are not counted.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The expiry tick of the timer that will fire next.
    pub fn next_expiry(&self) -> Option<u64> {
        self.pending.first_key_value().map(|(key, _)| key.expiry)
    }

    /// Returns `true` if `handle` refers to a timer that is queued or currently firing.
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.live_index(handle).is_some()
    }

    /// Returns `true` if `handle` refers to a timer that was handed out by `drain_expired()`
    /// and has not been cancelled, re-armed or released since.
    pub fn is_firing(&self, handle: TimerHandle) -> bool {
        self.firing_index(handle).is_some()
    }

    /// Returns the timer behind `handle` if it is waiting to expire.
    pub fn get(&self, handle: TimerHandle) -> Option<&Timer> {
        let index = self.live_index(handle)?;
        match &self.entries[index].slot {
            Slot::Pending { timer, .. } => Some(timer),
            _ => None,
        }
    }

    /// Iterates over the queued timers in the order they will fire.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Timer)> + '_ {
        self.pending.iter().filter_map(move |(key, handle)| {
            match &self.entries[handle.index as usize].slot {
                Slot::Pending { timer, .. } => Some((key.expiry, timer)),
                _ => None,
            }
        })
    }

    /// Queues `timer` to expire at tick `expiry`.
    pub fn insert(&mut self, expiry: u64, timer: Timer) -> TimerHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry { generation: 0, slot: Slot::Vacant });
                (self.entries.len() - 1) as u32
            }
        };
        let handle = TimerHandle { index, generation: self.entries[index as usize].generation };
        self.enqueue(handle, expiry, timer);
        handle
    }

    /// Removes the timer that `handle` refers to.
    ///
    /// Returns the timer if it was still queued, or `None` if it is currently firing,
    /// in which case it will not be re-armed when its handler returns.
    /// Returns an error if the handle is stale.
    pub fn remove(&mut self, handle: TimerHandle) -> Result<Option<Timer>, &'static str> {
        let index = self.live_index(handle)
            .ok_or("stale timer handle: the timer already fired or was cancelled")?;
        let removed = match mem::replace(&mut self.entries[index].slot, Slot::Vacant) {
            Slot::Pending { key, timer } => {
                self.pending.remove(&key);
                Some(timer)
            }
            Slot::Firing | Slot::Vacant => None,
        };
        self.vacate(index);
        Ok(removed)
    }

    /// Takes every timer whose expiry tick is at or before `now` out of the queue,
    /// in firing order.
    ///
    /// The due prefix is first split off as a whole and only then are the slots updated,
    /// so the ordered index is never modified while it is being walked.
    /// Every returned timer must later be passed to [`rearm()`](Self::rearm)
    /// or [`release()`](Self::release).
    pub fn drain_expired(&mut self, now: u64) -> Vec<Expired> {
        let due = match now.checked_add(1) {
            Some(bound) => {
                let not_due = self.pending.split_off(&QueueKey { expiry: bound, seq: 0 });
                mem::replace(&mut self.pending, not_due)
            }
            None => mem::take(&mut self.pending),
        };

        let mut expired = Vec::with_capacity(due.len());
        for (key, handle) in due {
            let entry = &mut self.entries[handle.index as usize];
            match mem::replace(&mut entry.slot, Slot::Firing) {
                Slot::Pending { timer, .. } => expired.push(Expired { handle, expiry: key.expiry, timer }),
                other => {
                    warn!("timer queue: index entry {:?} pointed at a slot that was not pending", handle);
                    entry.slot = other;
                }
            }
        }
        expired
    }

    /// Puts a timer handed out by `drain_expired()` back into the queue, keeping its handle.
    ///
    /// Fails, giving the timer back, if it was cancelled while it was firing.
    pub fn rearm(&mut self, handle: TimerHandle, expiry: u64, timer: Timer) -> Result<(), Timer> {
        if self.firing_index(handle).is_none() {
            return Err(timer);
        }
        self.enqueue(handle, expiry, timer);
        Ok(())
    }

    /// Drops a timer handed out by `drain_expired()`, invalidating its handle.
    ///
    /// Returns `false` if it was already cancelled while it was firing.
    pub fn release(&mut self, handle: TimerHandle) -> bool {
        match self.firing_index(handle) {
            Some(index) => {
                self.entries[index].slot = Slot::Vacant;
                self.vacate(index);
                true
            }
            None => false,
        }
    }

    fn enqueue(&mut self, handle: TimerHandle, expiry: u64, timer: Timer) {
        let key = QueueKey { expiry, seq: self.next_seq };
        self.next_seq += 1;
        self.pending.insert(key, handle);
        self.entries[handle.index as usize].slot = Slot::Pending { key, timer };
    }

    /// Bumps the generation of an entry whose slot was just emptied and makes it reusable.
    fn vacate(&mut self, index: usize) {
        let entry = &mut self.entries[index];
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index as u32);
    }

    fn live_index(&self, handle: TimerHandle) -> Option<usize> {
        let index = handle.index as usize;
        match self.entries.get(index) {
            Some(entry) if entry.generation == handle.generation && !matches!(entry.slot, Slot::Vacant) => Some(index),
            _ => None,
        }
    }

    fn firing_index(&self, handle: TimerHandle) -> Option<usize> {
        let index = handle.index as usize;
        match self.entries.get(index) {
            Some(entry) if entry.generation == handle.generation && matches!(entry.slot, Slot::Firing) => Some(index),
            _ => None,
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod test;
