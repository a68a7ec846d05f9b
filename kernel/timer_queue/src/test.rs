//! Tests for expiry ordering, draining and handle invalidation.

extern crate std;

use self::std::sync::{Arc, Mutex};
use self::std::vec::Vec;
use super::*;
use core::time::Duration;

const MS: Duration = Duration::from_millis(1);

fn noop() -> Timer {
    Timer::one_shot(MS, || {})
}

fn expiries(expired: &[Expired]) -> Vec<u64> {
    expired.iter().map(|e| e.expiry).collect()
}

#[test]
fn drains_only_the_due_prefix_in_order() {
    let mut queue = TimerQueue::new();
    queue.insert(7, noop());
    queue.insert(3, noop());
    queue.insert(5, noop());
    queue.insert(12, noop());
    assert_eq!(queue.next_expiry(), Some(3));

    assert!(queue.drain_expired(2).is_empty());
    let due = queue.drain_expired(7);
    assert_eq!(expiries(&due), [3, 5, 7]);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_expiry(), Some(12));
}

#[test]
fn equal_expiries_fire_in_insertion_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut queue = TimerQueue::new();
    for n in 0..4 {
        let order = order.clone();
        queue.insert(10, Timer::one_shot(MS, move || order.lock().unwrap().push(n)));
    }

    for mut expired in queue.drain_expired(10) {
        assert!(!expired.timer.fire());
        assert!(queue.release(expired.handle));
    }
    assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3]);
    assert!(queue.is_empty());
}

#[test]
fn rearmed_timer_keeps_its_handle() {
    let mut queue = TimerQueue::new();
    let handle = queue.insert(1, Timer::repeat(MS, || {}));
    let expired = queue.drain_expired(1).pop().unwrap();
    assert_eq!(expired.handle, handle);
    assert!(queue.contains(handle));
    assert!(queue.is_empty());

    queue.rearm(handle, 2, expired.timer).unwrap();
    assert_eq!(queue.len(), 1);
    assert!(queue.remove(handle).unwrap().is_some());
    assert!(!queue.contains(handle));
}

#[test]
fn released_handle_is_stale_even_after_slot_reuse() {
    let mut queue = TimerQueue::new();
    let first = queue.insert(1, noop());
    let expired = queue.drain_expired(1).pop().unwrap();
    assert!(queue.release(expired.handle));

    // the freed slot gets reused, but under a new generation
    let second = queue.insert(5, noop());
    assert_ne!(first, second);
    assert!(queue.remove(first).is_err());
    assert!(queue.contains(second));
    assert_eq!(queue.len(), 1);
}

#[test]
fn cancelling_twice_is_an_error() {
    let mut queue = TimerQueue::new();
    let handle = queue.insert(4, noop());
    let timer = queue.remove(handle).unwrap().unwrap();
    assert_eq!(timer.interval(), MS);
    assert!(queue.is_empty());
    assert!(queue.remove(handle).is_err());
}

#[test]
fn cancelling_a_firing_timer_prevents_rearm() {
    let mut queue = TimerQueue::new();
    let handle = queue.insert(1, Timer::repeat(MS, || {}));
    let expired = queue.drain_expired(1).pop().unwrap();

    assert!(queue.remove(handle).unwrap().is_none());
    assert!(queue.rearm(handle, 2, expired.timer).is_err());
    assert!(!queue.release(handle));
    assert!(queue.is_empty());
}

#[test]
fn cancelled_timer_is_no_longer_firing() {
    let mut queue = TimerQueue::new();
    let first = queue.insert(3, noop());
    let second = queue.insert(3, noop());
    assert!(queue.get(first).is_some());
    assert!(!queue.is_firing(first));

    let expired = queue.drain_expired(3);
    assert_eq!(expired.len(), 2);
    assert!(queue.is_firing(first) && queue.is_firing(second));
    assert!(queue.get(second).is_none());

    // e.g., the first handler cancels the second timer before it runs
    assert!(queue.remove(second).unwrap().is_none());
    assert!(!queue.is_firing(second));
    assert!(queue.is_firing(first));
    assert!(queue.release(first));
    assert!(!queue.is_firing(first));
}

#[test]
fn repeat_while_checks_condition_after_handler() {
    let fired = Arc::new(Mutex::new(0));
    let (f, c) = (fired.clone(), fired.clone());
    let mut timer = Timer::repeat_while(MS, move || *f.lock().unwrap() += 1, move || *c.lock().unwrap() < 2);
    assert!(timer.fire());
    assert!(!timer.fire());
    assert_eq!(*fired.lock().unwrap(), 2);
}

#[test]
fn iter_follows_firing_order() {
    let mut queue = TimerQueue::new();
    let late = Timer::repeat(MS * 3, || {});
    let late_id = late.id();
    queue.insert(9, late);
    queue.insert(2, noop());
    let order: Vec<_> = queue.iter().map(|(expiry, _)| expiry).collect();
    assert_eq!(order, [2, 9]);
    assert_eq!(queue.iter().last().map(|(_, t)| t.id()), Some(late_id));
}

#[test]
fn timer_ids_are_unique_and_increasing() {
    let a = noop();
    let b = noop();
    assert!(b.id() > a.id());
    assert!(matches!(Timer::new(TimerKind::RepeatWhile(forever()), MS, || {}).kind(), TimerKind::RepeatWhile(_)));
}

#[test]
fn draining_at_the_end_of_time_takes_everything() {
    let mut queue = TimerQueue::new();
    queue.insert(u64::MAX, noop());
    queue.insert(0, noop());
    assert_eq!(expiries(&queue.drain_expired(u64::MAX)), [0, u64::MAX]);
}
