//! Cycle timers for the simulation clock.
//!
//! The clock is external: the scheduler only learns the time when the
//! board asks it to fire everything due up to some cycle. Entries are keyed
//! by (owner, timer) so a device has at most one pending entry per timer;
//! scheduling the same key again replaces the old entry. Cancelled and
//! replaced entries stay in the heap and are skipped when they surface.

use crate::device::DeviceId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Simulated clock cycles.
pub type Cycle = u64;

/// Per-device timer number (the device's own enum, as an integer).
pub type TimerId = u16;

/// Identity of a timer: one pending entry at most per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub owner: DeviceId,
    pub timer: TimerId,
}

impl TimerKey {
    pub fn new(owner: DeviceId, timer: TimerId) -> Self {
        Self { owner, timer }
    }
}

/// Returned by the schedule calls; cancelling a stale handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    key: TimerKey,
    id: u64,
}

impl TimerHandle {
    pub fn key(&self) -> TimerKey {
        self.key
    }
}

/// A timer that reached its fire cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub key: TimerKey,
    pub when: Cycle,
    pub period: Cycle,
    /// Handle identity, kept when the timer is re-armed.
    id: u64,
}

#[derive(Debug, Clone, Copy)]
struct Active {
    /// Identity handed out in the `TimerHandle`.
    id: u64,
    /// Sequence number of the live heap entry.
    seq: u64,
    when: Cycle,
    period: Cycle,
}

/// Heap entry, ordered so the earliest cycle (then the earliest schedule
/// call) pops first from the max-heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    when: Cycle,
    seq: u64,
    key: TimerKey,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Cycle,
    next_seq: u64,
    heap: BinaryHeap<Pending>,
    active: HashMap<TimerKey, Active>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Fires once, `delay` cycles from now.
    pub fn schedule_after(&mut self, key: TimerKey, delay: Cycle) -> TimerHandle {
        self.insert(key, self.now.saturating_add(delay), 0)
    }

    /// Fires once at the absolute cycle `when` (or at the next firing pass
    /// if `when` is already in the past).
    pub fn schedule_at(&mut self, key: TimerKey, when: Cycle) -> TimerHandle {
        self.insert(key, when.max(self.now), 0)
    }

    /// Fires `delay` cycles from now and then every `period` cycles until
    /// cancelled or until the callback asks to stop.
    pub fn schedule_periodic(&mut self, key: TimerKey, delay: Cycle, period: Cycle) -> TimerHandle {
        self.insert(key, self.now.saturating_add(delay), period)
    }

    /// Removes the pending entry behind `handle`. A periodic or re-armed
    /// timer keeps its handle across repeats. Returns false when the handle
    /// already fired for good, was replaced, or was never issued.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.active.get(&handle.key) {
            Some(active) if active.id == handle.id => {
                self.active.remove(&handle.key);
                true
            }
            _ => false,
        }
    }

    /// Removes whatever entry is pending for `key`.
    pub fn cancel_key(&mut self, key: TimerKey) -> bool {
        self.active.remove(&key).is_some()
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.active.contains_key(&key)
    }

    /// Fire cycle of the pending entry for `key`.
    pub fn due_at(&self, key: TimerKey) -> Option<Cycle> {
        self.active.get(&key).map(|a| a.when)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Earliest live fire cycle.
    pub fn next_due(&mut self) -> Option<Cycle> {
        self.discard_stale();
        self.heap.peek().map(|p| p.when)
    }

    /// Pops the next live entry due at or before `limit`, moving the clock
    /// to its fire cycle. The entry is no longer pending once returned.
    pub fn pop_due(&mut self, limit: Cycle) -> Option<Expired> {
        self.discard_stale();
        let top = *self.heap.peek()?;
        if top.when > limit {
            return None;
        }
        self.heap.pop();
        let active = self.active.remove(&top.key)?;
        self.now = self.now.max(top.when);
        Some(Expired {
            key: top.key,
            when: top.when,
            period: active.period,
            id: active.id,
        })
    }

    /// Applies a fired callback's return value: `Some(cycle)` later than the
    /// fire cycle reschedules there, otherwise a periodic entry repeats
    /// after its period. Does nothing if the callback already scheduled
    /// the same key itself.
    pub fn reschedule(&mut self, expired: &Expired, next: Option<Cycle>) {
        if self.active.contains_key(&expired.key) {
            return;
        }
        match next {
            Some(when) if when > expired.when => {
                self.arm(expired.key, when, expired.period, Some(expired.id));
            }
            Some(when) if when != 0 => {
                tracing::warn!(
                    owner = expired.key.owner.0,
                    timer = expired.key.timer,
                    when,
                    fired = expired.when,
                    "timer asked to reschedule into the past, dropping it"
                );
            }
            _ if expired.period > 0 => {
                let when = expired.when + expired.period;
                self.arm(expired.key, when, expired.period, Some(expired.id));
            }
            _ => {}
        }
    }

    /// Moves the clock forward without firing anything. Never moves it back.
    pub fn advance_to(&mut self, cycle: Cycle) {
        self.now = self.now.max(cycle);
    }

    /// Fires everything due up to `limit` through `fire`, applying its
    /// return value as the next fire cycle, then moves the clock to `limit`.
    pub fn run_until<F>(&mut self, limit: Cycle, mut fire: F)
    where
        F: FnMut(TimerKey, Cycle) -> Option<Cycle>,
    {
        while let Some(expired) = self.pop_due(limit) {
            let next = fire(expired.key, expired.when);
            self.reschedule(&expired, next);
        }
        self.advance_to(limit);
    }

    fn insert(&mut self, key: TimerKey, when: Cycle, period: Cycle) -> TimerHandle {
        self.arm(key, when, period, None)
    }

    /// Pushes a heap entry for `key`. A re-armed timer passes its old `id`
    /// so outstanding handles stay valid; the heap entry always takes a
    /// fresh sequence number for FIFO order.
    fn arm(&mut self, key: TimerKey, when: Cycle, period: Cycle, id: Option<u64>) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = id.unwrap_or(seq);
        self.active.insert(key, Active { id, seq, when, period });
        self.heap.push(Pending { when, seq, key });
        if self.heap.len() > 4 * self.active.len() + 64 {
            self.compact();
        }
        TimerHandle { key, id }
    }

    /// Drops every cancelled or replaced entry. Devices that re-arm a timer
    /// on each input edge would otherwise grow the heap without bound.
    fn compact(&mut self) {
        let active = &self.active;
        self.heap
            .retain(|p| active.get(&p.key).is_some_and(|a| a.seq == p.seq));
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            match self.active.get(&top.key) {
                Some(active) if active.seq == top.seq => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(owner: usize, timer: TimerId) -> TimerKey {
        TimerKey::new(DeviceId(owner), timer)
    }

    #[test]
    fn fires_once_at_the_requested_cycle() {
        let mut s = Scheduler::new();
        s.schedule_after(key(0, 0), 100);
        let mut fired = Vec::new();
        s.run_until(99, |k, when| {
            fired.push((k, when));
            None
        });
        assert!(fired.is_empty());
        s.run_until(1_000, |k, when| {
            fired.push((k, when));
            None
        });
        assert_eq!(fired, vec![(key(0, 0), 100)]);
        assert_eq!(s.now(), 1_000);
        assert!(s.is_empty());
    }

    #[test]
    fn rearming_one_timer_keeps_the_heap_small() {
        let mut s = Scheduler::new();
        for i in 0..10_000 {
            s.schedule_after(key(0, 0), 1_000 + i);
        }
        assert_eq!(s.len(), 1);
        assert!(s.heap.len() <= 4 + 64 + 1);
        assert_eq!(s.next_due(), Some(1_000 + 9_999));
    }

    #[test]
    fn random_schedules_fire_in_cycle_order() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let mut s = Scheduler::new();
        let mut expected = HashMap::new();
        for _ in 0..500 {
            let k = key(rng.random_range(0..8), rng.random_range(0..8));
            let delay = rng.random_range(0..10_000);
            s.schedule_after(k, delay);
            expected.insert(k, delay);
            if rng.random_bool(0.2) {
                s.cancel_key(k);
                expected.remove(&k);
            }
        }
        let mut fired = Vec::new();
        s.run_until(10_000, |k, when| {
            fired.push((k, when));
            None
        });
        assert!(fired.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(fired.len(), expected.len());
        for (k, when) in fired {
            assert_eq!(expected[&k], when);
        }
    }

    #[test]
    fn equal_cycles_fire_in_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule_after(key(3, 0), 10);
        s.schedule_after(key(1, 0), 10);
        s.schedule_after(key(2, 0), 5);
        s.schedule_after(key(0, 0), 10);
        let mut order = Vec::new();
        s.run_until(10, |k, _| {
            order.push(k.owner.0);
            None
        });
        assert_eq!(order, vec![2, 3, 1, 0]);
    }

    #[test]
    fn callback_return_value_reschedules() {
        let mut s = Scheduler::new();
        s.schedule_after(key(0, 1), 10);
        let mut hits = Vec::new();
        s.run_until(45, |_, when| {
            hits.push(when);
            Some(when + 10)
        });
        assert_eq!(hits, vec![10, 20, 30, 40]);
        assert_eq!(s.due_at(key(0, 1)), Some(50));
    }

    #[test]
    fn periodic_entries_repeat_until_cancelled() {
        let mut s = Scheduler::new();
        let handle = s.schedule_periodic(key(0, 2), 5, 5);
        let mut hits = 0;
        s.run_until(20, |_, _| {
            hits += 1;
            None
        });
        assert_eq!(hits, 4);
        // the handle survives every repeat
        assert!(s.cancel(handle));
        assert!(!s.cancel(handle));
        s.run_until(100, |_, _| {
            hits += 1;
            None
        });
        assert_eq!(hits, 4);
    }

    #[test]
    fn cancel_after_a_repeat_stops_the_timer() {
        let mut s = Scheduler::new();
        let handle = s.schedule_periodic(key(1, 0), 10, 10);
        let mut hits = 0;
        s.run_until(15, |_, _| {
            hits += 1;
            None
        });
        assert_eq!(hits, 1);
        assert!(s.cancel(handle));
        s.run_until(100, |_, _| {
            hits += 1;
            None
        });
        assert_eq!(hits, 1);
        assert!(s.is_empty());
    }

    #[test]
    fn self_rearmed_timer_keeps_its_handle() {
        let mut s = Scheduler::new();
        let handle = s.schedule_after(key(2, 1), 5);
        s.run_until(5, |_, when| Some(when + 7));
        assert_eq!(s.due_at(key(2, 1)), Some(12));
        assert!(s.cancel(handle));
        assert!(!s.is_pending(key(2, 1)));
    }

    #[test]
    fn repeats_queue_behind_entries_already_due_at_the_same_cycle() {
        let mut s = Scheduler::new();
        s.schedule_periodic(key(0, 0), 10, 10);
        s.schedule_after(key(1, 0), 20);
        let mut order = Vec::new();
        s.run_until(20, |k, when| {
            order.push((k.owner.0, when));
            None
        });
        // owner 0 was re-armed for 20 after owner 1 was scheduled
        assert_eq!(order, vec![(0, 10), (1, 20), (0, 20)]);
    }

    #[test]
    fn rescheduling_a_key_replaces_the_pending_entry() {
        let mut s = Scheduler::new();
        let first = s.schedule_after(key(0, 0), 10);
        s.schedule_after(key(0, 0), 30);
        assert_eq!(s.len(), 1);
        // the replaced handle is stale
        assert!(!s.cancel(first));
        let mut fired = Vec::new();
        s.run_until(100, |_, when| {
            fired.push(when);
            None
        });
        assert_eq!(fired, vec![30]);
    }

    #[test]
    fn cancel_removes_due_entries_and_ignores_unknown_handles() {
        let mut s = Scheduler::new();
        let handle = s.schedule_after(key(0, 0), 0);
        assert!(s.cancel(handle));
        assert!(!s.cancel(handle));
        let mut fired = false;
        s.run_until(10, |_, _| {
            fired = true;
            None
        });
        assert!(!fired);
    }
}
