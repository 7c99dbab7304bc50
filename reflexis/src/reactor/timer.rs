use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

/// Receiver of timer callbacks.
///
/// Timeables are compared by reference identity: scheduling against a
/// timeable that already has a timer replaces its entry, and
/// `cancel_timer` removes whatever entry its timeable currently owns.
pub trait Timeable<T>: Send + Sync {
    /// Called on the reactor thread when the timer expires. For a repeating
    /// timer this fires once per (non-merged) interval, with the data bound
    /// at scheduling time.
    fn on_tick(&self, data: &T);
}

/// Position of an entry in the ordered timer set.
///
/// Ordering is `(trigger, seq)` where `seq` is a monotone insertion
/// counter, so entries with equal triggers fire in scheduling order and the
/// order is deterministic across runs.
pub(crate) type TimerPos = (u64, u64);

/// The tick closure of one timer, with its data bound in.
///
/// Shared between the registry and an in-flight invocation so a repeating
/// entry can be re-armed before its tick runs.
pub(crate) type TimerTick = Arc<Mutex<Box<dyn FnMut() + Send>>>;

pub(crate) struct TimerEntry {
    pub(crate) key: usize,
    pub(crate) interval_ms: u64,
    pub(crate) tick: TimerTick,
}

/// The reactor's timer state: an ordered set of entries plus an index from
/// timeable identity onto the owning entry, for replace and cancel.
pub(crate) struct TimerRegistry {
    entries: BTreeMap<TimerPos, TimerEntry>,
    index: FxHashMap<usize, TimerPos>,
    seq: u64,
}

impl TimerRegistry {
    pub(crate) fn new() -> Self {
        TimerRegistry {
            entries: BTreeMap::new(),
            index: FxHashMap::default(),
            seq: 0,
        }
    }

    /// Schedules a timer, replacing any entry the same key already owns.
    /// An interval of zero makes the timer one-shot.
    pub(crate) fn schedule(
        &mut self,
        key: usize,
        trigger_ms: u64,
        interval_ms: u64,
        tick: Box<dyn FnMut() + Send>,
    ) {
        if let Some(position) = self.index.remove(&key) {
            self.entries.remove(&position);
        }
        let position = (trigger_ms, self.next_seq());
        self.entries.insert(
            position,
            TimerEntry {
                key,
                interval_ms,
                tick: Arc::new(Mutex::new(tick)),
            },
        );
        self.index.insert(key, position);
    }

    /// Cancels the entry owned by `key`; a no-op when there is none.
    pub(crate) fn cancel(&mut self, key: usize) {
        if let Some(position) = self.index.remove(&key) {
            self.entries.remove(&position);
        }
    }

    /// Returns the trigger time of the earliest entry.
    pub(crate) fn next_trigger(&self) -> Option<u64> {
        self.entries.keys().next().map(|(trigger, _)| *trigger)
    }

    /// Pops the earliest entry if it has expired.
    ///
    /// One-shot entries are unindexed here, before their tick runs, so the
    /// timeable is free to schedule itself again from the tick.
    pub(crate) fn pop_expired(&mut self, now_ms: u64) -> Option<(TimerPos, TimerEntry)> {
        let position = *self.entries.keys().next()?;
        if position.0 > now_ms {
            return None;
        }
        let entry = self
            .entries
            .remove(&position)
            .expect("timer set lost its first entry");
        if entry.interval_ms == 0 {
            self.index.remove(&entry.key);
        }
        Some((position, entry))
    }

    /// Re-arms a repeating entry at a new trigger, keeping its seq.
    pub(crate) fn rearm(&mut self, position: TimerPos, entry: TimerEntry) {
        self.index.insert(entry.key, position);
        self.entries.insert(position, entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}
