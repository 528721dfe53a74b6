//! `EventQueue` — future events ordered by time, then by insertion order.
//!
//! Backed by a `BTreeMap` keyed on `(time, seq)`: O(log n) schedule and pop,
//! plus ordered in-place iteration for the cleaners.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use od_core::SimTime;

use crate::{Event, EventError, EventResult, QueueCleaner};

// ── ScheduledEvent ────────────────────────────────────────────────────────────

/// An event together with its insertion sequence number.
#[derive(Copy, Clone, Debug)]
pub struct ScheduledEvent {
    pub seq: u64,
    pub event: Event,
}

impl ScheduledEvent {
    #[inline]
    pub fn time(&self) -> SimTime {
        self.event.time
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .time
            .cmp(&other.event.time)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── EventQueue ────────────────────────────────────────────────────────────────

#[derive(Default, Debug)]
pub struct EventQueue {
    inner: BTreeMap<(SimTime, u64), Event>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `event`; fails if it lies before `now`.  Returns its sequence number.
    pub fn schedule(&mut self, event: Event, now: SimTime) -> EventResult<u64> {
        if !event.time.is_finite() {
            return Err(EventError::NonFiniteTime { event: event.to_string() });
        }
        if event.time < now {
            return Err(EventError::ScheduledInPast {
                event: event.to_string(),
                time: event.time.0,
                now: now.0,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(%event, seq, "event scheduled");
        self.inner.insert((event.time, seq), event);
        Ok(seq)
    }

    pub fn peek(&self) -> Option<ScheduledEvent> {
        self.inner
            .iter()
            .next()
            .map(|(&(_, seq), &event)| ScheduledEvent { seq, event })
    }

    /// Time of the earliest queued event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.inner.keys().next().map(|&(t, _)| t)
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.inner
            .pop_first()
            .map(|((_, seq), event)| ScheduledEvent { seq, event })
    }

    /// Pop the head only if it is due at `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<ScheduledEvent> {
        match self.peek_time() {
            Some(t) if t <= now => self.pop(),
            _ => None,
        }
    }

    /// Offer every queued event to `cleaner`, latest first, and remove the
    /// ones it selects.  The cleaner may edit an event before removing it.
    pub fn remove_where<C: QueueCleaner + ?Sized>(&mut self, cleaner: &mut C) -> Vec<ScheduledEvent> {
        cleaner.begin();
        let mut doomed = Vec::new();
        for (&key, event) in self.inner.iter_mut().rev() {
            if cleaner.remove(event) {
                doomed.push(key);
            }
        }
        let mut removed: Vec<ScheduledEvent> = doomed
            .into_iter()
            .filter_map(|key| {
                self.inner
                    .remove(&key)
                    .map(|event| ScheduledEvent { seq: key.1, event })
            })
            .collect();
        removed.sort();
        if !removed.is_empty() {
            debug!(count = removed.len(), "events removed from queue");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ScheduledEvent> + '_ {
        self.inner
            .iter()
            .map(|(&(_, seq), &event)| ScheduledEvent { seq, event })
    }

    /// Queued events in dispatch order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.values().copied().collect()
    }
}
