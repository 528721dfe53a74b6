//! Conditional bulk removal from the event queue.
//!
//! A cleaner sees queued events latest-first (see
//! [`EventQueue::remove_where`](crate::EventQueue::remove_where)).

use od_core::{ResourceId, SimTime};

use crate::{Event, EventKind, EventTag};

pub trait QueueCleaner {
    /// Reset per-pass state.  Called once before each pass.
    fn begin(&mut self) {}

    /// `true` to remove `event`.
    fn remove(&mut self, event: &mut Event) -> bool;
}

impl<F: FnMut(&mut Event) -> bool> QueueCleaner for F {
    fn remove(&mut self, event: &mut Event) -> bool {
        self(event)
    }
}

// ── DuplicateEventCleaner ─────────────────────────────────────────────────────

/// Coalesces events of one kind that lie within `tolerance` of each other.
///
/// Of two such events the earlier one is removed.  The reference point moves
/// to every event of the kind it sees, so a chain of close events collapses
/// onto its latest member.
#[derive(Clone, Debug)]
pub struct DuplicateEventCleaner {
    tag: EventTag,
    tolerance: f64,
    last: Option<SimTime>,
}

impl DuplicateEventCleaner {
    pub fn new(tag: EventTag, tolerance: f64) -> Self {
        Self { tag, tolerance, last: None }
    }
}

impl QueueCleaner for DuplicateEventCleaner {
    fn begin(&mut self) {
        self.last = None;
    }

    fn remove(&mut self, event: &mut Event) -> bool {
        if event.tag() != self.tag {
            return false;
        }
        let duplicate = self
            .last
            .is_some_and(|t| (t - event.time).abs() < self.tolerance);
        self.last = Some(event.time);
        duplicate
    }
}

// ── AssignmentCleaner ─────────────────────────────────────────────────────────

/// Retracts pending `RequestAssigned` events of one resource, clearing their
/// projected arrival.
#[derive(Copy, Clone, Debug)]
pub struct AssignmentCleaner {
    pub resource: ResourceId,
}

impl QueueCleaner for AssignmentCleaner {
    fn remove(&mut self, event: &mut Event) -> bool {
        match &mut event.kind {
            EventKind::RequestAssigned { resource, arrival, .. } if *resource == self.resource => {
                *arrival = None;
                true
            }
            _ => false,
        }
    }
}
