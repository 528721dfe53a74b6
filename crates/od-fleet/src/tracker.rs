//! `ResourceTracker` — create-on-first-use store of [`ResourceRecord`]s.
//!
//! State changes are reported through return values.  An optional listener
//! closure is invoked synchronously by [`ResourceTracker::transition`] for
//! callers that want a running log.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::debug;

use od_core::{NodeId, ResourceId};

use crate::{ResourceRecord, ResourceState};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub resource: ResourceId,
    pub from: ResourceState,
    pub to: ResourceState,
}

pub type StateListener = Box<dyn FnMut(&StateChange) + Send>;

#[derive(Default)]
pub struct ResourceTracker {
    records: FxHashMap<ResourceId, ResourceRecord>,
    listener: Option<StateListener>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: StateListener) -> Self {
        Self { records: FxHashMap::default(), listener: Some(listener) }
    }

    pub fn set_listener(&mut self, listener: StateListener) {
        self.listener = Some(listener);
    }

    /// Record of `id`, created on first use.
    pub fn get(&mut self, id: ResourceId) -> &ResourceRecord {
        self.record_mut(id)
    }

    /// Read-only lookup; `None` if never referenced.
    pub fn peek(&self, id: ResourceId) -> Option<&ResourceRecord> {
        self.records.get(&id)
    }

    /// State of `id`.  Unknown resources have not started.
    pub fn state(&self, id: ResourceId) -> ResourceState {
        self.records.get(&id).map_or(ResourceState::NotStarted, |r| r.state)
    }

    pub fn current_node(&self, id: ResourceId) -> Option<NodeId> {
        self.records
            .get(&id)
            .map(|r| r.current_node)
            .filter(|&n| n != NodeId::INVALID)
    }

    pub fn transition(&mut self, id: ResourceId, to: ResourceState) -> StateChange {
        let record = self.record_mut(id);
        let change = StateChange { resource: id, from: record.state, to };
        record.state = to;
        debug!(resource = %id, from = %change.from, to = %to, "resource state changed");
        if let Some(listener) = self.listener.as_mut() {
            listener(&change);
        }
        change
    }

    pub fn set_current_node(&mut self, id: ResourceId, node: NodeId) {
        self.record_mut(id).current_node = node;
    }

    pub fn add_assigned(&mut self, id: ResourceId, node: NodeId) {
        self.record_mut(id).assigned.push(node);
    }

    /// Returns `false` if `node` was not assigned to `id`.
    pub fn remove_assigned(&mut self, id: ResourceId, node: NodeId) -> bool {
        let assigned = &mut self.record_mut(id).assigned;
        match assigned.iter().position(|&n| n == node) {
            Some(i) => {
                assigned.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn add_served(&mut self, id: ResourceId, node: NodeId) {
        self.record_mut(id).served.push(node);
    }

    /// `true` if every resource in `fleet` is in `state`.
    pub fn all_in(&self, fleet: impl IntoIterator<Item = ResourceId>, state: ResourceState) -> bool {
        fleet.into_iter().all(|id| self.state(id) == state)
    }

    pub fn count_in(&self, fleet: impl IntoIterator<Item = ResourceId>, state: ResourceState) -> usize {
        fleet.into_iter().filter(|&id| self.state(id) == state).count()
    }

    /// Records sorted by id.
    pub fn records(&self) -> Vec<&ResourceRecord> {
        let mut out: Vec<_> = self.records.values().collect();
        out.sort_by_key(|r| r.id);
        out
    }

    fn record_mut(&mut self, id: ResourceId) -> &mut ResourceRecord {
        self.records.entry(id).or_insert_with(|| ResourceRecord::new(id))
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("records", &self.records())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
