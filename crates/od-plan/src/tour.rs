//! One resource's route with its time schedule.
//!
//! # Schedule
//!
//! `nodes[0]` is where the resource currently is; it may leave at
//! `available_at`.  The forward pass computes, for each position `i > 0`:
//!
//!   arrival[i]   = max(departure[i-1] + travel(i-1, i), freeze[i].arrival)
//!   start[i]     = max(arrival[i], window[i].start)
//!   departure[i] = max(start[i] + service[i], freeze[i].departure)
//!
//! The backward pass computes the latest departure from each position that
//! still lets every later node start service inside its window.

use rustc_hash::FxHashMap;

use od_core::{NodeId, ResourceId, SimTime};
use od_model::{CostModel, Instance};

use crate::{PlanError, PlanResult};

/// Lower bounds placed on a node by a freeze.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Freeze {
    pub arrival: SimTime,
    pub departure: SimTime,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Visit {
    arrival: SimTime,
    start: SimTime,
    departure: SimTime,
    latest_departure: SimTime,
}

#[derive(Clone, Debug)]
pub struct Tour {
    resource: ResourceId,
    nodes: Vec<NodeId>,
    available_at: SimTime,
    freezes: FxHashMap<NodeId, Freeze>,
    schedule: Vec<Visit>,
    /// First position whose arrival misses its window, if any.
    violation: Option<usize>,
}

impl Tour {
    pub fn new(resource: ResourceId, start: NodeId, available_at: SimTime) -> Self {
        Self {
            resource,
            nodes: vec![start],
            available_at,
            freezes: FxHashMap::default(),
            schedule: Vec::new(),
            violation: None,
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn current(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn next(&self) -> Option<NodeId> {
        self.nodes.get(1).copied()
    }

    pub fn available_at(&self) -> SimTime {
        self.available_at
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.position(node).is_some()
    }

    pub fn freeze_at(&self, node: NodeId) -> Option<Freeze> {
        self.freezes.get(&node).copied()
    }

    pub fn is_frozen(&self) -> bool {
        !self.freezes.is_empty()
    }

    pub fn is_feasible(&self) -> bool {
        self.violation.is_none()
    }

    // ── Schedule queries ──────────────────────────────────────────────────────

    pub fn arrival(&self, node: NodeId) -> Option<SimTime> {
        self.visit(node).map(|v| v.arrival)
    }

    pub fn service_start(&self, node: NodeId) -> Option<SimTime> {
        self.visit(node).map(|v| v.start)
    }

    pub fn departure(&self, node: NodeId) -> Option<SimTime> {
        self.visit(node).map(|v| v.departure)
    }

    pub fn latest_departure(&self, node: NodeId) -> Option<SimTime> {
        self.visit(node).map(|v| v.latest_departure)
    }

    pub fn wait_departure(&self, node: NodeId) -> Option<SimTime> {
        let i = self.position(node)?;
        let here = self.schedule.get(i)?;
        let wait = self
            .schedule
            .get(i + 1)
            .map(|succ| succ.start - succ.arrival)
            .unwrap_or(0.0);
        Some(here.departure + wait)
    }

    /// Time the resource finishes at its last node.
    pub fn end_time(&self) -> Option<SimTime> {
        self.schedule.last().map(|v| v.departure)
    }

    fn visit(&self, node: NodeId) -> Option<&Visit> {
        self.position(node).and_then(|i| self.schedule.get(i))
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Replace everything after the current node with `route`.
    pub(crate) fn set_route(&mut self, route: &[NodeId]) {
        let current = self.nodes[0];
        self.nodes.truncate(1);
        self.nodes.extend(route.iter().copied().filter(|&n| n != current));
        let nodes = &self.nodes;
        self.freezes.retain(|n, _| nodes.contains(n));
    }

    /// Move the tour start to `node`, dropping the visited prefix.
    pub(crate) fn advance_to(&mut self, node: NodeId, available_at: SimTime) {
        match self.position(node) {
            Some(i) => {
                self.nodes.drain(..i);
            }
            None => self.nodes.insert(0, node),
        }
        self.available_at = available_at;
        let nodes = &self.nodes;
        self.freezes.retain(|n, _| nodes.contains(n));
    }

    /// Remove `node` from the route.  The current node cannot be removed.
    pub(crate) fn remove(&mut self, node: NodeId) -> bool {
        match self.position(node) {
            Some(i) if i > 0 => {
                self.nodes.remove(i);
                self.freezes.remove(&node);
                true
            }
            _ => false,
        }
    }

    /// Tighten the bounds at `node`.  Returns `false` if `node` is not on the tour.
    pub(crate) fn freeze(&mut self, node: NodeId, arrival: SimTime, departure: SimTime) -> bool {
        if !self.contains(node) {
            return false;
        }
        let f = self.freezes.entry(node).or_insert(Freeze { arrival, departure });
        f.arrival = f.arrival.max(arrival);
        f.departure = f.departure.max(departure);
        true
    }

    pub(crate) fn unfreeze(&mut self) {
        self.freezes.clear();
    }

    // ── Schedule passes ───────────────────────────────────────────────────────

    /// Recompute the schedule after any change to route, bounds or start.
    pub(crate) fn refresh(&mut self, instance: &Instance, cost: &dyn CostModel) {
        let n = self.nodes.len();
        self.schedule.clear();
        self.violation = None;

        // Forward pass.
        for i in 0..n {
            let node = self.nodes[i];
            let freeze = self.freezes.get(&node).copied();
            let (window, service) = match instance.node(node) {
                Ok(meta) => (meta.time_window, meta.service_time),
                Err(_) => {
                    self.violation = self.violation.or(Some(i));
                    break;
                }
            };
            let visit = if i == 0 {
                let arrival = freeze.map_or(self.available_at, |f| f.arrival.max(self.available_at));
                let departure = freeze.map_or(arrival, |f| arrival.max(f.departure));
                Visit { arrival, start: arrival, departure, latest_departure: SimTime::INFINITY }
            } else {
                let prev = self.schedule[i - 1].departure;
                let travel = cost.travel_time(self.nodes[i - 1], node, self.resource);
                let mut arrival = prev + travel;
                if let Some(f) = freeze {
                    arrival = arrival.max(f.arrival);
                }
                let start = window.service_start(arrival);
                let mut departure = start + service;
                if let Some(f) = freeze {
                    departure = departure.max(f.departure);
                }
                if !window.is_feasible(arrival) {
                    self.violation = self.violation.or(Some(i));
                }
                Visit { arrival, start, departure, latest_departure: SimTime::INFINITY }
            };
            self.schedule.push(visit);
        }
        if self.schedule.len() != n {
            return;
        }

        // Backward pass.
        let mut latest_start_next = SimTime::INFINITY;
        for i in (0..n).rev() {
            let node = self.nodes[i];
            if i + 1 < n {
                let travel = cost.travel_time(node, self.nodes[i + 1], self.resource);
                self.schedule[i].latest_departure = latest_start_next - travel;
            }
            if let Ok(meta) = instance.node(node) {
                let by_departure = self.schedule[i].latest_departure - meta.service_time;
                latest_start_next = meta.time_window.end.min(by_departure);
            }
        }
    }

    /// `Err(Infeasible)` describing the first violated window, if any.
    pub(crate) fn check(&self, instance: &Instance) -> PlanResult<()> {
        let Some(i) = self.violation else {
            return Ok(());
        };
        let node = self.nodes[i];
        let deadline = instance.node(node)?.time_window.end;
        let arrival = self.schedule.get(i).map_or(f64::INFINITY, |v| v.arrival.0);
        Err(PlanError::Infeasible {
            resource: self.resource,
            node,
            arrival,
            deadline: deadline.0,
        })
    }
}
