//! Unit tests for od-fleet.

use std::sync::{Arc, Mutex};

use od_core::{NodeId, ResourceId};

use crate::*;

const R0: ResourceId = ResourceId(0);
const R1: ResourceId = ResourceId(1);

#[cfg(test)]
mod tracker {
    use super::*;

    #[test]
    fn records_are_created_lazily() {
        let mut t = ResourceTracker::new();
        assert!(t.peek(R0).is_none());
        assert_eq!(t.state(R0), ResourceState::NotStarted);
        let rec = t.get(R0);
        assert_eq!(rec.id, R0);
        assert_eq!(rec.current_node, NodeId::INVALID);
        assert!(t.peek(R0).is_some());
        assert_eq!(t.current_node(R0), None);
    }

    #[test]
    fn transition_reports_change() {
        let mut t = ResourceTracker::new();
        let c = t.transition(R0, ResourceState::Idle);
        assert_eq!(c, StateChange { resource: R0, from: ResourceState::NotStarted, to: ResourceState::Idle });
        let c = t.transition(R0, ResourceState::Busy);
        assert_eq!(c.from, ResourceState::Idle);
        assert_eq!(t.state(R0), ResourceState::Busy);
    }

    #[test]
    fn listener_sees_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut t = ResourceTracker::with_listener(Box::new(move |c: &StateChange| {
            sink.lock().unwrap().push((c.resource, c.to));
        }));
        t.transition(R0, ResourceState::Idle);
        t.transition(R1, ResourceState::Idle);
        t.transition(R0, ResourceState::Stopped);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(R0, ResourceState::Idle), (R1, ResourceState::Idle), (R0, ResourceState::Stopped)]
        );
    }

    #[test]
    fn assigned_and_served_lists() {
        let mut t = ResourceTracker::new();
        t.add_assigned(R0, NodeId(4));
        t.add_assigned(R0, NodeId(5));
        assert!(t.remove_assigned(R0, NodeId(4)));
        assert!(!t.remove_assigned(R0, NodeId(4)));
        t.add_served(R0, NodeId(4));
        t.set_current_node(R0, NodeId(4));
        let rec = t.peek(R0).unwrap();
        assert_eq!(rec.assigned, vec![NodeId(5)]);
        assert_eq!(rec.served, vec![NodeId(4)]);
        assert_eq!(t.current_node(R0), Some(NodeId(4)));
    }

    #[test]
    fn fleet_queries() {
        let mut t = ResourceTracker::new();
        let fleet = [R0, R1];
        assert!(t.all_in(fleet, ResourceState::NotStarted));
        t.transition(R0, ResourceState::Stopped);
        assert!(!t.all_in(fleet, ResourceState::Stopped));
        assert_eq!(t.count_in(fleet, ResourceState::Stopped), 1);
        t.transition(R1, ResourceState::Stopped);
        assert!(t.all_in(fleet, ResourceState::Stopped));
        assert_eq!(t.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![R0, R1]);
    }
}

#[cfg(test)]
mod ledger {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut l = RequestLedger::new();
        assert!(l.release(NodeId(4)));
        assert!(!l.release(NodeId(4)));
        l.release(NodeId(5));
        l.release(NodeId(6));
        assert_eq!(l.unserved_released().len(), 3);

        l.assign(NodeId(4));
        assert!(!l.unserved_released().contains(&NodeId(4)));
        assert!(!l.is_served(NodeId(4)));
        l.serve(NodeId(4));
        assert!(l.is_served(NodeId(4)));

        l.reject(NodeId(5));
        assert_eq!(l.unserved_released().iter().copied().collect::<Vec<_>>(), vec![NodeId(6)]);
        assert_eq!(l.rejected().len(), 1);
        assert_eq!(l.released().len(), 3);
    }

    #[test]
    fn served_before_release_stays_out_of_pending() {
        let mut l = RequestLedger::new();
        l.serve(NodeId(0));
        l.release(NodeId(0));
        assert!(l.unserved_released().is_empty());
        assert!(l.is_released(NodeId(0)));
    }
}
