//! Unit tests for od-model.

use od_core::{NodeId, ResourceId, SimTime, TimeWindow};

use crate::*;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Two resources at the origin, three requests on the x axis.
fn toy() -> Instance {
    let mut b = InstanceBuilder::new("toy", TimeWindow::new(0.0, 100.0)).group("R1");
    b.add_resource(Point::new(0.0, 0.0));
    b.add_resource(Point::new(0.0, 0.0));
    b.add_request(Point::new(3.0, 4.0), TimeWindow::new(10.0, 30.0), 2.0, None);
    b.add_request(Point::new(6.0, 8.0), TimeWindow::new(20.0, 60.0), 2.0, Some(SimTime(5.0)));
    b.add_request(Point::new(1.0, 0.0), TimeWindow::new(0.0, 90.0), 1.0, Some(SimTime(2.0)));
    b.build().unwrap()
}

#[cfg(test)]
mod instance {
    use super::*;

    #[test]
    fn layout_puts_homes_first() {
        let inst = toy();
        assert_eq!(inst.fleet_size(), 2);
        assert_eq!(inst.request_count(), 3);
        assert_eq!(inst.node_count(), 7);
        let r0 = inst.resource(ResourceId(0)).unwrap();
        assert_eq!(r0.start_home, NodeId(0));
        assert_eq!(r0.end_home, NodeId(1));
        assert!(inst.is_end_home_of(ResourceId(0), NodeId(1)));
        assert!(!inst.is_end_home_of(ResourceId(1), NodeId(1)));
        assert!(inst.is_home(NodeId(2)));
        assert!(!inst.is_home(NodeId(4)));
    }

    #[test]
    fn homes_inherit_depot_window() {
        let inst = toy();
        assert_eq!(inst.node(NodeId(0)).unwrap().time_window, inst.depot_window());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let inst = toy();
        assert_eq!(inst.node(NodeId(99)).unwrap_err(), ModelError::UnknownNode(NodeId(99)));
        assert!(inst.resource(ResourceId(5)).is_err());
    }

    #[test]
    fn release_schedule_is_sorted() {
        let inst = toy();
        assert_eq!(
            inst.release_schedule(),
            vec![(SimTime(2.0), NodeId(6)), (SimTime(5.0), NodeId(5))]
        );
        assert_eq!(inst.static_requests().collect::<Vec<_>>(), vec![NodeId(4)]);
    }

    #[test]
    fn cutoff_is_fraction_of_depot_end() {
        let inst = toy().with_cutoff_fraction(Some(0.357)).unwrap();
        let c = inst.cutoff_time().unwrap();
        assert!(c.approx_eq(SimTime(35.7), 1e-9));
        assert!(!inst.is_past_cutoff(SimTime(35.0)));
        assert!(inst.is_past_cutoff(SimTime(36.0)));
    }

    #[test]
    fn no_cutoff_is_never_reached() {
        let inst = toy();
        assert_eq!(inst.cutoff_time(), None);
        assert!(!inst.is_past_cutoff(SimTime(1e9)));
    }

    #[test]
    fn builder_validation() {
        let b = InstanceBuilder::new("empty", TimeWindow::new(0.0, 10.0));
        assert_eq!(b.build().unwrap_err(), ModelError::NoResources);

        let mut b = InstanceBuilder::new("bad", TimeWindow::new(0.0, 10.0));
        b.add_resource(Point::default());
        b.add_request(Point::default(), TimeWindow::new(5.0, 1.0), 0.0, None);
        assert!(matches!(b.build(), Err(ModelError::InvalidWindow { .. })));

        let mut b = InstanceBuilder::new("late", TimeWindow::new(0.0, 10.0));
        b.add_resource(Point::default());
        b.add_request(Point::default(), TimeWindow::new(0.0, 5.0), 0.0, Some(SimTime(6.0)));
        assert!(matches!(b.build(), Err(ModelError::LateRelease { .. })));

        let b = InstanceBuilder::new("cut", TimeWindow::new(0.0, 10.0)).cutoff_fraction(1.5);
        let mut b = b;
        b.add_resource(Point::default());
        assert_eq!(b.build().unwrap_err(), ModelError::InvalidCutoff(1.5));
    }
}

#[cfg(test)]
mod cost {
    use super::*;

    #[test]
    fn euclidean_distance_over_speed() {
        let inst = toy();
        let c = EuclideanCost::from_instance(&inst);
        assert_eq!(c.travel_time(NodeId(0), NodeId(4), ResourceId(0)), 5.0);
        assert_eq!(c.travel_time(NodeId(4), NodeId(4), ResourceId(0)), 0.0);
        assert_eq!(c.travel_time(NodeId(0), NodeId(42), ResourceId(0)), f64::INFINITY);

        let locs = inst.nodes().iter().map(|n| n.location).collect();
        let fast = EuclideanCost::new(locs, 2.0).unwrap();
        assert_eq!(fast.travel_time(NodeId(0), NodeId(5), ResourceId(1)), 5.0);
        assert!(EuclideanCost::new(vec![], 0.0).is_err());
    }

    #[test]
    fn matrix_lookup() {
        let mut m = MatrixCost::uniform(3, 4.0);
        assert_eq!(m.travel_time(NodeId(0), NodeId(0), ResourceId(0)), 0.0);
        assert_eq!(m.travel_time(NodeId(0), NodeId(2), ResourceId(0)), 4.0);
        m.set(NodeId(2), NodeId(0), 7.5);
        assert_eq!(m.travel_time(NodeId(2), NodeId(0), ResourceId(0)), 7.5);
        assert_eq!(m.travel_time(NodeId(3), NodeId(0), ResourceId(0)), f64::INFINITY);
    }

    #[test]
    fn matrix_size_checked() {
        assert!(matches!(
            MatrixCost::new(2, vec![0.0; 3]),
            Err(ModelError::MatrixSize { nodes: 2, expected: 4, got: 3 })
        ));
    }
}

#[cfg(test)]
mod generator {
    use super::*;

    #[test]
    fn same_seed_same_instance() {
        let cfg = GeneratorConfig::default();
        let a = generate(&cfg).unwrap();
        let b = generate(&cfg).unwrap();
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.fleet_size(), cfg.resources);
        assert_eq!(a.request_count(), cfg.requests);
    }

    #[test]
    fn releases_precede_windows() {
        let cfg = GeneratorConfig { dynamism: 1.0, ..GeneratorConfig::default() };
        let inst = generate(&cfg).unwrap();
        for n in inst.requests() {
            let r = n.release.unwrap();
            assert!(r < n.time_window.start);
        }
    }

    #[test]
    fn requests_reachable_from_depot() {
        let inst = generate(&GeneratorConfig::default()).unwrap();
        let cost = EuclideanCost::from_instance(&inst);
        let home = inst.resources()[0].start_home;
        for n in inst.requests() {
            assert!(cost.travel_time(home, n.id, ResourceId(0)) <= n.time_window.end.0);
        }
    }

    #[test]
    fn rejects_short_horizon() {
        let cfg = GeneratorConfig { horizon: 50.0, ..GeneratorConfig::default() };
        assert!(matches!(generate(&cfg), Err(ModelError::Generator(_))));
    }
}
