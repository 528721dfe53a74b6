//! Unit and integration tests for od-sim.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use od_core::{ManualWall, NodeId, ResourceId, SimClock, SimTime, TimeWindow, WallSource};
use od_event::{Event, EventKind, EventTag, ScheduledEvent};
use od_fleet::ResourceState;
use od_model::{CostModel, EuclideanCost, Instance, InstanceBuilder, MatrixCost, Point};
use od_plan::{Plan, ScenarioPool, TourPlan};

use crate::*;

// ── Helpers ───────────────────────────────────────────────────────────────────

const R0: ResourceId = ResourceId(0);
const R1: ResourceId = ResourceId(1);
const R2: ResourceId = ResourceId(2);
const HOME: NodeId = NodeId(0);
const END: NodeId = NodeId(1);
const REQ: NodeId = NodeId(2);
const TIGHT: NodeId = NodeId(3);

/// Speed 10: a 0.1 s wall margin is one simulated unit and the rewind
/// tolerance is ten.
const SPEED: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
enum Command {
    Event(Event),
    Assign(ResourceId, NodeId, SimTime),
    Decide,
    Stop,
}

/// Records every call the engine makes; the pool is driven by the test.
struct RecordingOptimizer {
    pool:  Mutex<ScenarioPool<TourPlan>>,
    tx:    Sender<Command>,
    stops: AtomicUsize,
}

impl Optimizer for RecordingOptimizer {
    type Plan = TourPlan;

    fn push_event(&self, event: Event) {
        let _ = self.tx.send(Command::Event(event));
    }

    fn with_pool<R>(&self, f: impl FnOnce(&mut ScenarioPool<TourPlan>) -> R) -> R {
        f(&mut self.pool.lock())
    }

    fn raise_assignment(&self, resource: ResourceId, node: NodeId, arrival: SimTime) {
        let _ = self.tx.send(Command::Assign(resource, node, arrival));
    }

    fn raise_decision(&self) {
        let _ = self.tx.send(Command::Decide);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(Command::Stop);
    }
}

fn recording() -> (Arc<RecordingOptimizer>, Receiver<Command>) {
    let (tx, rx) = unbounded();
    let opt = RecordingOptimizer { pool: Mutex::new(ScenarioPool::new()), tx, stops: AtomicUsize::new(0) };
    (Arc::new(opt), rx)
}

fn drain(rx: &Receiver<Command>) -> Vec<Command> {
    rx.try_iter().collect()
}

/// Depot [0, 40], `fleet` resources, the given requests (service 1), every
/// hop takes 2.  Node ids: homes first, two per resource, then requests.
fn instance_with(fleet: usize, windows: &[TimeWindow]) -> (Instance, Arc<dyn CostModel>) {
    let mut b = InstanceBuilder::new("toy", TimeWindow::new(0.0, 40.0));
    for _ in 0..fleet {
        b.add_resource(Point::default());
    }
    for &tw in windows {
        b.add_request(Point::default(), tw, 1.0, None);
    }
    let instance = b.build().unwrap();
    let cost: Arc<dyn CostModel> = Arc::new(MatrixCost::uniform(instance.node_count(), 2.0));
    (instance, cost)
}

fn config() -> DispatchConfig {
    DispatchConfig { speed: SPEED, ..DispatchConfig::default() }
}

fn build(
    instance: &Instance,
    cost: &Arc<dyn CostModel>,
    opt: &Arc<RecordingOptimizer>,
    wall: &Arc<ManualWall>,
) -> Simulator<RecordingOptimizer> {
    SimBuilder::new(instance.clone(), Arc::clone(opt))
        .config(config())
        .cost(Arc::clone(cost))
        .wall(Arc::clone(wall) as Arc<dyn WallSource>)
        .build()
        .unwrap()
}

fn plan(instance: &Instance, cost: &Arc<dyn CostModel>, resource: ResourceId, route: &[NodeId]) -> TourPlan {
    let mut p = TourPlan::new(Arc::new(instance.clone()), Arc::clone(cost));
    p.set_route(resource, route).unwrap();
    p
}

fn assignments(cmds: &[Command]) -> Vec<(ResourceId, NodeId, SimTime)> {
    cmds.iter()
        .filter_map(|c| match *c {
            Command::Assign(r, n, t) => Some((r, n, t)),
            _ => None,
        })
        .collect()
}

fn decisions(sim: &Simulator<RecordingOptimizer>) -> Vec<SimTime> {
    sim.pending_events()
        .into_iter()
        .filter(|e| e.tag() == EventTag::Decision)
        .map(|e| e.time)
        .collect()
}

fn close(a: SimTime, b: f64) -> bool {
    (a.0 - b).abs() < 1e-6
}

#[cfg(test)]
mod horizon {
    use super::*;

    #[test]
    fn freeze_horizon_formula() {
        assert!((freeze_horizon(5, 480.0, 100, 0.0) - 2.4).abs() < 1e-12);
        assert!((freeze_horizon(5, 480.0, 100, 0.7) - 3.1).abs() < 1e-12);
        assert!((freeze_horizon(1, 40.0, 1, 1.0) - 5.0).abs() < 1e-12);
        assert!((freeze_horizon(3, 100.0, 10, 0.5) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn no_requests_counts_as_one() {
        assert_eq!(freeze_horizon(2, 50.0, 0, 0.0), freeze_horizon(2, 50.0, 1, 0.0));
    }

    #[test]
    fn protocol_derives_delta_from_instance() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(8.0, 30.0)]);
        let (opt, _rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        assert!((protocol.time_margin() - 1.0).abs() < 1e-9);
        assert!((protocol.delta() - 5.0).abs() < 1e-9);
        assert_eq!(protocol.policy_name(), "freeze");
    }
}

#[cfg(test)]
mod state {
    use super::*;

    fn state(speed: f64, tolerance_wall: f64) -> SimState {
        let wall: Arc<dyn WallSource> = Arc::new(ManualWall::new());
        SimState::new(SimClock::with_wall(speed, wall).unwrap(), tolerance_wall)
    }

    #[test]
    fn tolerance_is_in_simulated_units() {
        assert!((state(10.0, 1.0).tolerance() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn cannot_schedule_in_the_past() {
        let mut st = state(1.0, 1.0);
        st.clock.set_now(SimTime(5.0)).unwrap();
        let err = st.schedule(Event::decision(SimTime(4.0))).unwrap_err();
        assert!(matches!(err, SimError::Event(_)));
        assert!(st.schedule(Event::decision(SimTime(5.0))).is_ok());
    }

    #[test]
    fn cleaning_requires_paused_clock() {
        let mut st = state(1.0, 1.0);
        st.schedule(Event::decision(SimTime(1.0))).unwrap();
        st.clock.start().unwrap();
        let mut all = |_: &mut Event| true;
        assert!(matches!(st.clean_queue(&mut all), Err(SimError::NotPaused)));
        st.clock.pause();
        assert_eq!(st.clean_queue(&mut all).unwrap().len(), 1);
        assert!(st.queue.is_empty());
    }

    #[test]
    fn adjust_clock_checks_penultimate_event() {
        let mut st = state(1.0, 1.0);
        st.history.push(ScheduledEvent { seq: 0, event: Event::decision(SimTime(10.0)) });
        st.history.push(ScheduledEvent { seq: 1, event: Event::decision(SimTime(20.0)) });
        assert!(matches!(st.adjust_clock(SimTime(8.5)), Err(SimError::ClockRewind { .. })));
        st.adjust_clock(SimTime(9.5)).unwrap();
        assert!(close(st.now(), 9.5));
        assert_eq!(st.last_event_time(), SimTime(20.0));
    }
}

#[cfg(test)]
mod config {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_validate() {
        let c = DispatchConfig::default();
        c.validate().unwrap();
        assert_eq!(c.policy, PolicyKind::Freeze);
        assert_eq!(c.cutoff_fraction("R1"), Some(0.357));
        assert_eq!(c.cutoff_fraction("X9"), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = DispatchConfig::from_toml_str("speed = 10.0\npolicy = \"no_waiting\"\n").unwrap();
        assert_eq!(c.speed, 10.0);
        assert_eq!(c.policy, PolicyKind::NoWaiting);
        assert_eq!(c.poll_interval_ms, 50);
        assert_eq!(c.cutoff_fraction("C2"), Some(0.509));
    }

    #[test]
    fn file_round_trip() {
        let mut c = config();
        c.cutoff_fractions.insert("X1".into(), 0.25);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(c.to_toml_string().unwrap().as_bytes()).unwrap();
        let loaded = DispatchConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(DispatchConfig::from_toml_str("speed = 0.0"), Err(SimError::Config(_))));
        assert!(matches!(DispatchConfig::from_toml_str("overrun_factor = 1.0"), Err(SimError::Config(_))));
        assert!(matches!(DispatchConfig::from_toml_str("poll_interval_ms = 0"), Err(SimError::Config(_))));
        assert!(matches!(DispatchConfig::from_toml_str("policy = \"eager\""), Err(SimError::Config(_))));
        assert!(DispatchConfig::from_file("/nonexistent/dispatch.toml").is_err());
    }
}

#[cfg(test)]
mod builder {
    use super::*;

    #[test]
    fn applies_group_cutoff_and_places_resources() {
        let mut b = InstanceBuilder::new("grouped", TimeWindow::new(0.0, 100.0)).group("R1");
        b.add_resource(Point::default());
        let instance = b.build().unwrap();
        let (opt, _rx) = recording();
        let sim = SimBuilder::new(instance, opt).build().unwrap();
        assert_eq!(sim.instance().cutoff_fraction(), Some(0.357));
        assert_eq!(sim.current_node(R0), Some(HOME));
        assert_eq!(sim.state_of(R0), ResourceState::NotStarted);
        assert!(!sim.is_running());
    }

    #[test]
    fn rejects_invalid_config() {
        let (instance, _) = instance_with(1, &[]);
        let (opt, _rx) = recording();
        let bad = DispatchConfig { speed: -1.0, ..DispatchConfig::default() };
        assert!(matches!(SimBuilder::new(instance, opt).config(bad).build(), Err(SimError::Config(_))));
    }

    #[test]
    fn seeds_releases_and_starts() {
        let mut b = InstanceBuilder::new("seeded", TimeWindow::new(0.0, 100.0));
        b.add_resource(Point::default());
        b.add_resource(Point::default());
        let dynamic = b.add_request(Point::default(), TimeWindow::new(20.0, 60.0), 1.0, Some(SimTime(15.0)));
        let known = b.add_request(Point::default(), TimeWindow::new(0.0, 60.0), 1.0, None);
        let (opt, _rx) = recording();
        let sim = SimBuilder::new(b.build().unwrap(), opt).build().unwrap();

        assert_eq!(sim.seed_instance_events().unwrap(), 3);
        let tags: Vec<EventTag> = sim.pending_events().iter().map(Event::tag).collect();
        assert_eq!(tags, vec![EventTag::ResourceStart, EventTag::ResourceStart, EventTag::NewRequest]);
        let ledger = sim.ledger();
        assert!(ledger.is_released(known));
        assert!(!ledger.is_released(dynamic));
    }
}

#[cfg(test)]
mod handlers {
    use super::*;

    #[test]
    fn start_serves_home_and_asks_for_a_decision() {
        let (instance, cost) = instance_with(1, &[]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        sim.start().unwrap();
        sim.protocol().on_resource_started(R0).unwrap();

        assert_eq!(sim.state_of(R0), ResourceState::Idle);
        assert!(sim.ledger().is_served(HOME));
        assert_eq!(drain(&rx), vec![Command::Decide]);
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Running);
    }

    #[test]
    fn assignment_then_service_then_home() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(5.0, 30.0)]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();

        // Travel 2 from t=0, window opens at 5.
        protocol.on_request_assigned(R0, REQ).unwrap();
        assert_eq!(sim.state_of(R0), ResourceState::Busy);
        let pending = sim.pending_events();
        assert_eq!(pending, vec![Event::new(SimTime(5.0), EventKind::StartOfService { resource: R0, node: REQ })]);

        protocol.on_service_started(R0, REQ, SimTime(5.0)).unwrap();
        assert_eq!(sim.state_of(R0), ResourceState::Servicing);
        assert_eq!(sim.current_node(R0), Some(REQ));
        assert!(sim.pending_events().contains(&Event::new(SimTime(6.0), EventKind::EndOfService { resource: R0, node: REQ })));

        drain(&rx);
        protocol.on_service_ended(R0, REQ).unwrap();
        assert_eq!(sim.state_of(R0), ResourceState::Idle);
        assert!(sim.ledger().is_served(REQ));
        assert_eq!(drain(&rx), vec![Command::Decide]);

        protocol.on_service_ended(R0, END).unwrap();
        let stops: Vec<Event> = sim
            .pending_events()
            .into_iter()
            .filter(|e| e.tag() == EventTag::ResourceStop)
            .collect();
        assert_eq!(stops.len(), 1);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn new_and_rejected_requests_update_ledger() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(5.0, 30.0)]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        sim.start().unwrap();

        protocol.on_new_request(REQ).unwrap();
        assert!(sim.ledger().unserved_released().contains(&REQ));
        assert_eq!(drain(&rx), vec![Command::Decide]);

        protocol.on_request_rejected(REQ).unwrap();
        assert!(sim.ledger().unserved_released().is_empty());
        assert!(sim.ledger().rejected().contains(&REQ));
    }

    #[test]
    fn last_stop_shuts_everything_down_once() {
        let (instance, cost) = instance_with(2, &[]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        protocol.on_resource_started(R1).unwrap();

        protocol.on_resource_stopped(R0).unwrap();
        assert!(sim.is_running());
        protocol.on_resource_stopped(R1).unwrap();
        assert!(!sim.is_running());
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Stopped);

        // A late null plan is fine once everyone is home.
        protocol.on_plan_published(None, None).unwrap();
        assert_eq!(opt.stops.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&rx).iter().filter(|c| **c == Command::Stop).count(), 1);
    }

    #[test]
    fn overrun_aborts_the_run() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(5.0, 30.0)]);
        let (opt, _rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();

        // Limit is 1.5 × 40 = 60.
        wall.advance_secs(7.0);
        let err = protocol.on_new_request(REQ).unwrap_err();
        assert!(matches!(err, SimError::SimulationOverrun { .. }));
        assert!(!sim.is_running());
        assert_eq!(opt.stops.load(Ordering::SeqCst), 1);
    }
}

#[cfg(test)]
mod decisions {
    use super::*;

    /// Started single-resource simulator at t=0 with one request in `tw`.
    fn started(tw: TimeWindow) -> (Instance, Arc<dyn CostModel>, Arc<RecordingOptimizer>, Receiver<Command>, Simulator<RecordingOptimizer>) {
        let (instance, cost) = instance_with(1, &[tw]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        sim.start().unwrap();
        sim.protocol().on_resource_started(R0).unwrap();
        drain(&rx);
        (instance, cost, opt, rx, sim)
    }

    #[test]
    fn deferred_departure_freezes_and_reschedules() {
        // Departing at 0 would wait 6 at REQ; Δ = 5 so the resource waits.
        let (instance, cost, opt, rx, sim) = started(TimeWindow::new(8.0, 30.0));
        let published = plan(&instance, &cost, R0, &[REQ, END]);
        opt.with_pool(|p| {
            p.insert(published.clone());
            p.set_current_best(published.clone());
        });

        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert!(assignments(&drain(&rx)).is_empty());
        let pending = decisions(&sim);
        assert_eq!(pending.len(), 1);
        assert!(close(pending[0], 4.0));
        opt.with_pool(|p| {
            assert_eq!(p.len(), 1);
            assert_eq!(p.current_best().unwrap().earliest_departure(R0, HOME), Some(SimTime(5.0)));
        });
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Running);
    }

    #[test]
    fn imminent_departure_is_committed() {
        // Departing at 2 arrives exactly when REQ opens; 2 < Δ.
        let (instance, cost, _opt, rx, sim) = started(TimeWindow::new(4.0, 30.0));
        sim.schedule(Event::new(
            SimTime(3.0),
            EventKind::RequestAssigned { resource: R0, node: REQ, arrival: Some(SimTime(3.0)) },
        ))
        .unwrap();
        sim.schedule(Event::new(SimTime(3.0), EventKind::NewRequest { node: REQ })).unwrap();

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert_eq!(assignments(&drain(&rx)), vec![(R0, REQ, SimTime(4.0))]);
        assert_eq!(sim.projected_arrival(REQ), Some(SimTime(4.0)));
        let pending = sim.pending_events();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tag(), EventTag::NewRequest);
        assert!(decisions(&sim).is_empty());
    }

    #[test]
    fn retracted_assignment_clears_projected_arrival() {
        // Two requests: Δ = 3, and REQ's wait departure of 2 commits.
        let (instance, cost) = instance_with(1, &[TimeWindow::new(4.0, 30.0), TimeWindow::new(0.0, 30.0)]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        sim.start().unwrap();
        sim.protocol().on_resource_started(R0).unwrap();
        drain(&rx);
        sim.with_state(|st| {
            st.arrivals.insert(TIGHT, SimTime(3.0));
        });
        sim.schedule(Event::new(
            SimTime(3.0),
            EventKind::RequestAssigned { resource: R0, node: TIGHT, arrival: Some(SimTime(3.0)) },
        ))
        .unwrap();

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert_eq!(sim.projected_arrival(TIGHT), None);
        assert_eq!(sim.projected_arrival(REQ), Some(SimTime(4.0)));
        assert!(sim.pending_events().iter().all(|e| e.tag() != EventTag::RequestAssigned));
        assert_eq!(assignments(&drain(&rx)), vec![(R0, REQ, SimTime(4.0))]);
    }

    #[test]
    fn rescheduled_decision_merges_with_queued_one() {
        let (instance, cost, _opt, _rx, sim) = started(TimeWindow::new(8.0, 30.0));
        sim.schedule(Event::decision(SimTime(4.005))).unwrap();

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert_eq!(decisions(&sim), vec![SimTime(4.005)]);
    }

    #[test]
    fn null_plan_with_active_resources_is_fatal() {
        let (instance, cost) = instance_with(3, &[]);
        let (opt, _rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        sim.start().unwrap();
        for r in [R0, R1, R2] {
            protocol.on_resource_started(r).unwrap();
        }
        protocol.on_resource_stopped(R0).unwrap();
        protocol.on_resource_stopped(R1).unwrap();
        protocol.on_request_assigned(R2, NodeId(5)).unwrap();

        let err = protocol.on_plan_published(None, None).unwrap_err();
        match &err {
            SimError::NullPlan { pool, .. } => assert!(pool.starts_with("0 scenario(s)")),
            other => panic!("expected NullPlan, got {other:?}"),
        }
        assert!(err.to_string().contains("\npool: "));
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Paused);
    }

    #[test]
    fn infeasible_scenarios_are_discarded() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(8.0, 30.0), TimeWindow::new(0.0, 4.0)]);
        let (opt, rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        // Two requests: Δ = 40 / 20 + 1 = 3.
        assert!((protocol.delta() - 3.0).abs() < 1e-9);
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        drain(&rx);

        let doomed = plan(&instance, &cost, R0, &[TIGHT, END]);
        let survivor = plan(&instance, &cost, R0, &[REQ, END]);
        let kept = opt.with_pool(|p| {
            p.insert(doomed.clone());
            let kept = p.insert(survivor.clone());
            p.set_distinguished(doomed.clone());
            p.set_current_best(survivor.clone());
            kept
        });

        protocol.on_plan_published(None, Some(&survivor)).unwrap();

        opt.with_pool(|p| {
            assert_eq!(p.ids(), vec![kept]);
            assert!(!p.distinguished().unwrap().is_feasible());
            assert!(p.current_best().unwrap().is_feasible());
        });
        assert!(close(decisions(&sim)[0], 2.0));
    }

    #[test]
    fn infeasible_current_best_is_fatal() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(8.0, 30.0), TimeWindow::new(0.0, 4.0)]);
        let (opt, _rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();

        let doomed = plan(&instance, &cost, R0, &[TIGHT, END]);
        let published = plan(&instance, &cost, R0, &[REQ, END]);
        opt.with_pool(|p| {
            p.set_current_best(doomed);
        });

        let err = protocol.on_plan_published(None, Some(&published)).unwrap_err();
        assert!(matches!(err, SimError::CurrentBestInfeasible { resource: R0, .. }));
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Paused);
    }

    #[test]
    fn expired_unserved_request_is_fatal() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(8.0, 30.0), TimeWindow::new(0.0, 4.0)]);
        let (opt, _rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();

        let mut published = plan(&instance, &cost, R0, &[REQ, END]);
        published.add_unserved(TIGHT);
        wall.advance_secs(1.0);

        match protocol.on_plan_published(None, Some(&published)) {
            Err(SimError::ExpiredRequests { nodes, .. }) => assert_eq!(nodes, vec![TIGHT]),
            other => panic!("expected ExpiredRequests, got {other:?}"),
        }
    }

    #[test]
    fn missed_departure_within_tolerance_moves_clock_back() {
        // Latest departure from home is 4 - 2 = 2; we are at 3.
        let (instance, cost) = instance_with(1, &[TimeWindow::new(0.0, 4.0)]);
        let (opt, rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        drain(&rx);
        wall.advance_secs(0.3);

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        protocol.on_plan_published(None, Some(&published)).unwrap();

        assert!(close(sim.simulation_time(), 2.0));
        let assigned = assignments(&drain(&rx));
        assert_eq!(assigned.len(), 1);
        assert!(close(assigned[0].2, 4.0));
    }

    #[test]
    fn missed_departure_beyond_tolerance_is_fatal() {
        let (instance, cost) = instance_with(1, &[TimeWindow::new(0.0, 4.0)]);
        let (opt, _rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.schedule(Event::new(SimTime(15.0), EventKind::NewRequest { node: REQ })).unwrap();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        wall.advance_secs(1.5);
        assert!(sim.dispatch_due().unwrap().is_some());

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        opt.with_pool(|p| {
            p.insert(published.clone());
        });
        let err = protocol.on_plan_published(None, Some(&published)).unwrap_err();
        assert!(matches!(err, SimError::MissedDeparture { resource: R0, node: HOME, .. }));
        if let SimError::MissedDeparture { pool, .. } = err {
            assert!(pool.starts_with("1 scenario(s)"));
        }
    }

    #[test]
    fn home_trip_waits_until_it_must_leave() {
        // Only the end home is left; latest departure 40 - 2 = 38 is far off.
        let (instance, cost, _opt, rx, sim) = started(TimeWindow::new(8.0, 30.0));
        let published = plan(&instance, &cost, R0, &[END]);
        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert!(assignments(&drain(&rx)).is_empty());
        assert_eq!(decisions(&sim).len(), 1);
    }

    #[test]
    fn home_trip_committed_once_it_must_leave() {
        // No requests: Δ = 5.  At 34 the latest departure 38 falls inside it.
        let (instance, cost) = instance_with(1, &[]);
        let (opt, rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        drain(&rx);
        wall.advance_secs(3.4);

        let published = plan(&instance, &cost, R0, &[END]);
        protocol.on_plan_published(None, Some(&published)).unwrap();

        let assigned = assignments(&drain(&rx));
        assert_eq!(assigned.len(), 1);
        assert_eq!((assigned[0].0, assigned[0].1), (R0, END));
        assert!(close(assigned[0].2, 36.0));
        assert!(decisions(&sim).is_empty());
    }

    #[test]
    fn home_trip_after_cutoff_waits_while_scenarios_disagree() {
        let mut b = InstanceBuilder::new("cutoff", TimeWindow::new(0.0, 40.0)).cutoff_fraction(0.0);
        b.add_resource(Point::default());
        b.add_request(Point::default(), TimeWindow::new(0.0, 30.0), 1.0, None);
        let instance = b.build().unwrap();
        let cost: Arc<dyn CostModel> = Arc::new(MatrixCost::uniform(3, 2.0));
        let (opt, rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        drain(&rx);
        wall.advance_secs(0.1);

        let published = plan(&instance, &cost, R0, &[END]);
        let detour = plan(&instance, &cost, R0, &[REQ, END]);
        opt.with_pool(|p| {
            p.insert(published.clone());
            p.insert(detour);
        });
        protocol.on_plan_published(None, Some(&published)).unwrap();

        assert!(assignments(&drain(&rx)).is_empty());
        let pending = decisions(&sim);
        assert_eq!(pending.len(), 1);
        assert!(close(pending[0], 5.0));
        opt.with_pool(|p| {
            assert_eq!(p.len(), 2);
            assert!(p.iter().all(|(_, s)| s.earliest_departure(R0, HOME).is_some_and(|t| close(t, 6.0))));
        });
    }

    #[test]
    fn resource_without_next_node_is_frozen() {
        let (instance, cost, _opt, rx, sim) = started(TimeWindow::new(8.0, 30.0));
        let published = plan(&instance, &cost, R0, &[]);
        assert_eq!(published.next_node(R0), None);

        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert!(assignments(&drain(&rx)).is_empty());
        let pending = decisions(&sim);
        assert_eq!(pending.len(), 1);
        assert!(close(pending[0], 4.0));
        assert_eq!(sim.state_of(R0), ResourceState::Idle);
    }

    #[test]
    fn home_trip_after_cutoff_when_scenarios_agree() {
        let mut b = InstanceBuilder::new("cutoff", TimeWindow::new(0.0, 40.0)).cutoff_fraction(0.0);
        b.add_resource(Point::default());
        let instance = b.build().unwrap();
        let cost: Arc<dyn CostModel> = Arc::new(MatrixCost::uniform(2, 2.0));
        let (opt, rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        let protocol = sim.protocol();
        sim.start().unwrap();
        protocol.on_resource_started(R0).unwrap();
        drain(&rx);
        wall.advance_secs(0.1);

        let published = plan(&instance, &cost, R0, &[END]);
        opt.with_pool(|p| {
            p.insert(published.clone());
        });
        protocol.on_plan_published(None, Some(&published)).unwrap();

        let assigned = assignments(&drain(&rx));
        assert_eq!(assigned.len(), 1);
        assert_eq!((assigned[0].0, assigned[0].1), (R0, END));
    }

    #[test]
    fn busy_fleet_needs_no_assignment() {
        let (instance, cost, _opt, _rx, sim) = started(TimeWindow::new(8.0, 30.0));
        let protocol = sim.protocol();
        protocol.on_new_request(REQ).unwrap();
        protocol.on_request_assigned(R0, REQ).unwrap();

        let published = plan(&instance, &cost, R0, &[REQ, END]);
        protocol.on_plan_published(None, Some(&published)).unwrap();
        assert!(decisions(&sim).is_empty());
    }
}

#[cfg(test)]
mod no_waiting {
    use super::*;

    fn sim_with_policy(tw: TimeWindow) -> (Instance, Arc<dyn CostModel>, Receiver<Command>, Simulator<RecordingOptimizer>) {
        let (instance, cost) = instance_with(1, &[tw]);
        let (opt, rx) = recording();
        let cfg = DispatchConfig { policy: PolicyKind::NoWaiting, ..config() };
        let sim = SimBuilder::new(instance.clone(), opt)
            .config(cfg)
            .cost(Arc::clone(&cost))
            .wall(Arc::new(ManualWall::new()))
            .build()
            .unwrap();
        sim.start().unwrap();
        sim.protocol().on_resource_started(R0).unwrap();
        drain(&rx);
        (instance, cost, rx, sim)
    }

    #[test]
    fn dispatches_immediately() {
        let (instance, cost, rx, sim) = sim_with_policy(TimeWindow::new(8.0, 30.0));
        assert_eq!(sim.protocol().policy_name(), "no_waiting");
        let published = plan(&instance, &cost, R0, &[REQ, END]);
        sim.protocol().on_plan_published(None, Some(&published)).unwrap();

        assert_eq!(assignments(&drain(&rx)), vec![(R0, REQ, SimTime(2.0))]);
        assert!(decisions(&sim).is_empty());
    }

    #[test]
    fn idle_fleet_kept_home_with_work_outstanding_is_fatal() {
        let (instance, cost, rx, sim) = sim_with_policy(TimeWindow::new(8.0, 30.0));
        let protocol = sim.protocol();
        protocol.on_new_request(REQ).unwrap();
        drain(&rx);

        let mut published = plan(&instance, &cost, R0, &[END]);
        published.add_unserved(REQ);
        let err = protocol.on_plan_published(None, Some(&published)).unwrap_err();

        match &err {
            SimError::IdleWithoutAssignment { unserved, pool, .. } => {
                assert_eq!(unserved, &vec![REQ]);
                assert!(pool.contains("current best: None"));
            }
            other => panic!("expected IdleWithoutAssignment, got {other:?}"),
        }
        assert!(assignments(&drain(&rx)).is_empty());
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Paused);
    }
}

#[cfg(test)]
mod run_loop {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stop_terminates_an_idle_loop() {
        let (instance, cost) = instance_with(1, &[]);
        let (opt, _rx) = recording();
        let cfg = DispatchConfig { poll_interval_ms: 5, ..config() };
        let sim = SimBuilder::new(instance, opt).config(cfg).cost(cost).build().unwrap();

        let handle = sim.run_in_new_thread().unwrap();
        while !sim.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        sim.stop();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.dispatched, 0);
        assert!(!sim.is_running());
    }

    #[test]
    fn far_future_event_does_not_stall_the_loop() {
        let (instance, cost) = instance_with(1, &[]);
        let (opt, _rx) = recording();
        let cfg = DispatchConfig { poll_interval_ms: 5, ..config() };
        let sim = SimBuilder::new(instance, opt).config(cfg).cost(cost).build().unwrap();
        sim.schedule(Event::decision(SimTime(1e30))).unwrap();

        let handle = sim.run_in_new_thread().unwrap();
        while !sim.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        sim.protocol().on_resource_started(R0).unwrap();
        thread::sleep(Duration::from_millis(20));
        sim.stop();

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(sim.pending_events().len(), 1);
    }

    #[test]
    fn cannot_run_twice() {
        let (instance, cost) = instance_with(1, &[]);
        let (opt, _rx) = recording();
        let sim = build(&instance, &cost, &opt, &Arc::new(ManualWall::new()));
        sim.start().unwrap();
        assert!(matches!(sim.run(), Err(SimError::Core(_))));
    }

    #[test]
    fn dispatch_due_releases_in_time_order() {
        let (instance, cost) = instance_with(1, &[]);
        let (opt, rx) = recording();
        let wall = Arc::new(ManualWall::new());
        let sim = build(&instance, &cost, &opt, &wall);
        sim.schedule(Event::decision(SimTime(2.0))).unwrap();
        sim.schedule(Event::new(SimTime(1.0), EventKind::ResourceStart { resource: R0 })).unwrap();
        sim.start().unwrap();

        assert_eq!(sim.dispatch_due().unwrap(), None);
        sim.with_state(|st| st.clock.resume());
        wall.advance_secs(0.5);
        let first = sim.dispatch_due().unwrap().unwrap();
        assert_eq!(first.tag(), EventTag::ResourceStart);
        assert!(close(sim.simulation_time(), 1.0));
        assert_eq!(sim.clock_status(), od_core::ClockStatus::Paused);

        // Paused: nothing else becomes due.
        wall.advance_secs(0.5);
        assert_eq!(sim.dispatch_due().unwrap(), None);

        assert_eq!(drain(&rx), vec![Command::Event(first)]);
        assert_eq!(sim.history(), vec![first]);
    }

    /// One resource serves one request end to end, driven by a scripted
    /// optimizer thread that publishes the distinguished plan.
    #[test]
    fn single_request_end_to_end() {
        let mut b = InstanceBuilder::new("e2e", TimeWindow::new(0.0, 100.0));
        b.add_resource(Point::new(0.0, 0.0));
        b.add_request(Point::new(3.0, 4.0), TimeWindow::new(0.0, 100.0), 5.0, None);
        let instance = b.build().unwrap();
        let cost: Arc<dyn CostModel> = Arc::new(EuclideanCost::from_instance(&instance));

        let (opt, rx) = recording();
        let distinguished = plan(&instance, &cost, R0, &[REQ, END]);
        opt.with_pool(|p| {
            p.set_distinguished(distinguished);
        });

        let cfg = DispatchConfig {
            speed: 1000.0,
            poll_interval_ms: 5,
            time_margin_wall_secs: 0.001,
            ..DispatchConfig::default()
        };
        let sim = SimBuilder::new(instance, Arc::clone(&opt))
            .config(cfg)
            .cost(Arc::clone(&cost))
            .build()
            .unwrap();
        sim.seed_instance_events().unwrap();
        let protocol = sim.protocol();

        let worker_opt = Arc::clone(&opt);
        let worker = thread::spawn(move || -> SimResult<usize> {
            let mut handled = 0;
            loop {
                let cmd = rx.recv_timeout(Duration::from_secs(10)).expect("optimizer starved");
                match cmd {
                    Command::Event(e) => {
                        protocol.handle_event(&e)?;
                        if let EventKind::EndOfService { resource, node } = e.kind {
                            worker_opt.with_pool(|p| {
                                if let Some(d) = p.distinguished_mut() {
                                    d.advance(resource, node, e.time).ok();
                                }
                            });
                        }
                    }
                    Command::Assign(r, n, _) => protocol.on_request_assigned(r, n)?,
                    Command::Decide => {
                        let snapshot = worker_opt.with_pool(|p| p.distinguished().cloned());
                        protocol.on_plan_published(None, snapshot.as_ref())?;
                    }
                    Command::Stop => return Ok(handled),
                }
                handled += 1;
            }
        });

        let sim_handle = sim.run_in_new_thread().unwrap();
        let worker_result = worker.join();
        sim.stop();
        let summary = sim_handle.join().unwrap().unwrap();
        let handled = worker_result.unwrap().unwrap();

        assert!(handled >= 5);
        assert!(summary.dispatched >= 4);
        assert!(summary.final_time.0 < 150.0);
        assert_eq!(sim.state_of(R0), ResourceState::Stopped);
        assert!(sim.ledger().is_served(REQ));
        assert!(sim.history_is_monotonic());
        assert_eq!(opt.stops.load(Ordering::SeqCst), 1);

        let tags: Vec<EventTag> = sim.history().iter().map(Event::tag).collect();
        assert_eq!(tags.first(), Some(&EventTag::ResourceStart));
        assert_eq!(tags.last(), Some(&EventTag::ResourceStop));
    }
}
