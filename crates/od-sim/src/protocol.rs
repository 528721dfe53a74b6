//! The decision/freeze protocol: handlers the optimizer side calls when it
//! processes a dispatched event or publishes a new plan.
//!
//! Every handler follows the same shape: take the state lock, pause the
//! clock, update the fleet bookkeeping, check the overrun limit and resume.
//! A handler that fails returns with the clock still paused.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use od_core::{NodeId, ResourceId, ScenarioId, SimTime};
use od_event::{AssignmentCleaner, DuplicateEventCleaner, Event, EventKind, EventTag};
use od_fleet::ResourceState;
use od_model::{CostModel, Instance};
use od_plan::{Plan, ScenarioPool};

use crate::optimizer::pool_summary;
use crate::state::{Shared, SimState};
use crate::{DispatchConfig, DispatchPolicy, Optimizer, SimError, SimResult};

/// Length Δ of the freeze window in simulated units.
///
/// `fleet × depot_width / (10 × requests) + margin`, with `requests`
/// clamped to at least one.
pub fn freeze_horizon(fleet: usize, depot_width: f64, requests: usize, margin: f64) -> f64 {
    fleet as f64 * depot_width / (10.0 * requests.max(1) as f64) + margin
}

// ── DecisionContext ───────────────────────────────────────────────────────────

/// What a [`DispatchPolicy`] works with while reacting to one plan.
///
/// Borrowed from inside the state lock; the clock is paused for its whole
/// lifetime.
pub struct DecisionContext<'a, O: Optimizer> {
    pub state:     &'a mut SimState,
    pub instance:  &'a Instance,
    pub cost:      &'a dyn CostModel,
    pub config:    &'a DispatchConfig,
    pub optimizer: &'a O,
    /// Freeze horizon length.
    pub delta:     f64,
}

impl<O: Optimizer> DecisionContext<'_, O> {
    #[inline]
    pub fn now(&self) -> SimTime {
        self.state.now()
    }

    pub fn fleet(&self) -> Vec<ResourceId> {
        self.instance.resources().iter().map(|r| r.id).collect()
    }

    /// Where `resource` is now: the tracker's view, then the plan's, then
    /// its start home.
    pub fn current_node(&self, resource: ResourceId, plan: &O::Plan) -> NodeId {
        self.state
            .tracker
            .current_node(resource)
            .or_else(|| plan.current_node(resource))
            .or_else(|| self.instance.resource(resource).ok().map(|r| r.start_home))
            .unwrap_or(NodeId::INVALID)
    }

    /// Whether `resource`, whose next node is its end home, should leave now.
    ///
    /// Yes once no more requests are expected and every scenario agrees on
    /// going home, or when waiting another horizon would miss the latest
    /// feasible departure.
    pub fn should_send_home(&self, resource: ResourceId, home: NodeId, latest: SimTime) -> bool {
        let now = self.now();
        if latest < now + self.delta {
            return true;
        }
        self.instance.is_past_cutoff(now)
            && self.optimizer.with_pool(|pool| {
                pool.iter().all(|(_, s)| s.next_node(resource) == Some(home))
            })
    }

    /// Commit `resource` to `next` if its departure falls inside the freeze
    /// horizon, otherwise freeze it.  Returns `true` when an assignment was
    /// raised.
    pub fn commit_or_defer(
        &mut self,
        resource: ResourceId,
        current:  NodeId,
        next:     NodeId,
        latest:   SimTime,
        plan:     &O::Plan,
    ) -> SimResult<bool> {
        let mut now = self.now();
        if latest < now {
            let last_event = self.state.last_event_time();
            if latest > last_event - self.state.tolerance() {
                warn!(
                    resource = %resource,
                    node = %current,
                    now = now.0,
                    latest = latest.0,
                    "latest departure already passed, moving clock back"
                );
                if now - latest > self.config.adjustment_warn_threshold {
                    warn!(by = now - latest, "clock adjustment exceeds warning threshold");
                }
                self.state.adjust_clock(latest)?;
                now = self.now();
            } else {
                error!(resource = %resource, node = %current, latest = latest.0, now = now.0, "departure missed");
                return Err(SimError::MissedDeparture {
                    resource,
                    node: current,
                    latest: latest.0,
                    now: now.0,
                    last_event: last_event.0,
                    plan: format!("{plan:?}"),
                    pool: self.optimizer.with_pool(|p| pool_summary(p)),
                });
            }
        }

        let departure = plan
            .wait_departure_time(resource, current)
            .unwrap_or(now)
            .max(now);
        let retracted = self.state.clean_queue(&mut AssignmentCleaner { resource })?;
        for s in &retracted {
            if let EventKind::RequestAssigned { node, .. } = s.event.kind {
                self.state.arrivals.remove(&node);
            }
        }
        if !retracted.is_empty() {
            debug!(resource = %resource, count = retracted.len(), "pending assignments retracted");
        }
        let arrival = departure + self.cost.travel_time(current, next, resource);

        if departure < now + self.delta {
            info!(resource = %resource, node = %next, departure = departure.0, "departure committed");
            self.dispatch(resource, next, arrival);
            Ok(true)
        } else {
            self.state.arrivals.insert(next, arrival);
            debug!(resource = %resource, node = %next, departure = departure.0, "departure deferred");
            self.freeze_resource(resource, plan)?;
            Ok(false)
        }
    }

    /// Record the projected arrival and raise the assignment.
    pub fn dispatch(&mut self, resource: ResourceId, node: NodeId, arrival: SimTime) {
        self.state.arrivals.insert(node, arrival);
        self.optimizer.raise_assignment(resource, node, arrival);
    }

    /// Hold `resource` at its current node until at least `now + Δ` in every
    /// plan the optimizer keeps.
    ///
    /// Pool scenarios that become infeasible are discarded.  An infeasible
    /// distinguished plan is only reported; an infeasible current best is
    /// fatal.
    pub fn freeze_resource(&mut self, resource: ResourceId, plan: &O::Plan) -> SimResult<()> {
        let now = self.now();
        let current = self.current_node(resource, plan);
        let arrival = plan.earliest_arrival(resource, current).unwrap_or(now);
        let horizon = now + self.delta;
        info!(
            resource = %resource,
            node = %current,
            next = ?plan.next_node(resource),
            until = horizon.0,
            "resource frozen"
        );

        let result = self.optimizer.with_pool(|pool| {
            freeze_pool(pool, resource, current, arrival, horizon)
        });
        if let Err(e) = &result {
            error!(error = %e, "freeze failed");
        }
        result
    }
}

fn freeze_pool<P: Plan>(
    pool:     &mut ScenarioPool<P>,
    resource: ResourceId,
    node:     NodeId,
    arrival:  SimTime,
    horizon:  SimTime,
) -> SimResult<()> {
    let doomed: Vec<ScenarioId> = pool
        .iter_mut()
        .filter_map(|(id, s)| match s.freeze(resource, node, arrival, horizon) {
            Ok(()) => None,
            Err(e) => {
                debug!(scenario = %id, error = %e, "scenario infeasible after freeze");
                Some(id)
            }
        })
        .collect();
    if !doomed.is_empty() {
        let removed = pool.remove_all(&doomed);
        info!(count = removed, "infeasible scenarios discarded");
    }

    if let Some(d) = pool.distinguished_mut() {
        if let Err(e) = d.freeze(resource, node, arrival, horizon) {
            warn!(error = %e, "distinguished plan infeasible after freeze");
        }
    }

    let Some(best) = pool.current_best_mut() else { return Ok(()) };
    if let Err(source) = best.freeze(resource, node, arrival, horizon) {
        return Err(SimError::CurrentBestInfeasible {
            resource,
            source,
            pool: pool_summary(pool),
        });
    }
    Ok(())
}

// ── DecisionProtocol ──────────────────────────────────────────────────────────

/// Handle through which the optimizer side drives the engine.
///
/// Cheap to clone; every clone talks to the same simulator.
pub struct DecisionProtocol<O: Optimizer> {
    shared:    Arc<Shared>,
    optimizer: Arc<O>,
    policy:    Arc<dyn DispatchPolicy<O>>,
    delta:     f64,
    margin:    f64,
}

impl<O: Optimizer> Clone for DecisionProtocol<O> {
    fn clone(&self) -> Self {
        Self {
            shared:    Arc::clone(&self.shared),
            optimizer: Arc::clone(&self.optimizer),
            policy:    Arc::clone(&self.policy),
            delta:     self.delta,
            margin:    self.margin,
        }
    }
}

impl<O: Optimizer> DecisionProtocol<O> {
    pub(crate) fn new(shared: Arc<Shared>, optimizer: Arc<O>, policy: Arc<dyn DispatchPolicy<O>>) -> Self {
        let margin = shared.state.lock().clock.wall_to_sim(shared.config.time_margin_wall_secs);
        let instance = &shared.instance;
        let delta = freeze_horizon(
            instance.fleet_size(),
            instance.depot_window().width(),
            instance.request_count(),
            margin,
        );
        debug!(delta, margin, policy = policy.name(), "decision protocol ready");
        Self { shared, optimizer, policy, delta, margin }
    }

    /// Freeze horizon length Δ.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Time margin subtracted when scheduling follow-up decisions.
    pub fn time_margin(&self) -> f64 {
        self.margin
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    // ── Event handlers ────────────────────────────────────────────────────

    /// Route a dispatched event to its handler.
    ///
    /// `Decision` snapshots the distinguished plan and reacts to it.
    pub fn handle_event(&self, event: &Event) -> SimResult<()> {
        match event.kind {
            EventKind::NewRequest { node } => self.on_new_request(node),
            EventKind::ResourceStart { resource } => self.on_resource_started(resource),
            EventKind::ResourceStop { resource } => self.on_resource_stopped(resource),
            EventKind::RequestAssigned { resource, node, .. } => self.on_request_assigned(resource, node),
            EventKind::StartOfService { resource, node } => self.on_service_started(resource, node, event.time),
            EventKind::EndOfService { resource, node } => self.on_service_ended(resource, node),
            EventKind::Decision => {
                let plan = self.optimizer.with_pool(|pool| pool.distinguished().cloned());
                self.on_plan_published(None, plan.as_ref())
            }
        }
    }

    pub fn on_resource_started(&self, resource: ResourceId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        let home = self.shared.instance.resource(resource)?.start_home;
        st.tracker.transition(resource, ResourceState::Idle);
        st.tracker.set_current_node(resource, home);
        st.tracker.add_served(resource, home);
        st.ledger.serve(home);
        info!(resource = %resource, now = st.now().0, "resource started");
        self.optimizer.raise_decision();
        self.finish(st)
    }

    /// Mark `resource` stopped.  Once the whole fleet has stopped the run
    /// loop and the optimizer are shut down.
    pub fn on_resource_stopped(&self, resource: ResourceId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        st.tracker.transition(resource, ResourceState::Stopped);
        info!(resource = %resource, now = st.now().0, "resource stopped");

        if st.tracker.all_in(self.fleet(), ResourceState::Stopped) {
            info!(now = st.now().0, "all resources stopped");
            self.shared.stop_locked(st);
            self.stop_optimizer();
            return Ok(());
        }
        self.finish(st)
    }

    pub fn on_request_assigned(&self, resource: ResourceId, node: NodeId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        let now = st.now();
        let from = st
            .tracker
            .current_node(resource)
            .unwrap_or(self.shared.instance.resource(resource)?.start_home);
        let window = self.shared.instance.node(node)?.time_window;

        st.tracker.transition(resource, ResourceState::Busy);
        st.tracker.add_assigned(resource, node);
        st.ledger.assign(node);

        let arrival = now + self.shared.cost.travel_time(from, node, resource);
        let start = window.service_start(arrival);
        info!(resource = %resource, from = %from, to = %node, start = start.0, "resource departing");
        st.schedule(Event::new(start, EventKind::StartOfService { resource, node }))?;
        self.finish(st)
    }

    pub fn on_service_started(&self, resource: ResourceId, node: NodeId, at: SimTime) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        let service = self.shared.instance.node(node)?.service_time;

        st.tracker.transition(resource, ResourceState::Servicing);
        st.tracker.set_current_node(resource, node);

        let end = (at + service).max(st.now());
        debug!(resource = %resource, node = %node, end = end.0, "service started");
        st.schedule(Event::new(end, EventKind::EndOfService { resource, node }))?;
        self.finish(st)
    }

    pub fn on_service_ended(&self, resource: ResourceId, node: NodeId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();

        st.tracker.transition(resource, ResourceState::Idle);
        if !st.tracker.remove_assigned(resource, node) {
            debug!(resource = %resource, node = %node, "served node was not on the assigned list");
        }
        st.tracker.add_served(resource, node);
        st.ledger.serve(node);

        if self.shared.instance.is_end_home_of(resource, node) {
            info!(resource = %resource, now = st.now().0, "resource back home");
            let now = st.now();
            st.schedule(Event::new(now, EventKind::ResourceStop { resource }))?;
        } else {
            debug!(resource = %resource, node = %node, "service ended");
            self.optimizer.raise_decision();
        }
        self.finish(st)
    }

    pub fn on_new_request(&self, node: NodeId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        if st.ledger.release(node) {
            info!(node = %node, now = st.now().0, "request released");
        }
        self.optimizer.raise_decision();
        self.finish(st)
    }

    /// The optimizer could not fit `node` into any plan.
    pub fn on_request_rejected(&self, node: NodeId) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        st.ledger.reject(node);
        warn!(node = %node, now = st.now().0, "request rejected");
        self.finish(st)
    }

    // ── Plan publication ──────────────────────────────────────────────────

    /// React to a newly published plan.
    ///
    /// `old` is the previously published plan, used for logging only.
    pub fn on_plan_published(&self, old: Option<&O::Plan>, new: Option<&O::Plan>) -> SimResult<()> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.clock.pause();
        let now = st.now();

        let Some(plan) = new else {
            if st.tracker.all_in(self.fleet(), ResourceState::Stopped) {
                debug!(now = now.0, "null plan after all resources stopped");
                return Ok(());
            }
            let states = st
                .tracker
                .records()
                .iter()
                .map(|r| format!("{}={}", r.id, r.state))
                .collect::<Vec<_>>()
                .join(", ");
            error!(now = now.0, %states, "null plan published");
            let pool = self.optimizer.with_pool(|p| pool_summary(p));
            return Err(SimError::NullPlan { now: now.0, states, pool });
        };

        if let Some(old) = old {
            for r in self.fleet() {
                let (was, is) = (old.next_node(r), plan.next_node(r));
                if was != is {
                    debug!(resource = %r, was = ?was, is = ?is, "next node changed");
                }
            }
        }

        self.check_unserved(st, plan)?;

        let mut ctx = DecisionContext {
            state:     &mut *st,
            instance:  &*self.shared.instance,
            cost:      self.shared.cost.as_ref(),
            config:    &self.shared.config,
            optimizer: self.optimizer.as_ref(),
            delta:     self.delta,
        };
        let outcome = self.policy.react(&mut ctx, plan)?;

        if outcome.reschedule {
            let at = SimTime((st.now() + self.delta - self.margin).0.max(0.0));
            info!(at = at.0, "next decision scheduled");
            st.schedule(Event::decision(at))?;
            let mut dedup = DuplicateEventCleaner::new(EventTag::Decision, self.shared.config.decision_dedup_tolerance);
            let merged = st.clean_queue(&mut dedup)?;
            if !merged.is_empty() {
                debug!(count = merged.len(), "duplicate decisions merged");
            }
        }

        let unserved = st.ledger.unserved_released();
        if outcome.all_idle && !outcome.committed && !unserved.is_empty() {
            let unserved: Vec<NodeId> = unserved.iter().copied().collect();
            error!(now = st.now().0, ?unserved, "all resources idle and nothing assigned");
            let pool = self.optimizer.with_pool(|p| pool_summary(p));
            return Err(SimError::IdleWithoutAssignment { now: st.now().0, unserved, pool });
        }

        self.finish(st)
    }

    /// Requests the plan leaves unserved must still be servable.
    fn check_unserved(&self, st: &SimState, plan: &O::Plan) -> SimResult<()> {
        let now = st.now();
        let mut expired = Vec::new();
        for n in plan.unserved_requests() {
            if self.shared.instance.node(n)?.time_window.is_feasible(now) {
                warn!(node = %n, now = now.0, "request left unserved");
            } else {
                expired.push(n);
            }
        }
        if expired.is_empty() {
            return Ok(());
        }
        let pool = self.optimizer.with_pool(|p| pool_summary(p));
        error!(now = now.0, nodes = ?expired, "plan abandons expired requests");
        Err(SimError::ExpiredRequests {
            now: now.0,
            nodes: expired,
            plan: format!("{plan:?}"),
            pool,
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn fleet(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.shared.instance.resources().iter().map(|r| r.id)
    }

    fn stop_optimizer(&self) {
        if self.shared.claim_optimizer_stop() {
            info!("stopping optimizer");
            self.optimizer.stop();
        }
    }

    /// Overrun guard, then resume.
    fn finish(&self, st: &mut SimState) -> SimResult<()> {
        let limit = self.shared.instance.depot_window().end.0 * self.shared.config.overrun_factor;
        let now = st.now();
        if now.0 > limit {
            error!(now = now.0, limit, "simulation overran its horizon");
            self.shared.stop_locked(st);
            self.stop_optimizer();
            return Err(SimError::SimulationOverrun { now: now.0, limit });
        }
        st.clock.resume();
        self.shared.changed.notify_all();
        Ok(())
    }
}
