//! How the engine reacts to a newly published plan.
//!
//! A policy walks the fleet and, for every idle resource, either commits it
//! to its next node or defers it.  The surrounding bookkeeping (null-plan
//! and expired-request checks, follow-up decision scheduling, the all-idle
//! invariant) is shared and lives in
//! [`DecisionProtocol::on_plan_published`](crate::DecisionProtocol::on_plan_published).

use tracing::info;

use od_core::SimTime;
use od_fleet::ResourceState;
use od_plan::Plan;

use crate::protocol::DecisionContext;
use crate::{Optimizer, SimResult};

/// What a policy did during one plan reaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// At least one idle resource had its destination fixed this round.
    pub committed: bool,
    /// Some resource was deferred; a follow-up decision is needed.
    pub reschedule: bool,
    /// Every resource was idle.
    pub all_idle: bool,
}

impl Default for PolicyOutcome {
    fn default() -> Self {
        Self { committed: false, reschedule: false, all_idle: true }
    }
}

pub trait DispatchPolicy<O: Optimizer>: Send + Sync {
    fn name(&self) -> &'static str;

    fn react(&self, ctx: &mut DecisionContext<'_, O>, plan: &O::Plan) -> SimResult<PolicyOutcome>;
}

// ── FreezePolicy ──────────────────────────────────────────────────────────────

/// Commit a departure only once it falls within the freeze horizon; until
/// then, freeze the resource in every scenario so the optimizer cannot plan
/// an earlier departure.
#[derive(Copy, Clone, Debug, Default)]
pub struct FreezePolicy;

impl<O: Optimizer> DispatchPolicy<O> for FreezePolicy {
    fn name(&self) -> &'static str {
        "freeze"
    }

    fn react(&self, ctx: &mut DecisionContext<'_, O>, plan: &O::Plan) -> SimResult<PolicyOutcome> {
        let mut out = PolicyOutcome::default();
        for r in ctx.fleet() {
            let state = ctx.state.tracker.state(r);
            if state != ResourceState::Idle {
                out.all_idle = false;
                info!(resource = %r, %state, next = ?plan.next_node(r), "resource not idle");
                continue;
            }
            let Some(next) = plan.next_node(r) else {
                ctx.freeze_resource(r, plan)?;
                out.reschedule = true;
                continue;
            };
            let current = ctx.current_node(r, plan);
            let latest = plan
                .latest_feasible_departure(r, current)
                .unwrap_or(SimTime::INFINITY);

            if ctx.instance.is_end_home_of(r, next) && !ctx.should_send_home(r, next, latest) {
                ctx.freeze_resource(r, plan)?;
                out.reschedule = true;
                continue;
            }
            if !ctx.commit_or_defer(r, current, next, latest, plan)? {
                out.reschedule = true;
            }
            out.committed = true;
        }
        Ok(out)
    }
}

// ── NoWaitingPolicy ───────────────────────────────────────────────────────────

/// Send every idle resource to its next node straight away, except that no
/// resource goes home while released requests are still unserved.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoWaitingPolicy;

impl<O: Optimizer> DispatchPolicy<O> for NoWaitingPolicy {
    fn name(&self) -> &'static str {
        "no_waiting"
    }

    fn react(&self, ctx: &mut DecisionContext<'_, O>, plan: &O::Plan) -> SimResult<PolicyOutcome> {
        let mut out = PolicyOutcome::default();
        for r in ctx.fleet() {
            if ctx.state.tracker.state(r) != ResourceState::Idle {
                out.all_idle = false;
                continue;
            }
            let Some(next) = plan.next_node(r) else { continue };
            let going_home = ctx.instance.is_end_home_of(r, next);
            if going_home && !ctx.state.ledger.unserved_released().is_empty() {
                continue;
            }
            let current = ctx.current_node(r, plan);
            let arrival = ctx.now() + ctx.cost.travel_time(current, next, r);
            ctx.dispatch(r, next, arrival);
            out.committed = true;
        }
        Ok(out)
    }
}
