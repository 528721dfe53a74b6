//! The optimizer as seen from the engine.
//!
//! The optimizer runs on its own thread(s).  The engine pushes dispatched
//! events into it and, from inside protocol handlers, reads and freezes its
//! scenario pool and raises follow-up events in its pipeline.
//!
//! # Locking contract
//!
//! Protocol handlers hold the simulator's state lock while they call into
//! the optimizer, so the lock order is always *simulator state → pool*.
//! Implementations must therefore:
//!
//! - never call a protocol handler while holding their own pool lock;
//! - keep `push_event`, `raise_assignment`, `raise_decision` and `stop`
//!   non-blocking (enqueue and return).

use od_core::{NodeId, ResourceId, SimTime};
use od_event::Event;
use od_plan::{Plan, ScenarioPool};

pub trait Optimizer: Send + Sync + 'static {
    type Plan: Plan + Clone + 'static;

    /// Feed a dispatched event into the optimizer's event pipeline.
    fn push_event(&self, event: Event);

    /// Run `f` with exclusive access to the scenario pool.
    fn with_pool<R>(&self, f: impl FnOnce(&mut ScenarioPool<Self::Plan>) -> R) -> R;

    /// Commit `resource` to travel to `node`, projected to arrive at `arrival`.
    fn raise_assignment(&self, resource: ResourceId, node: NodeId, arrival: SimTime);

    /// Ask for dispatch to be re-evaluated against the latest plan.
    fn raise_decision(&self);

    /// Terminate the optimizer.  The engine calls this at most once.
    fn stop(&self);
}

/// One-line rendering of a pool for fatal-error diagnostics.
pub(crate) fn pool_summary<P: Plan>(pool: &ScenarioPool<P>) -> String {
    format!(
        "{} scenario(s) {:?}; distinguished: {:?}; current best: {:?}",
        pool.len(),
        pool.ids(),
        pool.distinguished(),
        pool.current_best()
    )
}
